//! Alert (in-app notification) model.
//!
//! # Invariants
//! - Alerts are append-only; only `is_read` flips after creation.
//! - `dedup_key`, when present, is globally unique and makes a scheduled
//!   alert idempotent.

use super::catalog::ItemId;
use super::loan::LoanId;
use super::patron::PatronId;
use super::request::RequestId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable alert identifier.
pub type AlertId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Loan due in three days or tomorrow.
    DueSoon,
    /// Loan past its due date.
    Overdue,
    /// Outcome of a borrow/return request.
    Decision,
    /// Account approved by the identity system.
    Welcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: AlertId,
    pub recipient_id: PatronId,
    pub kind: AlertKind,
    pub title: String,
    pub message: String,
    pub item_id: Option<ItemId>,
    pub request_id: Option<RequestId>,
    pub loan_id: Option<LoanId>,
    pub is_read: bool,
    pub created_at: i64,
    /// Idempotency key for scheduler-generated alerts.
    pub dedup_key: Option<String>,
}

impl Alert {
    /// Creates an unread alert with no references.
    pub fn new(
        recipient_id: PatronId,
        kind: AlertKind,
        title: impl Into<String>,
        message: impl Into<String>,
        created_at: i64,
    ) -> Self {
        Self {
            alert_id: Uuid::new_v4(),
            recipient_id,
            kind,
            title: title.into(),
            message: message.into(),
            item_id: None,
            request_id: None,
            loan_id: None,
            is_read: false,
            created_at,
            dedup_key: None,
        }
    }

    pub fn with_item(mut self, item_id: ItemId) -> Self {
        self.item_id = Some(item_id);
        self
    }

    pub fn with_request(mut self, request_id: RequestId) -> Self {
        self.request_id = Some(request_id);
        self
    }

    pub fn with_loan(mut self, loan_id: LoanId) -> Self {
        self.loan_id = Some(loan_id);
        self
    }

    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}
