//! Circulation request model.
//!
//! # Responsibility
//! - Capture a patron's borrow/return intent and the admin's decision.
//!
//! # Invariants
//! - `pending` is the only non-terminal status; a request is decided once.
//! - Return requests always carry `loan_id`; borrow requests gain one on
//!   approval.
//! - Decision metadata (`decided_at`, `decided_by`) is present exactly when
//!   the request is no longer pending.

use super::catalog::ItemId;
use super::loan::LoanId;
use super::patron::PatronId;
use super::ModelValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable request identifier.
pub type RequestId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Borrow,
    Return,
}

impl RequestKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Borrow => "borrow",
            Self::Return => "return",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// Admin verdict for one pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Approve,
    Reject,
}

impl DecisionOutcome {
    /// Status the request moves to when this outcome commits.
    pub fn resulting_status(self) -> RequestStatus {
        match self {
            Self::Approve => RequestStatus::Approved,
            Self::Reject => RequestStatus::Rejected,
        }
    }
}

/// Input for `decide_request`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: DecisionOutcome,
    /// Free-text note shown to the patron.
    pub response_note: Option<String>,
    /// Fine to record on the loan when approving a return. Ignored otherwise.
    pub recorded_fine: Option<i64>,
}

impl Decision {
    pub fn approve() -> Self {
        Self {
            outcome: DecisionOutcome::Approve,
            response_note: None,
            recorded_fine: None,
        }
    }

    pub fn reject(note: impl Into<String>) -> Self {
        Self {
            outcome: DecisionOutcome::Reject,
            response_note: Some(note.into()),
            recorded_fine: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.response_note = Some(note.into());
        self
    }

    pub fn with_recorded_fine(mut self, amount: i64) -> Self {
        self.recorded_fine = Some(amount);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CirculationRequest {
    pub request_id: RequestId,
    pub patron_id: PatronId,
    pub item_id: ItemId,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub loan_id: Option<LoanId>,
    pub submitted_at: i64,
    pub decided_at: Option<i64>,
    /// Admin who decided the request.
    pub decided_by: Option<PatronId>,
    pub patron_note: Option<String>,
    pub admin_response: Option<String>,
}

impl CirculationRequest {
    /// Creates a pending borrow request.
    pub fn borrow(
        patron_id: PatronId,
        item_id: ItemId,
        submitted_at: i64,
        patron_note: Option<String>,
    ) -> Self {
        Self::pending(
            patron_id,
            item_id,
            RequestKind::Borrow,
            None,
            submitted_at,
            patron_note,
        )
    }

    /// Creates a pending return request for an outstanding loan.
    pub fn return_of(
        patron_id: PatronId,
        item_id: ItemId,
        loan_id: LoanId,
        submitted_at: i64,
        patron_note: Option<String>,
    ) -> Self {
        Self::pending(
            patron_id,
            item_id,
            RequestKind::Return,
            Some(loan_id),
            submitted_at,
            patron_note,
        )
    }

    fn pending(
        patron_id: PatronId,
        item_id: ItemId,
        kind: RequestKind,
        loan_id: Option<LoanId>,
        submitted_at: i64,
        patron_note: Option<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            patron_id,
            item_id,
            kind,
            status: RequestStatus::Pending,
            loan_id,
            submitted_at,
            decided_at: None,
            decided_by: None,
            patron_note,
            admin_response: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.kind == RequestKind::Return && self.loan_id.is_none() {
            return Err(ModelValidationError::MissingLoanLink);
        }
        if self.is_pending() == self.decided_at.is_some() {
            return Err(ModelValidationError::DecisionMismatch);
        }
        Ok(())
    }
}
