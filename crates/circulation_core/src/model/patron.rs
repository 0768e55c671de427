//! Patron identity as seen by the circulation engine.
//!
//! Patrons are owned by the identity collaborator; the engine only reads
//! existence, approval and role through [`crate::directory::PatronDirectory`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable patron (or admin) identifier issued by the identity system.
pub type PatronId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatronRole {
    /// Borrows items through requests.
    Patron,
    /// Adjudicates requests.
    Admin,
}

/// Directory snapshot for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatronStanding {
    pub role: PatronRole,
    /// Account approved by library staff.
    pub is_approved: bool,
}

impl PatronStanding {
    /// Approved patron with borrowing rights.
    pub fn approved_patron() -> Self {
        Self {
            role: PatronRole::Patron,
            is_approved: true,
        }
    }

    /// Registered patron still waiting for approval.
    pub fn pending_patron() -> Self {
        Self {
            role: PatronRole::Patron,
            is_approved: false,
        }
    }

    pub fn admin() -> Self {
        Self {
            role: PatronRole::Admin,
            is_approved: true,
        }
    }

    /// Whether this identity may submit borrow/return requests.
    ///
    /// Admins are never blocked by the approval flag.
    pub fn may_submit(&self) -> bool {
        self.role == PatronRole::Admin || self.is_approved
    }

    /// Whether this identity may decide requests.
    pub fn may_decide(&self) -> bool {
        self.role == PatronRole::Admin
    }
}
