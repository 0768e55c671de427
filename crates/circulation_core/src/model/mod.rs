//! Circulation domain model.
//!
//! # Responsibility
//! - Define the records owned or referenced by the circulation engine.
//! - Keep lifecycle rules (which status may follow which) next to the data.
//!
//! # Invariants
//! - Every record is identified by a stable UUID that is never reused.
//! - Timestamps are Unix epoch milliseconds.

pub mod alert;
pub mod catalog;
pub mod loan;
pub mod patron;
pub mod request;

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Validation errors raised when a record violates its model invariants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// `available_copies` is outside `0..=total_copies`, or total is zero.
    CopyCountOutOfRange { total: i64, available: i64 },
    /// `due_at` precedes `borrowed_at`.
    DueBeforeBorrow,
    /// `returned_at` presence disagrees with the loan status.
    ReturnedAtMismatch,
    /// Return requests must reference a loan.
    MissingLoanLink,
    /// Decision metadata presence disagrees with the request status.
    DecisionMismatch,
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CopyCountOutOfRange { total, available } => write!(
                f,
                "copy counts out of range: available={available} total={total}"
            ),
            Self::DueBeforeBorrow => write!(f, "due_at must not be earlier than borrowed_at"),
            Self::ReturnedAtMismatch => {
                write!(f, "returned_at must be set exactly when status is returned")
            }
            Self::MissingLoanLink => write!(f, "return requests must reference a loan"),
            Self::DecisionMismatch => {
                write!(f, "decided_at must be set exactly when status is not pending")
            }
        }
    }
}

impl Error for ModelValidationError {}
