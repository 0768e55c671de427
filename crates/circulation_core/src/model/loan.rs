//! Loan record model.
//!
//! # Responsibility
//! - Describe one lending of one copy to one patron.
//! - Encode the loan status machine: `active -> overdue -> returned`, with
//!   `active -> returned` allowed directly.
//!
//! # Invariants
//! - `returned` is terminal.
//! - `returned_at` is set exactly when `status == Returned`.
//! - `due_at >= borrowed_at`.

use super::catalog::ItemId;
use super::patron::PatronId;
use super::ModelValidationError;
use crate::clock::MS_PER_DAY;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable loan identifier.
pub type LoanId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoanStatus {
    /// Copy is out and not yet due.
    Active,
    /// Closed by an approved return request.
    Returned,
    /// Copy is out past its due date.
    Overdue,
}

impl LoanStatus {
    /// Whether the copy is still out of the library.
    pub fn is_outstanding(self) -> bool {
        matches!(self, Self::Active | Self::Overdue)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan_id: LoanId,
    pub patron_id: PatronId,
    pub item_id: ItemId,
    pub borrowed_at: i64,
    pub due_at: i64,
    pub returned_at: Option<i64>,
    pub status: LoanStatus,
    /// Recorded fine in minor currency units. Never computed by the engine.
    pub fine_amount: Option<i64>,
}

impl LoanRecord {
    /// Opens a new active loan at `borrowed_at` lasting `loan_period_days`.
    pub fn open(
        patron_id: PatronId,
        item_id: ItemId,
        borrowed_at: i64,
        loan_period_days: u32,
    ) -> Self {
        Self {
            loan_id: Uuid::new_v4(),
            patron_id,
            item_id,
            borrowed_at,
            due_at: borrowed_at + i64::from(loan_period_days) * MS_PER_DAY,
            returned_at: None,
            status: LoanStatus::Active,
            fine_amount: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.due_at < self.borrowed_at {
            return Err(ModelValidationError::DueBeforeBorrow);
        }
        if (self.status == LoanStatus::Returned) != self.returned_at.is_some() {
            return Err(ModelValidationError::ReturnedAtMismatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LoanRecord, LoanStatus};
    use crate::clock::MS_PER_DAY;
    use uuid::Uuid;

    #[test]
    fn open_sets_due_date_from_loan_period() {
        let loan = LoanRecord::open(Uuid::new_v4(), Uuid::new_v4(), 1_000, 14);
        assert_eq!(loan.due_at, 1_000 + 14 * MS_PER_DAY);
        assert_eq!(loan.status, LoanStatus::Active);
        assert!(loan.validate().is_ok());
    }

    #[test]
    fn returned_loan_requires_returned_at() {
        let mut loan = LoanRecord::open(Uuid::new_v4(), Uuid::new_v4(), 0, 14);
        loan.status = LoanStatus::Returned;
        assert!(loan.validate().is_err());
        loan.returned_at = Some(5);
        assert!(loan.validate().is_ok());
    }
}
