//! Catalog item copy counters.
//!
//! # Invariants
//! - `0 <= available_copies <= total_copies` and `total_copies >= 1`.
//! - `available_copies = total_copies - outstanding loans`; only the
//!   inventory ledger mutates `available_copies`.

use super::ModelValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable catalog item identifier.
pub type ItemId = Uuid;

/// Copy-count view of one catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: ItemId,
    /// Display title used in alert messages.
    pub title: String,
    pub total_copies: u32,
    pub available_copies: u32,
}

impl CatalogItem {
    /// Creates an item with every copy on the shelf.
    pub fn new(title: impl Into<String>, total_copies: u32) -> Self {
        Self {
            item_id: Uuid::new_v4(),
            title: title.into(),
            total_copies,
            available_copies: total_copies,
        }
    }

    /// Number of copies currently out on loan.
    pub fn copies_on_loan(&self) -> u32 {
        self.total_copies.saturating_sub(self.available_copies)
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        if self.total_copies == 0 || self.available_copies > self.total_copies {
            return Err(ModelValidationError::CopyCountOutOfRange {
                total: i64::from(self.total_copies),
                available: i64::from(self.available_copies),
            });
        }
        Ok(())
    }
}
