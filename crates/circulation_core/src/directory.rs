//! Patron directory seam.
//!
//! # Responsibility
//! - Expose patron existence, approval and role from the identity system.
//! - Provide an in-process directory for embedding and tests.
//!
//! # Invariants
//! - The circulation engine never writes identity data through this trait.

use crate::model::patron::{PatronId, PatronStanding};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

/// Read-only view of identity data consumed by the request workflow.
pub trait PatronDirectory: Send + Sync {
    /// Returns `None` when the identity is unknown.
    fn standing(&self, patron_id: PatronId) -> Option<PatronStanding>;
}

/// Thread-safe in-memory directory.
#[derive(Debug, Default)]
pub struct InMemoryPatronDirectory {
    entries: RwLock<BTreeMap<PatronId, PatronStanding>>,
}

impl InMemoryPatronDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces one identity.
    pub fn upsert(&self, patron_id: PatronId, standing: PatronStanding) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(patron_id, standing);
    }

    pub fn remove(&self, patron_id: PatronId) -> Option<PatronStanding> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&patron_id)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PatronDirectory for InMemoryPatronDirectory {
    fn standing(&self, patron_id: PatronId) -> Option<PatronStanding> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&patron_id)
            .copied()
    }
}
