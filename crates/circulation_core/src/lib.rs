//! Core domain logic for library circulation.
//! This crate is the single source of truth for copy, loan and request
//! invariants.

pub mod clock;
pub mod config;
pub mod db;
pub mod directory;
pub mod engine;
pub mod logging;
pub mod model;
pub mod repo;
pub mod scheduler;
pub mod service;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CirculationConfig, ConfigError};
pub use db::{open_db, open_db_in_memory, DbError};
pub use directory::{InMemoryPatronDirectory, PatronDirectory};
pub use engine::CirculationEngine;
pub use logging::{default_log_level, init_logging, logging_status, LoggingConfig, LoggingError};
pub use model::alert::{Alert, AlertId, AlertKind};
pub use model::catalog::{CatalogItem, ItemId};
pub use model::loan::{LoanId, LoanRecord, LoanStatus};
pub use model::patron::{PatronId, PatronRole, PatronStanding};
pub use model::request::{
    CirculationRequest, Decision, DecisionOutcome, RequestId, RequestKind, RequestStatus,
};
pub use repo::alert_repo::AlertInsert;
pub use repo::catalog_repo::{LedgerAudit, Reservation};
pub use repo::stats_repo::{CirculationStats, PatronStats};
pub use repo::{Entity, RepoError, RepoResult};
pub use scheduler::{NotificationScheduler, SchedulerHandle};
pub use service::sweep_service::SweepReport;
pub use service::workflow_service::{WorkflowError, WorkflowResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
