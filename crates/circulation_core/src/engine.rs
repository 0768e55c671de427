//! Single-connection facade over the circulation services.
//!
//! # Responsibility
//! - Own one SQLite connection plus the injected directory, clock and config.
//! - Expose every circulation use-case as a method.
//!
//! # Invariants
//! - Each method is one unit of work; concurrent callers use one engine per
//!   thread over the same database file.
//! - The connection stays private; inventory and loan rows change only through
//!   the ledger and workflow services.

use crate::clock::{Clock, SystemClock};
use crate::config::CirculationConfig;
use crate::db::{open_db, open_db_in_memory, DbResult};
use crate::directory::PatronDirectory;
use crate::model::alert::{Alert, AlertId};
use crate::model::catalog::{CatalogItem, ItemId};
use crate::model::loan::{LoanId, LoanRecord};
use crate::model::patron::PatronId;
use crate::model::request::{CirculationRequest, Decision, RequestId};
use crate::repo::alert_repo::{AlertInsert, SqliteAlertRepository};
use crate::repo::catalog_repo::{InventoryLedger, LedgerAudit, SqliteInventoryLedger};
use crate::repo::stats_repo::{CirculationStats, PatronStats, SqliteStatsRepository};
use crate::repo::RepoResult;
use crate::service::alert_service::AlertService;
use crate::service::sweep_service::{NotificationSweep, SweepReport};
use crate::service::workflow_service::{RequestWorkflow, WorkflowResult};
use log::info;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

pub struct CirculationEngine {
    conn: Connection,
    directory: Arc<dyn PatronDirectory>,
    clock: Arc<dyn Clock>,
    config: CirculationConfig,
}

impl CirculationEngine {
    /// Opens (and migrates) a database file with the system clock.
    pub fn open(
        path: impl AsRef<Path>,
        directory: Arc<dyn PatronDirectory>,
        config: CirculationConfig,
    ) -> DbResult<Self> {
        Ok(Self::with_connection(
            open_db(path)?,
            directory,
            Arc::new(SystemClock),
            config,
        ))
    }

    pub fn in_memory(
        directory: Arc<dyn PatronDirectory>,
        clock: Arc<dyn Clock>,
        config: CirculationConfig,
    ) -> DbResult<Self> {
        Ok(Self::with_connection(
            open_db_in_memory()?,
            directory,
            clock,
            config,
        ))
    }

    /// Wraps an already-migrated connection.
    pub fn with_connection(
        conn: Connection,
        directory: Arc<dyn PatronDirectory>,
        clock: Arc<dyn Clock>,
        config: CirculationConfig,
    ) -> Self {
        Self {
            conn,
            directory,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CirculationConfig {
        &self.config
    }

    // Catalog

    pub fn register_item(&self, title: &str, total_copies: u32) -> RepoResult<CatalogItem> {
        let item = CatalogItem::new(title, total_copies);
        SqliteInventoryLedger::new(&self.conn).register_item(&item)?;
        info!(
            "event=item_register module=catalog status=ok item_id={} total_copies={}",
            item.item_id, item.total_copies
        );
        Ok(item)
    }

    pub fn get_item(&self, item_id: ItemId) -> RepoResult<Option<CatalogItem>> {
        SqliteInventoryLedger::new(&self.conn).get_item(item_id)
    }

    pub fn audit_item(&self, item_id: ItemId) -> RepoResult<LedgerAudit> {
        SqliteInventoryLedger::new(&self.conn).audit(item_id)
    }

    // Requests and loans

    pub fn submit_borrow_request(
        &mut self,
        patron_id: PatronId,
        item_id: ItemId,
        note: Option<&str>,
    ) -> WorkflowResult<CirculationRequest> {
        self.workflow().submit_borrow_request(patron_id, item_id, note)
    }

    pub fn submit_return_request(
        &mut self,
        patron_id: PatronId,
        loan_id: LoanId,
        note: Option<&str>,
    ) -> WorkflowResult<CirculationRequest> {
        self.workflow().submit_return_request(patron_id, loan_id, note)
    }

    pub fn list_pending_requests(&mut self) -> WorkflowResult<Vec<CirculationRequest>> {
        self.workflow().list_pending_requests()
    }

    pub fn decide_request(
        &mut self,
        request_id: RequestId,
        admin_id: PatronId,
        decision: &Decision,
    ) -> WorkflowResult<CirculationRequest> {
        self.workflow().decide_request(request_id, admin_id, decision)
    }

    pub fn get_request(&mut self, request_id: RequestId) -> WorkflowResult<CirculationRequest> {
        self.workflow().get_request(request_id)
    }

    pub fn list_requests_for_patron(
        &mut self,
        patron_id: PatronId,
    ) -> WorkflowResult<Vec<CirculationRequest>> {
        self.workflow().list_requests_for_patron(patron_id)
    }

    pub fn list_loans_for_patron(&mut self, patron_id: PatronId) -> WorkflowResult<Vec<LoanRecord>> {
        self.workflow().list_loans_for_patron(patron_id)
    }

    pub fn loan_history_for_patron(
        &mut self,
        patron_id: PatronId,
    ) -> WorkflowResult<Vec<LoanRecord>> {
        self.workflow().loan_history_for_patron(patron_id)
    }

    // Notifications

    /// Runs one due-soon/overdue sweep now; safe to call while the
    /// background scheduler is running.
    pub fn run_notification_sweep(&mut self) -> RepoResult<SweepReport> {
        NotificationSweep::new(&mut self.conn, self.clock.as_ref(), &self.config).run()
    }

    pub fn list_alerts(&self, user_id: PatronId, limit: Option<u32>) -> RepoResult<Vec<Alert>> {
        let limit = self.config.normalize_alert_limit(limit);
        self.alerts().list_alerts(user_id, Some(limit))
    }

    pub fn mark_alert_read(&self, alert_id: AlertId, user_id: PatronId) -> RepoResult<()> {
        self.alerts().mark_read(user_id, alert_id)
    }

    pub fn mark_all_alerts_read(&self, user_id: PatronId) -> RepoResult<usize> {
        self.alerts().mark_all_read(user_id)
    }

    pub fn unread_alert_count(&self, user_id: PatronId) -> RepoResult<u32> {
        self.alerts().unread_count(user_id)
    }

    pub fn send_welcome(&self, user_id: PatronId) -> RepoResult<AlertInsert> {
        self.alerts().send_welcome(user_id)
    }

    // Stats

    pub fn circulation_stats(&self) -> RepoResult<CirculationStats> {
        SqliteStatsRepository::new(&self.conn).circulation_stats()
    }

    pub fn patron_stats(&self, patron_id: PatronId) -> RepoResult<PatronStats> {
        SqliteStatsRepository::new(&self.conn).patron_stats(patron_id)
    }

    fn workflow(&mut self) -> RequestWorkflow<'_> {
        RequestWorkflow::new(
            &mut self.conn,
            self.directory.as_ref(),
            self.clock.as_ref(),
            &self.config,
        )
    }

    fn alerts(&self) -> AlertService<'_, SqliteAlertRepository<'_>> {
        AlertService::new(
            SqliteAlertRepository::new(&self.conn),
            self.clock.as_ref(),
            self.config.alert_list_limit,
        )
    }
}
