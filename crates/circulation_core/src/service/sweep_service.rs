//! Due-date notification sweep.
//!
//! # Responsibility
//! - Emit due-soon reminders for active loans due in three days or tomorrow.
//! - Move past-due loans to `overdue` and emit one overdue alert per loan
//!   per calendar day.
//!
//! # Invariants
//! - Every alert carries a dedup key, so overlapping or repeated sweeps never
//!   duplicate an alert within its window.
//! - Returned loans are never touched.
//! - A failure on one loan is logged and counted; the sweep moves on.

use crate::clock::{CalendarDay, Clock};
use crate::config::CirculationConfig;
use crate::model::catalog::{CatalogItem, ItemId};
use crate::model::loan::{LoanRecord, LoanStatus};
use crate::repo::alert_repo::{AlertInsert, AlertRepository, SqliteAlertRepository};
use crate::repo::catalog_repo::{InventoryLedger, SqliteInventoryLedger};
use crate::repo::loan_repo::{LoanRepository, SqliteLoanRepository};
use crate::repo::{Entity, RepoError, RepoResult};
use crate::service::messages::{self, ReminderTier};
use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::collections::HashMap;
use std::time::Instant;

/// Counters from one sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub loans_scanned: u32,
    pub alerts_created: u32,
    pub alerts_deduplicated: u32,
    /// Loans moved from `active` to `overdue` by this run.
    pub loans_marked_overdue: u32,
    pub record_failures: u32,
}

impl SweepReport {
    fn record_insert(&mut self, outcome: AlertInsert) {
        match outcome {
            AlertInsert::Created(_) => self.alerts_created += 1,
            AlertInsert::Deduplicated => self.alerts_deduplicated += 1,
        }
    }
}

/// One-shot sweep over a connection; the scheduler builds one per tick.
pub struct NotificationSweep<'a> {
    conn: &'a mut Connection,
    clock: &'a dyn Clock,
    config: &'a CirculationConfig,
    items: HashMap<ItemId, CatalogItem>,
}

impl<'a> NotificationSweep<'a> {
    pub fn new(conn: &'a mut Connection, clock: &'a dyn Clock, config: &'a CirculationConfig) -> Self {
        Self {
            conn,
            clock,
            config,
            items: HashMap::new(),
        }
    }

    /// Runs both scans at the clock's current instant.
    ///
    /// # Errors
    /// Only failures of the candidate queries abort the run; per-loan
    /// failures are reported through `SweepReport::record_failures`.
    pub fn run(mut self) -> RepoResult<SweepReport> {
        let started_at = Instant::now();
        let now = self.clock.now_ms();
        let today = CalendarDay::containing(now, self.config.utc_offset());
        info!(
            "event=sweep_run module=sweep status=start day_index={}",
            today.index()
        );

        let mut report = SweepReport::default();
        let result = self
            .scan_due_soon(now, today, &mut report)
            .and_then(|()| self.scan_overdue(now, today, &mut report));

        match &result {
            Ok(()) => info!(
                "event=sweep_run module=sweep status=ok loans_scanned={} alerts_created={} alerts_deduplicated={} loans_marked_overdue={} record_failures={} duration_ms={}",
                report.loans_scanned,
                report.alerts_created,
                report.alerts_deduplicated,
                report.loans_marked_overdue,
                report.record_failures,
                started_at.elapsed().as_millis()
            ),
            Err(err) => warn!(
                "event=sweep_run module=sweep status=error error_code=sweep_scan_failed duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result.map(|()| report)
    }

    fn scan_due_soon(
        &mut self,
        now: i64,
        today: CalendarDay,
        report: &mut SweepReport,
    ) -> RepoResult<()> {
        for tier in [ReminderTier::ThreeDays, ReminderTier::Tomorrow] {
            let due_day = today.plus_days(tier.days_ahead());
            let loans = SqliteLoanRepository::new(self.conn)
                .list_active_due_between(due_day.start_ms(), due_day.end_ms())?;
            let key_bucket = self.reminder_bucket(now, tier);

            for loan in loans {
                report.loans_scanned += 1;
                match self.remind(&loan, tier, key_bucket, now) {
                    Ok(outcome) => report.record_insert(outcome),
                    Err(err) => {
                        report.record_failures += 1;
                        warn!(
                            "event=sweep_due_soon module=sweep status=error error_code=sweep_record_failed tier={} loan_id={} error={}",
                            tier.key(),
                            loan.loan_id,
                            err
                        );
                    }
                }
            }
        }
        Ok(())
    }

    fn scan_overdue(
        &mut self,
        now: i64,
        today: CalendarDay,
        report: &mut SweepReport,
    ) -> RepoResult<()> {
        let loans =
            SqliteLoanRepository::new(self.conn).list_outstanding_due_before(today.start_ms())?;

        for loan in loans {
            report.loans_scanned += 1;
            match self.flag_overdue(&loan, today, now) {
                Ok(Some(outcome)) => {
                    if loan.status == LoanStatus::Active {
                        report.loans_marked_overdue += 1;
                    }
                    report.record_insert(outcome);
                }
                Ok(None) => {}
                Err(err) => {
                    report.record_failures += 1;
                    warn!(
                        "event=sweep_overdue module=sweep status=error error_code=sweep_record_failed loan_id={} error={}",
                        loan.loan_id, err
                    );
                }
            }
        }
        Ok(())
    }

    fn remind(
        &mut self,
        loan: &LoanRecord,
        tier: ReminderTier,
        key_bucket: i64,
        now: i64,
    ) -> RepoResult<AlertInsert> {
        let item = self.item(loan.item_id)?;
        let alert = messages::due_soon(loan, &item, tier, self.config.utc_offset(), now)
            .with_dedup_key(format!(
                "due_soon:{}:{}:{}",
                tier.key(),
                loan.loan_id,
                key_bucket
            ));
        SqliteAlertRepository::new(self.conn).insert_alert(&alert)
    }

    /// Returns `None` when the loan was returned after the candidate scan.
    fn flag_overdue(
        &mut self,
        loan: &LoanRecord,
        today: CalendarDay,
        now: i64,
    ) -> RepoResult<Option<AlertInsert>> {
        let item = self.item(loan.item_id)?;
        let due_day = CalendarDay::containing(loan.due_at, self.config.utc_offset());
        let days_overdue = today.index() - due_day.index();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        if !SqliteLoanRepository::new(&tx).mark_overdue(loan.loan_id, now)? {
            return Ok(None);
        }
        let alert = messages::overdue(loan, &item, days_overdue, now)
            .with_dedup_key(format!("overdue:{}:{}", loan.loan_id, today.index()));
        let outcome = SqliteAlertRepository::new(&tx).insert_alert(&alert)?;
        tx.commit()?;
        Ok(Some(outcome))
    }

    fn item(&mut self, item_id: ItemId) -> RepoResult<CatalogItem> {
        if let Some(item) = self.items.get(&item_id) {
            return Ok(item.clone());
        }
        let item = SqliteInventoryLedger::new(self.conn)
            .get_item(item_id)?
            .ok_or(RepoError::NotFound(Entity::Item, item_id))?;
        self.items.insert(item_id, item.clone());
        Ok(item)
    }

    fn reminder_bucket(&self, now: i64, tier: ReminderTier) -> i64 {
        let window_ms = match tier {
            ReminderTier::ThreeDays => self.config.three_day_window_ms(),
            ReminderTier::Tomorrow => self.config.tomorrow_window_ms(),
        };
        let offset_ms = i64::from(self.config.utc_offset().local_minus_utc()) * 1000;
        (now + offset_ms).div_euclid(window_ms)
    }
}
