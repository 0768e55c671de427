use circulation_core::clock::{MS_PER_DAY, MS_PER_HOUR};
use circulation_core::{
    Alert, AlertKind, CatalogItem, CirculationConfig, CirculationEngine, Decision, FixedClock,
    InMemoryPatronDirectory, LoanId, LoanStatus, PatronId, PatronStanding, SweepReport,
};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const DAY: i64 = 19_700;

fn at(day: i64, hour: i64) -> i64 {
    (DAY + day) * MS_PER_DAY + hour * MS_PER_HOUR
}

struct Fixture {
    engine: CirculationEngine,
    clock: Arc<FixedClock>,
    patron: PatronId,
    admin: PatronId,
}

impl Fixture {
    fn new(config: CirculationConfig) -> Self {
        Self::build(|directory, clock| {
            CirculationEngine::in_memory(directory, clock, config).unwrap()
        })
    }

    fn on_disk(path: &Path) -> Self {
        Self::build(|directory, clock| {
            let conn = circulation_core::open_db(path).unwrap();
            CirculationEngine::with_connection(conn, directory, clock, CirculationConfig::default())
        })
    }

    fn build(
        engine: impl FnOnce(Arc<InMemoryPatronDirectory>, Arc<FixedClock>) -> CirculationEngine,
    ) -> Self {
        let directory = Arc::new(InMemoryPatronDirectory::new());
        let patron = Uuid::new_v4();
        let admin = Uuid::new_v4();
        directory.upsert(patron, PatronStanding::approved_patron());
        directory.upsert(admin, PatronStanding::admin());
        let clock = Arc::new(FixedClock::new(at(0, 10)));
        let engine = engine(directory, clock.clone());
        Self {
            engine,
            clock,
            patron,
            admin,
        }
    }

    /// Lends one copy at the current clock; with the default config the
    /// loan borrowed at day 0 10:00 is due day 14 10:00.
    fn lend(&mut self, item: &CatalogItem) -> LoanId {
        let request = self
            .engine
            .submit_borrow_request(self.patron, item.item_id, None)
            .unwrap();
        self.engine
            .decide_request(request.request_id, self.admin, &Decision::approve())
            .unwrap()
            .loan_id
            .unwrap()
    }

    fn sweep_at(&mut self, instant: i64) -> SweepReport {
        self.clock.set(instant);
        self.engine.run_notification_sweep().unwrap()
    }

    fn loan_status(&mut self, loan_id: LoanId) -> LoanStatus {
        self.engine
            .loan_history_for_patron(self.patron)
            .unwrap()
            .into_iter()
            .find(|loan| loan.loan_id == loan_id)
            .unwrap()
            .status
    }

    fn alerts_of_kind(&self, kind: AlertKind) -> Vec<Alert> {
        self.engine
            .list_alerts(self.patron, Some(100))
            .unwrap()
            .into_iter()
            .filter(|alert| alert.kind == kind)
            .collect()
    }
}

#[test]
fn three_day_reminder_is_sent_once_per_window() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Frankenstein", 1).unwrap();
    let loan_id = fx.lend(&item);

    let first = fx.sweep_at(at(11, 9));
    assert_eq!(first.alerts_created, 1);
    assert_eq!(first.record_failures, 0);

    let second = fx.sweep_at(at(11, 15));
    assert_eq!(second.alerts_created, 0);
    assert_eq!(second.alerts_deduplicated, 1);

    let reminders = fx.alerts_of_kind(AlertKind::DueSoon);
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].title, "Item Due Soon");
    assert_eq!(reminders[0].loan_id, Some(loan_id));
    let key = reminders[0].dedup_key.as_deref().unwrap();
    assert!(key.starts_with(&format!("due_soon:3d:{loan_id}:")));
}

#[test]
fn tomorrow_reminder_uses_twelve_hour_window() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Dracula", 1).unwrap();
    fx.lend(&item);

    assert_eq!(fx.sweep_at(at(13, 1)).alerts_created, 1);
    assert_eq!(fx.sweep_at(at(13, 11)).alerts_created, 0);
    assert_eq!(fx.sweep_at(at(13, 13)).alerts_created, 1);

    let reminders = fx.alerts_of_kind(AlertKind::DueSoon);
    assert_eq!(reminders.len(), 2);
    assert!(reminders
        .iter()
        .all(|alert| alert.title == "Item Due Tomorrow"));
}

#[test]
fn tomorrow_window_restarts_at_local_noon() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Ivanhoe", 1).unwrap();
    fx.lend(&item);

    // 11:59 and 12:01 fall in different 12-hour windows, so each sweep reminds.
    let noon = at(13, 12);
    assert_eq!(fx.sweep_at(noon - 60_000).alerts_created, 1);
    assert_eq!(fx.sweep_at(noon + 60_000).alerts_created, 1);
    assert_eq!(fx.sweep_at(noon + 2 * MS_PER_HOUR).alerts_created, 0);

    let keys: Vec<String> = fx
        .alerts_of_kind(AlertKind::DueSoon)
        .into_iter()
        .filter_map(|alert| alert.dedup_key)
        .collect();
    assert_eq!(keys.len(), 2);
    assert_ne!(keys[0], keys[1]);
}

#[test]
fn days_outside_both_tiers_produce_nothing() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Emma", 1).unwrap();
    fx.lend(&item);

    let report = fx.sweep_at(at(12, 9));
    assert_eq!(report, SweepReport::default());
    assert!(fx.engine.list_alerts(fx.patron, None).unwrap().len() == 1);
}

#[test]
fn overdue_loan_is_flagged_once_per_day() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Persuasion", 1).unwrap();
    let loan_id = fx.lend(&item);

    let first = fx.sweep_at(at(15, 9));
    assert_eq!(first.loans_marked_overdue, 1);
    assert_eq!(first.alerts_created, 1);

    let loans = fx.engine.list_loans_for_patron(fx.patron).unwrap();
    assert_eq!(loans[0].status, LoanStatus::Overdue);

    let overdue = fx.alerts_of_kind(AlertKind::Overdue);
    assert_eq!(overdue.len(), 1);
    assert!(overdue[0].message.contains("1 day(s) overdue"));
    assert_eq!(
        overdue[0].dedup_key.as_deref(),
        Some(format!("overdue:{loan_id}:{}", DAY + 15).as_str())
    );

    let again = fx.sweep_at(at(15, 20));
    assert_eq!(again.alerts_created, 0);
    assert_eq!(again.alerts_deduplicated, 1);
    assert_eq!(again.loans_marked_overdue, 0);
    assert_eq!(fx.alerts_of_kind(AlertKind::Overdue).len(), 1);

    let next_day = fx.sweep_at(at(16, 9));
    assert_eq!(next_day.alerts_created, 1);
    let overdue = fx.alerts_of_kind(AlertKind::Overdue);
    assert_eq!(overdue.len(), 2);
    assert!(overdue[0].message.contains("2 day(s) overdue"));

    let stats = fx.engine.circulation_stats().unwrap();
    assert_eq!(stats.overdue_loans, 1);
}

#[test]
fn loan_due_today_is_not_overdue_yet() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Mansfield Park", 1).unwrap();
    fx.lend(&item);

    let report = fx.sweep_at(at(14, 23));
    assert_eq!(report.loans_marked_overdue, 0);
    assert!(fx.alerts_of_kind(AlertKind::Overdue).is_empty());
}

#[test]
fn returned_loans_are_left_alone() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Northanger Abbey", 1).unwrap();
    let loan_id = fx.lend(&item);
    let request = fx
        .engine
        .submit_return_request(fx.patron, loan_id, None)
        .unwrap();
    fx.engine
        .decide_request(request.request_id, fx.admin, &Decision::approve())
        .unwrap();

    for instant in [at(11, 9), at(13, 9), at(20, 9)] {
        assert_eq!(fx.sweep_at(instant), SweepReport::default());
    }
    let history = fx.engine.loan_history_for_patron(fx.patron).unwrap();
    assert_eq!(history[0].status, LoanStatus::Returned);
}

#[test]
fn returning_an_overdue_loan_is_still_possible() {
    let mut fx = Fixture::new(CirculationConfig::default());
    let item = fx.engine.register_item("Sense and Sensibility", 1).unwrap();
    let loan_id = fx.lend(&item);
    fx.sweep_at(at(17, 9));

    let request = fx
        .engine
        .submit_return_request(fx.patron, loan_id, None)
        .unwrap();
    fx.engine
        .decide_request(
            request.request_id,
            fx.admin,
            &Decision::approve().with_recorded_fine(150),
        )
        .unwrap();

    let history = fx.engine.loan_history_for_patron(fx.patron).unwrap();
    assert_eq!(history[0].status, LoanStatus::Returned);
    assert_eq!(history[0].fine_amount, Some(150));
    assert!(fx.engine.audit_item(item.item_id).unwrap().is_consistent());
}

#[test]
fn calendar_days_follow_configured_offset() {
    // UTC+12: local day 14 begins at UTC day 13 12:00.
    let config = CirculationConfig {
        utc_offset_minutes: 12 * 60,
        ..CirculationConfig::default()
    };
    let mut fx = Fixture::new(config);
    fx.clock.set(at(0, 0));
    let item = fx.engine.register_item("Pride and Prejudice", 1).unwrap();
    fx.lend(&item);

    // Due UTC day 14 00:00 = local day 14 12:00; UTC day 13 13:00 is local
    // day 14 01:00, so the loan is due "today" rather than tomorrow.
    let report = fx.sweep_at(at(13, 13));
    assert_eq!(report.alerts_created, 0);

    // UTC day 12 13:00 is local day 13 01:00: due tomorrow.
    let report = fx.sweep_at(at(12, 13));
    assert_eq!(report.alerts_created, 1);
}

#[test]
fn one_failing_loan_does_not_stop_the_others() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sweep.db");
    let mut fx = Fixture::on_disk(&path);
    let first = fx.engine.register_item("Bleak House", 1).unwrap();
    let second = fx.engine.register_item("Little Dorrit", 1).unwrap();
    let failing = fx.lend(&first);
    let healthy = fx.lend(&second);

    let side = circulation_core::open_db(&path).unwrap();
    side.execute_batch(&format!(
        "CREATE TRIGGER overdue_alert_fails BEFORE INSERT ON alerts
         WHEN NEW.kind = 'overdue' AND NEW.loan_id = '{failing}'
         BEGIN SELECT RAISE(ABORT, 'alert rejected'); END;"
    ))
    .unwrap();

    let report = fx.sweep_at(at(15, 9));
    assert_eq!(report.record_failures, 1);
    assert_eq!(report.alerts_created, 1);
    assert_eq!(report.loans_marked_overdue, 1);

    assert_eq!(fx.loan_status(failing), LoanStatus::Active);
    assert_eq!(fx.loan_status(healthy), LoanStatus::Overdue);
    let overdue = fx.alerts_of_kind(AlertKind::Overdue);
    assert_eq!(overdue.len(), 1);
    assert_eq!(overdue[0].loan_id, Some(healthy));

    // Once the store accepts writes again the skipped loan is caught up.
    side.execute_batch("DROP TRIGGER overdue_alert_fails;").unwrap();
    let retry = fx.sweep_at(at(15, 10));
    assert_eq!(retry.record_failures, 0);
    assert_eq!(retry.alerts_created, 1);
    assert_eq!(retry.alerts_deduplicated, 1);
    assert_eq!(fx.loan_status(failing), LoanStatus::Overdue);
}
