use circulation_core::{
    AlertInsert, AlertKind, CirculationConfig, CirculationEngine, CirculationStats, Decision,
    Entity, FixedClock, InMemoryPatronDirectory, PatronId, PatronStanding, PatronStats, RepoError,
};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct Desk {
    engine: CirculationEngine,
    clock: Arc<FixedClock>,
    directory: Arc<InMemoryPatronDirectory>,
    admin: PatronId,
}

fn desk(config: CirculationConfig) -> Desk {
    let directory = Arc::new(InMemoryPatronDirectory::new());
    let admin = Uuid::new_v4();
    directory.upsert(admin, PatronStanding::admin());
    let clock = Arc::new(FixedClock::new(1_700_000_000_000));
    let engine = CirculationEngine::in_memory(directory.clone(), clock.clone(), config).unwrap();
    Desk {
        engine,
        clock,
        directory,
        admin,
    }
}

fn approved_patron(desk: &Desk) -> PatronId {
    let patron = Uuid::new_v4();
    desk.directory
        .upsert(patron, PatronStanding::approved_patron());
    patron
}

#[test]
fn welcome_alert_is_sent_once() {
    let desk = desk(CirculationConfig::default());
    let patron = approved_patron(&desk);

    assert!(matches!(
        desk.engine.send_welcome(patron).unwrap(),
        AlertInsert::Created(_)
    ));
    assert_eq!(
        desk.engine.send_welcome(patron).unwrap(),
        AlertInsert::Deduplicated
    );

    let alerts = desk.engine.list_alerts(patron, None).unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::Welcome);
    assert_eq!(alerts[0].title, "Welcome to the Library!");
    assert!(!alerts[0].is_read);
}

#[test]
fn listing_is_newest_first_and_respects_limits() {
    let desk = desk(CirculationConfig {
        alert_list_limit: 2,
        ..CirculationConfig::default()
    });
    let patron = approved_patron(&desk);
    let mut desk = desk;
    let item = desk.engine.register_item("Beloved", 5).unwrap();

    // Three decision alerts at increasing instants.
    let mut request_ids = Vec::new();
    for _ in 0..3 {
        let request = desk
            .engine
            .submit_borrow_request(patron, item.item_id, None)
            .unwrap();
        desk.clock.advance(Duration::from_secs(60));
        let admin = desk.admin;
        desk.engine
            .decide_request(request.request_id, admin, &Decision::reject("on hold"))
            .unwrap();
        request_ids.push(request.request_id);
    }

    let default_page = desk.engine.list_alerts(patron, None).unwrap();
    assert_eq!(default_page.len(), 2);
    assert_eq!(default_page[0].request_id, Some(request_ids[2]));
    assert_eq!(default_page[1].request_id, Some(request_ids[1]));

    assert_eq!(desk.engine.list_alerts(patron, Some(10)).unwrap().len(), 3);
    assert_eq!(desk.engine.list_alerts(patron, Some(0)).unwrap().len(), 2);
}

#[test]
fn read_flags_are_scoped_to_the_recipient() {
    let desk = desk(CirculationConfig::default());
    let owner = approved_patron(&desk);
    let intruder = approved_patron(&desk);
    desk.engine.send_welcome(owner).unwrap();
    desk.engine.send_welcome(intruder).unwrap();

    let alert_id = desk.engine.list_alerts(owner, None).unwrap()[0].alert_id;
    let err = desk.engine.mark_alert_read(alert_id, intruder).unwrap_err();
    assert!(matches!(err, RepoError::NotFound(Entity::Alert, id) if id == alert_id));
    assert_eq!(desk.engine.unread_alert_count(owner).unwrap(), 1);

    desk.engine.mark_alert_read(alert_id, owner).unwrap();
    assert_eq!(desk.engine.unread_alert_count(owner).unwrap(), 0);
    assert!(desk.engine.list_alerts(owner, None).unwrap()[0].is_read);
    assert_eq!(desk.engine.unread_alert_count(intruder).unwrap(), 1);
}

#[test]
fn mark_all_read_reports_changed_rows() {
    let mut desk = desk(CirculationConfig::default());
    let patron = approved_patron(&desk);
    let item = desk.engine.register_item("Jazz", 2).unwrap();
    desk.engine.send_welcome(patron).unwrap();
    let request = desk
        .engine
        .submit_borrow_request(patron, item.item_id, None)
        .unwrap();
    let admin = desk.admin;
    desk.engine
        .decide_request(request.request_id, admin, &Decision::approve())
        .unwrap();

    assert_eq!(desk.engine.unread_alert_count(patron).unwrap(), 2);
    assert_eq!(desk.engine.mark_all_alerts_read(patron).unwrap(), 2);
    assert_eq!(desk.engine.mark_all_alerts_read(patron).unwrap(), 0);
    assert_eq!(desk.engine.unread_alert_count(patron).unwrap(), 0);
}

#[test]
fn stats_track_copies_loans_and_requests() {
    let mut desk = desk(CirculationConfig::default());
    let patron = approved_patron(&desk);
    let admin = desk.admin;
    let first = desk.engine.register_item("Sula", 2).unwrap();
    let second = desk.engine.register_item("Song of Solomon", 1).unwrap();

    let borrow = desk
        .engine
        .submit_borrow_request(patron, first.item_id, None)
        .unwrap();
    desk.engine
        .decide_request(borrow.request_id, admin, &Decision::approve())
        .unwrap();
    desk.engine
        .submit_borrow_request(patron, second.item_id, None)
        .unwrap();

    assert_eq!(
        desk.engine.circulation_stats().unwrap(),
        CirculationStats {
            total_items: 2,
            total_copies: 3,
            available_copies: 2,
            loans_out: 1,
            overdue_loans: 0,
            pending_requests: 1,
        }
    );
    assert_eq!(
        desk.engine.patron_stats(patron).unwrap(),
        PatronStats {
            loans_out: 1,
            overdue_loans: 0,
            pending_requests: 1,
            lifetime_loans: 1,
        }
    );
    assert_eq!(
        desk.engine.patron_stats(Uuid::new_v4()).unwrap(),
        PatronStats::default()
    );
}
