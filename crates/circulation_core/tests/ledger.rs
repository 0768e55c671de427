use circulation_core::db::open_db_in_memory;
use circulation_core::repo::catalog_repo::{InventoryLedger, SqliteInventoryLedger};
use circulation_core::{CatalogItem, Entity, RepoError};
use uuid::Uuid;

#[test]
fn reserve_counts_down_and_stops_at_zero() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteInventoryLedger::new(&conn);
    let item = CatalogItem::new("The Left Hand of Darkness", 2);
    ledger.register_item(&item).unwrap();

    assert_eq!(ledger.try_reserve(item.item_id).unwrap().remaining, 1);
    assert_eq!(ledger.try_reserve(item.item_id).unwrap().remaining, 0);

    let err = ledger.try_reserve(item.item_id).unwrap_err();
    assert!(matches!(err, RepoError::NoCopiesAvailable(id) if id == item.item_id));

    let stored = ledger.get_item(item.item_id).unwrap().unwrap();
    assert_eq!(stored.available_copies, 0);
    assert_eq!(stored.copies_on_loan(), 2);
}

#[test]
fn release_restores_copy_and_refuses_to_exceed_total() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteInventoryLedger::new(&conn);
    let item = CatalogItem::new("Kindred", 1);
    ledger.register_item(&item).unwrap();

    ledger.try_reserve(item.item_id).unwrap();
    ledger.release(item.item_id).unwrap();
    assert_eq!(
        ledger.get_item(item.item_id).unwrap().unwrap().available_copies,
        1
    );

    let err = ledger.release(item.item_id).unwrap_err();
    assert!(matches!(err, RepoError::LedgerOverflow(id) if id == item.item_id));
}

#[test]
fn unknown_item_is_not_found() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteInventoryLedger::new(&conn);
    let missing = Uuid::new_v4();

    assert!(matches!(
        ledger.try_reserve(missing).unwrap_err(),
        RepoError::NotFound(Entity::Item, id) if id == missing
    ));
    assert!(matches!(
        ledger.release(missing).unwrap_err(),
        RepoError::NotFound(Entity::Item, _)
    ));
    assert!(ledger.get_item(missing).unwrap().is_none());
}

#[test]
fn register_rejects_zero_copies() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteInventoryLedger::new(&conn);

    let err = ledger
        .register_item(&CatalogItem::new("Empty shelf", 0))
        .unwrap_err();
    assert!(matches!(err, RepoError::Validation(_)));
}

#[test]
fn audit_without_loans_is_consistent_only_when_shelf_is_full() {
    let conn = open_db_in_memory().unwrap();
    let ledger = SqliteInventoryLedger::new(&conn);
    let item = CatalogItem::new("Piranesi", 3);
    ledger.register_item(&item).unwrap();

    let audit = ledger.audit(item.item_id).unwrap();
    assert_eq!(audit.outstanding_loans, 0);
    assert!(audit.is_consistent());

    // A reservation with no loan behind it is exactly what the audit catches.
    ledger.try_reserve(item.item_id).unwrap();
    assert!(!ledger.audit(item.item_id).unwrap().is_consistent());
}
