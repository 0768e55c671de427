//! Inventory ledger: copy counters for catalog items.
//!
//! # Responsibility
//! - Register catalog items on behalf of the catalog collaborator.
//! - Own every mutation of `available_copies` (reserve on loan, release on
//!   return).
//!
//! # Invariants
//! - Reservation is one conditional `UPDATE ... WHERE available_copies > 0`;
//!   there is no read-then-write path, so racing reservations cannot oversell.
//! - Release is one conditional `UPDATE ... WHERE available_copies <
//!   total_copies`.
//! - Callers run reserve/release inside the transaction that writes the
//!   matching loan row.

use crate::model::catalog::{CatalogItem, ItemId};
use crate::repo::{parse_count, parse_uuid, Entity, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

/// Successful copy reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub item_id: ItemId,
    /// Copies left on the shelf after this reservation.
    pub remaining: u32,
}

/// Recount of one item against its outstanding loans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerAudit {
    pub item_id: ItemId,
    pub total_copies: u32,
    pub available_copies: u32,
    /// Loans in `active` or `overdue` referencing the item.
    pub outstanding_loans: u32,
}

impl LedgerAudit {
    /// `available = total - outstanding`.
    pub fn is_consistent(&self) -> bool {
        u64::from(self.available_copies) + u64::from(self.outstanding_loans)
            == u64::from(self.total_copies)
    }
}

/// Copy-counter authority for catalog items.
pub trait InventoryLedger {
    /// Registers a new item with every copy available.
    fn register_item(&self, item: &CatalogItem) -> RepoResult<ItemId>;
    fn get_item(&self, item_id: ItemId) -> RepoResult<Option<CatalogItem>>;
    /// Takes one copy off the shelf or fails with `NoCopiesAvailable`.
    fn try_reserve(&self, item_id: ItemId) -> RepoResult<Reservation>;
    /// Puts one copy back on the shelf.
    fn release(&self, item_id: ItemId) -> RepoResult<()>;
    fn audit(&self, item_id: ItemId) -> RepoResult<LedgerAudit>;
}

/// SQLite-backed ledger over `catalog_items`.
pub struct SqliteInventoryLedger<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteInventoryLedger<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl InventoryLedger for SqliteInventoryLedger<'_> {
    fn register_item(&self, item: &CatalogItem) -> RepoResult<ItemId> {
        item.validate()?;

        self.conn.execute(
            "INSERT INTO catalog_items (
                item_id,
                title,
                total_copies,
                available_copies
            ) VALUES (?1, ?2, ?3, ?4);",
            params![
                item.item_id.to_string(),
                item.title.as_str(),
                i64::from(item.total_copies),
                i64::from(item.available_copies),
            ],
        )?;

        Ok(item.item_id)
    }

    fn get_item(&self, item_id: ItemId) -> RepoResult<Option<CatalogItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT item_id, title, total_copies, available_copies
             FROM catalog_items
             WHERE item_id = ?1;",
        )?;
        let mut rows = stmt.query([item_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }
        Ok(None)
    }

    fn try_reserve(&self, item_id: ItemId) -> RepoResult<Reservation> {
        let remaining: Option<i64> = self
            .conn
            .query_row(
                "UPDATE catalog_items
                 SET available_copies = available_copies - 1
                 WHERE item_id = ?1
                   AND available_copies > 0
                 RETURNING available_copies;",
                [item_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match remaining {
            Some(value) => Ok(Reservation {
                item_id,
                remaining: parse_count(value, "catalog_items.available_copies")?,
            }),
            None if item_exists(self.conn, item_id)? => Err(RepoError::NoCopiesAvailable(item_id)),
            None => Err(RepoError::NotFound(Entity::Item, item_id)),
        }
    }

    fn release(&self, item_id: ItemId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE catalog_items
             SET available_copies = available_copies + 1
             WHERE item_id = ?1
               AND available_copies < total_copies;",
            [item_id.to_string()],
        )?;

        if changed == 0 {
            if item_exists(self.conn, item_id)? {
                return Err(RepoError::LedgerOverflow(item_id));
            }
            return Err(RepoError::NotFound(Entity::Item, item_id));
        }

        Ok(())
    }

    fn audit(&self, item_id: ItemId) -> RepoResult<LedgerAudit> {
        let item = self
            .get_item(item_id)?
            .ok_or(RepoError::NotFound(Entity::Item, item_id))?;
        let outstanding: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM loans
             WHERE item_id = ?1
               AND status IN ('active', 'overdue');",
            [item_id.to_string()],
            |row| row.get(0),
        )?;

        Ok(LedgerAudit {
            item_id,
            total_copies: item.total_copies,
            available_copies: item.available_copies,
            outstanding_loans: parse_count(outstanding, "loans.count")?,
        })
    }
}

fn item_exists(conn: &Connection, item_id: ItemId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM catalog_items WHERE item_id = ?1);",
        [item_id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<CatalogItem> {
    let id_text: String = row.get("item_id")?;
    let item = CatalogItem {
        item_id: parse_uuid(&id_text, "catalog_items.item_id")?,
        title: row.get("title")?,
        total_copies: parse_count(row.get("total_copies")?, "catalog_items.total_copies")?,
        available_copies: parse_count(
            row.get("available_copies")?,
            "catalog_items.available_copies",
        )?,
    };
    item.validate()?;
    Ok(item)
}
