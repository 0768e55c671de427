//! Read-only circulation aggregates for dashboards.

use crate::model::patron::PatronId;
use crate::repo::{parse_count, RepoResult};
use rusqlite::{Connection, Row};

/// Library-wide circulation counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CirculationStats {
    pub total_items: u32,
    pub total_copies: u32,
    pub available_copies: u32,
    /// Loans in `active` or `overdue`.
    pub loans_out: u32,
    pub overdue_loans: u32,
    pub pending_requests: u32,
}

/// Counters for one patron.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatronStats {
    pub loans_out: u32,
    pub overdue_loans: u32,
    pub pending_requests: u32,
    /// Every loan ever opened for the patron.
    pub lifetime_loans: u32,
}

pub struct SqliteStatsRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteStatsRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    pub fn circulation_stats(&self) -> RepoResult<CirculationStats> {
        let stats = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM catalog_items) AS total_items,
                (SELECT COALESCE(SUM(total_copies), 0) FROM catalog_items) AS total_copies,
                (SELECT COALESCE(SUM(available_copies), 0) FROM catalog_items) AS available_copies,
                (SELECT COUNT(*) FROM loans WHERE status IN ('active', 'overdue')) AS loans_out,
                (SELECT COUNT(*) FROM loans WHERE status = 'overdue') AS overdue_loans,
                (SELECT COUNT(*) FROM circulation_requests WHERE status = 'pending')
                    AS pending_requests;",
            [],
            |row| Ok(read_counts::<6>(row)),
        )??;

        Ok(CirculationStats {
            total_items: stats[0],
            total_copies: stats[1],
            available_copies: stats[2],
            loans_out: stats[3],
            overdue_loans: stats[4],
            pending_requests: stats[5],
        })
    }

    pub fn patron_stats(&self, patron_id: PatronId) -> RepoResult<PatronStats> {
        let stats = self.conn.query_row(
            "SELECT
                (SELECT COUNT(*) FROM loans
                    WHERE patron_id = ?1 AND status IN ('active', 'overdue')) AS loans_out,
                (SELECT COUNT(*) FROM loans
                    WHERE patron_id = ?1 AND status = 'overdue') AS overdue_loans,
                (SELECT COUNT(*) FROM circulation_requests
                    WHERE patron_id = ?1 AND status = 'pending') AS pending_requests,
                (SELECT COUNT(*) FROM loans WHERE patron_id = ?1) AS lifetime_loans;",
            [patron_id.to_string()],
            |row| Ok(read_counts::<4>(row)),
        )??;

        Ok(PatronStats {
            loans_out: stats[0],
            overdue_loans: stats[1],
            pending_requests: stats[2],
            lifetime_loans: stats[3],
        })
    }
}

fn read_counts<const N: usize>(row: &Row<'_>) -> RepoResult<[u32; N]> {
    let mut counts = [0_u32; N];
    for (index, slot) in counts.iter_mut().enumerate() {
        *slot = parse_count(row.get(index)?, "stats")?;
    }
    Ok(counts)
}
