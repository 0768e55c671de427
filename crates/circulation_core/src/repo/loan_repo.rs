//! Loan record repository.
//!
//! # Responsibility
//! - Persist loans created by approved borrow requests.
//! - Provide the status transitions used by the workflow (`close_loan`) and
//!   the scheduler (`mark_overdue`).
//! - Serve the scheduler's due-date range scans.
//!
//! # Invariants
//! - `close_loan` and `mark_overdue` only match outstanding rows, so a
//!   returned loan is never reopened by a late sweep.
//! - `mark_overdue` on an already-overdue loan is a no-op in effect.

use crate::model::catalog::ItemId;
use crate::model::loan::{LoanId, LoanRecord, LoanStatus};
use crate::model::patron::PatronId;
use crate::repo::{parse_uuid, Entity, RepoError, RepoResult};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const LOAN_SELECT_SQL: &str = "SELECT
    loan_id,
    patron_id,
    item_id,
    borrowed_at,
    due_at,
    returned_at,
    status,
    fine_amount
FROM loans";

/// Filter for patron loan listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanListQuery {
    pub patron_id: PatronId,
    /// Include `returned` loans (full history) instead of only outstanding.
    pub include_returned: bool,
}

/// Repository interface for loan persistence.
pub trait LoanRepository {
    fn create_loan(&self, loan: &LoanRecord) -> RepoResult<LoanId>;
    fn get_loan(&self, loan_id: LoanId) -> RepoResult<Option<LoanRecord>>;
    /// Outstanding loan of `item_id` held by `patron_id`, if any.
    fn find_outstanding(
        &self,
        patron_id: PatronId,
        item_id: ItemId,
    ) -> RepoResult<Option<LoanRecord>>;
    /// Lists loans newest-borrowed first.
    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<LoanRecord>>;
    /// Moves an outstanding loan to `returned`.
    fn close_loan(
        &self,
        loan_id: LoanId,
        returned_at: i64,
        fine_amount: Option<i64>,
    ) -> RepoResult<()>;
    /// Moves an outstanding loan to `overdue`. Returns `false` if the loan is
    /// no longer outstanding.
    fn mark_overdue(&self, loan_id: LoanId, now: i64) -> RepoResult<bool>;
    /// Active loans with `start <= due_at < end`.
    fn list_active_due_between(&self, start: i64, end: i64) -> RepoResult<Vec<LoanRecord>>;
    /// Outstanding loans with `due_at < cutoff`.
    fn list_outstanding_due_before(&self, cutoff: i64) -> RepoResult<Vec<LoanRecord>>;
}

/// SQLite-backed loan repository.
pub struct SqliteLoanRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteLoanRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_loans(&self, sql: &str, bind_values: Vec<Value>) -> RepoResult<Vec<LoanRecord>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut loans = Vec::new();
        while let Some(row) = rows.next()? {
            loans.push(parse_loan_row(row)?);
        }
        Ok(loans)
    }
}

impl LoanRepository for SqliteLoanRepository<'_> {
    fn create_loan(&self, loan: &LoanRecord) -> RepoResult<LoanId> {
        loan.validate()?;

        self.conn.execute(
            "INSERT INTO loans (
                loan_id,
                patron_id,
                item_id,
                borrowed_at,
                due_at,
                returned_at,
                status,
                fine_amount,
                updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?4);",
            params![
                loan.loan_id.to_string(),
                loan.patron_id.to_string(),
                loan.item_id.to_string(),
                loan.borrowed_at,
                loan.due_at,
                loan.returned_at,
                loan_status_to_db(loan.status),
                loan.fine_amount,
            ],
        )?;

        Ok(loan.loan_id)
    }

    fn get_loan(&self, loan_id: LoanId) -> RepoResult<Option<LoanRecord>> {
        let mut loans = self.query_loans(
            &format!("{LOAN_SELECT_SQL} WHERE loan_id = ?;"),
            vec![Value::Text(loan_id.to_string())],
        )?;
        Ok(loans.pop())
    }

    fn find_outstanding(
        &self,
        patron_id: PatronId,
        item_id: ItemId,
    ) -> RepoResult<Option<LoanRecord>> {
        let mut loans = self.query_loans(
            &format!(
                "{LOAN_SELECT_SQL}
                 WHERE patron_id = ?
                   AND item_id = ?
                   AND status IN ('active', 'overdue')
                 ORDER BY borrowed_at DESC
                 LIMIT 1;"
            ),
            vec![
                Value::Text(patron_id.to_string()),
                Value::Text(item_id.to_string()),
            ],
        )?;
        Ok(loans.pop())
    }

    fn list_loans(&self, query: &LoanListQuery) -> RepoResult<Vec<LoanRecord>> {
        let mut sql = format!("{LOAN_SELECT_SQL} WHERE patron_id = ?");
        if !query.include_returned {
            sql.push_str(" AND status IN ('active', 'overdue')");
        }
        sql.push_str(" ORDER BY borrowed_at DESC, loan_id ASC;");
        self.query_loans(&sql, vec![Value::Text(query.patron_id.to_string())])
    }

    fn close_loan(
        &self,
        loan_id: LoanId,
        returned_at: i64,
        fine_amount: Option<i64>,
    ) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE loans
             SET
                status = 'returned',
                returned_at = ?2,
                fine_amount = COALESCE(?3, fine_amount),
                updated_at = ?2
             WHERE loan_id = ?1
               AND status IN ('active', 'overdue');",
            params![loan_id.to_string(), returned_at, fine_amount],
        )?;

        if changed == 0 {
            return Err(missing_or_conflict(self, loan_id)?);
        }
        Ok(())
    }

    fn mark_overdue(&self, loan_id: LoanId, now: i64) -> RepoResult<bool> {
        let changed = self.conn.execute(
            "UPDATE loans
             SET
                status = 'overdue',
                updated_at = CASE WHEN status = 'overdue' THEN updated_at ELSE ?2 END
             WHERE loan_id = ?1
               AND status IN ('active', 'overdue');",
            params![loan_id.to_string(), now],
        )?;
        Ok(changed > 0)
    }

    fn list_active_due_between(&self, start: i64, end: i64) -> RepoResult<Vec<LoanRecord>> {
        self.query_loans(
            &format!(
                "{LOAN_SELECT_SQL}
                 WHERE status = 'active'
                   AND due_at >= ?
                   AND due_at < ?
                 ORDER BY due_at ASC, loan_id ASC;"
            ),
            vec![Value::Integer(start), Value::Integer(end)],
        )
    }

    fn list_outstanding_due_before(&self, cutoff: i64) -> RepoResult<Vec<LoanRecord>> {
        self.query_loans(
            &format!(
                "{LOAN_SELECT_SQL}
                 WHERE status IN ('active', 'overdue')
                   AND due_at < ?
                 ORDER BY due_at ASC, loan_id ASC;"
            ),
            vec![Value::Integer(cutoff)],
        )
    }
}

fn missing_or_conflict(repo: &SqliteLoanRepository<'_>, loan_id: LoanId) -> RepoResult<RepoError> {
    Ok(match repo.get_loan(loan_id)? {
        Some(_) => RepoError::StateConflict(Entity::Loan, loan_id),
        None => RepoError::NotFound(Entity::Loan, loan_id),
    })
}

fn parse_loan_row(row: &Row<'_>) -> RepoResult<LoanRecord> {
    let loan_text: String = row.get("loan_id")?;
    let patron_text: String = row.get("patron_id")?;
    let item_text: String = row.get("item_id")?;
    let status_text: String = row.get("status")?;
    let status = parse_loan_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid loan status `{status_text}` in loans.status"))
    })?;

    let loan = LoanRecord {
        loan_id: parse_uuid(&loan_text, "loans.loan_id")?,
        patron_id: parse_uuid(&patron_text, "loans.patron_id")?,
        item_id: parse_uuid(&item_text, "loans.item_id")?,
        borrowed_at: row.get("borrowed_at")?,
        due_at: row.get("due_at")?,
        returned_at: row.get("returned_at")?,
        status,
        fine_amount: row.get("fine_amount")?,
    };
    loan.validate()?;
    Ok(loan)
}

fn loan_status_to_db(status: LoanStatus) -> &'static str {
    match status {
        LoanStatus::Active => "active",
        LoanStatus::Returned => "returned",
        LoanStatus::Overdue => "overdue",
    }
}

fn parse_loan_status(value: &str) -> Option<LoanStatus> {
    match value {
        "active" => Some(LoanStatus::Active),
        "returned" => Some(LoanStatus::Returned),
        "overdue" => Some(LoanStatus::Overdue),
        _ => None,
    }
}
