//! Circulation request repository.
//!
//! # Responsibility
//! - Persist patron borrow/return requests and admin decisions.
//! - Serve the duplicate-request lookups used at submission time.
//!
//! # Invariants
//! - `record_decision` only matches `pending` rows; a request is decided
//!   exactly once even when two admins race.
//! - Partial unique indexes allow at most one pending borrow request per
//!   (patron, item) and one pending return request per loan; collisions
//!   surface as `RepoError::Conflict`.

use crate::model::catalog::ItemId;
use crate::model::loan::LoanId;
use crate::model::patron::PatronId;
use crate::model::request::{CirculationRequest, RequestId, RequestKind, RequestStatus};
use crate::repo::{
    is_unique_violation, parse_optional_uuid, parse_uuid, Entity, RepoError, RepoResult,
};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Row};

const REQUEST_SELECT_SQL: &str = "SELECT
    request_id,
    patron_id,
    item_id,
    kind,
    status,
    loan_id,
    submitted_at,
    decided_at,
    decided_by,
    patron_note,
    admin_response
FROM circulation_requests";

/// Decision fields written when a pending request is closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRecord<'a> {
    pub status: RequestStatus,
    pub decided_at: i64,
    pub decided_by: PatronId,
    pub admin_response: Option<&'a str>,
    /// Loan created by an approved borrow request.
    pub loan_id: Option<LoanId>,
}

/// Repository interface for circulation requests.
pub trait RequestRepository {
    fn create_request(&self, request: &CirculationRequest) -> RepoResult<RequestId>;
    fn get_request(&self, request_id: RequestId) -> RepoResult<Option<CirculationRequest>>;
    fn find_pending_borrow(
        &self,
        patron_id: PatronId,
        item_id: ItemId,
    ) -> RepoResult<Option<CirculationRequest>>;
    fn find_pending_return(&self, loan_id: LoanId) -> RepoResult<Option<CirculationRequest>>;
    /// All pending requests, newest first.
    fn list_pending(&self) -> RepoResult<Vec<CirculationRequest>>;
    /// Every request of one patron, newest first.
    fn list_for_patron(&self, patron_id: PatronId) -> RepoResult<Vec<CirculationRequest>>;
    fn record_decision(&self, request_id: RequestId, decision: &DecisionRecord<'_>)
        -> RepoResult<()>;
}

/// SQLite-backed request repository.
pub struct SqliteRequestRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRequestRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    fn query_requests(
        &self,
        sql: &str,
        bind_values: Vec<Value>,
    ) -> RepoResult<Vec<CirculationRequest>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut requests = Vec::new();
        while let Some(row) = rows.next()? {
            requests.push(parse_request_row(row)?);
        }
        Ok(requests)
    }
}

impl RequestRepository for SqliteRequestRepository<'_> {
    fn create_request(&self, request: &CirculationRequest) -> RepoResult<RequestId> {
        request.validate()?;

        let inserted = self.conn.execute(
            "INSERT INTO circulation_requests (
                request_id,
                patron_id,
                item_id,
                kind,
                status,
                loan_id,
                submitted_at,
                decided_at,
                decided_by,
                patron_note,
                admin_response
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11);",
            params![
                request.request_id.to_string(),
                request.patron_id.to_string(),
                request.item_id.to_string(),
                request_kind_to_db(request.kind),
                request_status_to_db(request.status),
                request.loan_id.map(|id| id.to_string()),
                request.submitted_at,
                request.decided_at,
                request.decided_by.map(|id| id.to_string()),
                request.patron_note.as_deref(),
                request.admin_response.as_deref(),
            ],
        );

        match inserted {
            Ok(_) => Ok(request.request_id),
            Err(err) if is_unique_violation(&err) => Err(RepoError::Conflict(match request.kind {
                RequestKind::Borrow => "one pending borrow request per patron and item",
                RequestKind::Return => "one pending return request per loan",
            })),
            Err(err) => Err(err.into()),
        }
    }

    fn get_request(&self, request_id: RequestId) -> RepoResult<Option<CirculationRequest>> {
        let mut requests = self.query_requests(
            &format!("{REQUEST_SELECT_SQL} WHERE request_id = ?;"),
            vec![Value::Text(request_id.to_string())],
        )?;
        Ok(requests.pop())
    }

    fn find_pending_borrow(
        &self,
        patron_id: PatronId,
        item_id: ItemId,
    ) -> RepoResult<Option<CirculationRequest>> {
        let mut requests = self.query_requests(
            &format!(
                "{REQUEST_SELECT_SQL}
                 WHERE patron_id = ?
                   AND item_id = ?
                   AND kind = 'borrow'
                   AND status = 'pending'
                 LIMIT 1;"
            ),
            vec![
                Value::Text(patron_id.to_string()),
                Value::Text(item_id.to_string()),
            ],
        )?;
        Ok(requests.pop())
    }

    fn find_pending_return(&self, loan_id: LoanId) -> RepoResult<Option<CirculationRequest>> {
        let mut requests = self.query_requests(
            &format!(
                "{REQUEST_SELECT_SQL}
                 WHERE loan_id = ?
                   AND kind = 'return'
                   AND status = 'pending'
                 LIMIT 1;"
            ),
            vec![Value::Text(loan_id.to_string())],
        )?;
        Ok(requests.pop())
    }

    fn list_pending(&self) -> RepoResult<Vec<CirculationRequest>> {
        self.query_requests(
            &format!(
                "{REQUEST_SELECT_SQL}
                 WHERE status = 'pending'
                 ORDER BY submitted_at DESC, request_id ASC;"
            ),
            Vec::new(),
        )
    }

    fn list_for_patron(&self, patron_id: PatronId) -> RepoResult<Vec<CirculationRequest>> {
        self.query_requests(
            &format!(
                "{REQUEST_SELECT_SQL}
                 WHERE patron_id = ?
                 ORDER BY submitted_at DESC, request_id ASC;"
            ),
            vec![Value::Text(patron_id.to_string())],
        )
    }

    fn record_decision(
        &self,
        request_id: RequestId,
        decision: &DecisionRecord<'_>,
    ) -> RepoResult<()> {
        if decision.status == RequestStatus::Pending {
            return Err(RepoError::InvalidData(
                "a decision must move the request out of pending".to_string(),
            ));
        }

        let changed = self.conn.execute(
            "UPDATE circulation_requests
             SET
                status = ?2,
                decided_at = ?3,
                decided_by = ?4,
                admin_response = ?5,
                loan_id = COALESCE(?6, loan_id)
             WHERE request_id = ?1
               AND status = 'pending';",
            params![
                request_id.to_string(),
                request_status_to_db(decision.status),
                decision.decided_at,
                decision.decided_by.to_string(),
                decision.admin_response,
                decision.loan_id.map(|id| id.to_string()),
            ],
        )?;

        if changed == 0 {
            return Err(match self.get_request(request_id)? {
                Some(_) => RepoError::StateConflict(Entity::Request, request_id),
                None => RepoError::NotFound(Entity::Request, request_id),
            });
        }
        Ok(())
    }
}

fn parse_request_row(row: &Row<'_>) -> RepoResult<CirculationRequest> {
    let request_text: String = row.get("request_id")?;
    let patron_text: String = row.get("patron_id")?;
    let item_text: String = row.get("item_id")?;

    let kind_text: String = row.get("kind")?;
    let kind = parse_request_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid request kind `{kind_text}` in circulation_requests.kind"
        ))
    })?;

    let status_text: String = row.get("status")?;
    let status = parse_request_status(&status_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid request status `{status_text}` in circulation_requests.status"
        ))
    })?;

    let request = CirculationRequest {
        request_id: parse_uuid(&request_text, "circulation_requests.request_id")?,
        patron_id: parse_uuid(&patron_text, "circulation_requests.patron_id")?,
        item_id: parse_uuid(&item_text, "circulation_requests.item_id")?,
        kind,
        status,
        loan_id: parse_optional_uuid(row.get("loan_id")?, "circulation_requests.loan_id")?,
        submitted_at: row.get("submitted_at")?,
        decided_at: row.get("decided_at")?,
        decided_by: parse_optional_uuid(row.get("decided_by")?, "circulation_requests.decided_by")?,
        patron_note: row.get("patron_note")?,
        admin_response: row.get("admin_response")?,
    };
    request.validate()?;
    Ok(request)
}

fn request_kind_to_db(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Borrow => "borrow",
        RequestKind::Return => "return",
    }
}

fn parse_request_kind(value: &str) -> Option<RequestKind> {
    match value {
        "borrow" => Some(RequestKind::Borrow),
        "return" => Some(RequestKind::Return),
        _ => None,
    }
}

fn request_status_to_db(status: RequestStatus) -> &'static str {
    match status {
        RequestStatus::Pending => "pending",
        RequestStatus::Approved => "approved",
        RequestStatus::Rejected => "rejected",
    }
}

fn parse_request_status(value: &str) -> Option<RequestStatus> {
    match value {
        "pending" => Some(RequestStatus::Pending),
        "approved" => Some(RequestStatus::Approved),
        "rejected" => Some(RequestStatus::Rejected),
        _ => None,
    }
}
