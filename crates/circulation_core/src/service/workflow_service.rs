//! Borrow/return request workflow.
//!
//! # Responsibility
//! - Validate patron intents against the ledger and loan store at submission.
//! - Apply admin decisions: ledger, loan, request status and decision alert.
//!
//! # Invariants
//! - Every mutating operation is one `IMMEDIATE` transaction; a failure at
//!   any step rolls back every write of that operation.
//! - A request leaves `pending` at most once.
//! - A borrow approval that loses the race for the last copy fails with
//!   `ItemUnavailable` and leaves the request `pending`.

use crate::clock::Clock;
use crate::config::CirculationConfig;
use crate::directory::PatronDirectory;
use crate::model::catalog::{CatalogItem, ItemId};
use crate::model::loan::{LoanId, LoanRecord};
use crate::model::patron::PatronId;
use crate::model::request::{
    CirculationRequest, Decision, DecisionOutcome, RequestId, RequestKind,
};
use crate::repo::alert_repo::{AlertRepository, SqliteAlertRepository};
use crate::repo::catalog_repo::{InventoryLedger, SqliteInventoryLedger};
use crate::repo::loan_repo::{LoanListQuery, LoanRepository, SqliteLoanRepository};
use crate::repo::request_repo::{DecisionRecord, RequestRepository, SqliteRequestRepository};
use crate::repo::{Entity, RepoError};
use crate::service::messages::{self, normalize_note};
use log::{info, warn};
use rusqlite::{Connection, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;
use uuid::Uuid;

pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Errors returned by workflow operations.
#[derive(Debug)]
pub enum WorkflowError {
    /// Referenced record is absent.
    NotFound(Entity, Uuid),
    /// Loan is missing or not owned by the requesting patron.
    NoSuchLoan(LoanId),
    /// Request was already approved or rejected.
    AlreadyProcessed(RequestId),
    /// Record exists but its state forbids the operation.
    InvalidState(String),
    /// No copy on the shelf at submission or approval time.
    ItemUnavailable(ItemId),
    /// Conflicting pending request or outstanding loan.
    DuplicateRequest(&'static str),
    /// Patron unknown to the directory or not approved.
    PatronNotEligible(PatronId),
    /// Acting identity may not decide requests.
    Forbidden(PatronId),
    /// Persistence failure; the whole unit was rolled back.
    TransientStoreFailure(RepoError),
}

impl WorkflowError {
    /// Stable classification used in log lines and by callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(..) | Self::NoSuchLoan(_) => "not_found",
            Self::AlreadyProcessed(_) | Self::InvalidState(_) => "invalid_state",
            Self::ItemUnavailable(_) => "item_unavailable",
            Self::DuplicateRequest(_) => "duplicate_request",
            Self::PatronNotEligible(_) | Self::Forbidden(_) => "forbidden",
            Self::TransientStoreFailure(_) => "store_failure",
        }
    }

    /// Only store failures are worth re-invoking unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStoreFailure(_))
    }
}

impl Display for WorkflowError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(entity, id) => write!(f, "{} not found: {id}", entity.as_str()),
            Self::NoSuchLoan(id) => write!(f, "no outstanding loan {id} for this patron"),
            Self::AlreadyProcessed(id) => write!(f, "request {id} was already processed"),
            Self::InvalidState(message) => write!(f, "invalid state: {message}"),
            Self::ItemUnavailable(id) => write!(f, "item {id} has no available copies"),
            Self::DuplicateRequest(reason) => write!(f, "duplicate request: {reason}"),
            Self::PatronNotEligible(id) => write!(f, "patron {id} may not submit requests"),
            Self::Forbidden(id) => write!(f, "identity {id} may not decide requests"),
            Self::TransientStoreFailure(err) => write!(f, "store failure: {err}"),
        }
    }
}

impl Error for WorkflowError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::TransientStoreFailure(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for WorkflowError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NotFound(entity, id) => Self::NotFound(entity, id),
            RepoError::NoCopiesAvailable(item_id) => Self::ItemUnavailable(item_id),
            RepoError::Conflict(rule) => Self::DuplicateRequest(rule),
            RepoError::StateConflict(Entity::Request, id) => Self::AlreadyProcessed(id),
            RepoError::StateConflict(entity, id) => Self::InvalidState(format!(
                "{} {id} changed state concurrently",
                entity.as_str()
            )),
            RepoError::LedgerOverflow(item_id) => Self::InvalidState(format!(
                "ledger for item {item_id} already has every copy on the shelf"
            )),
            other => Self::TransientStoreFailure(other),
        }
    }
}

impl From<rusqlite::Error> for WorkflowError {
    fn from(value: rusqlite::Error) -> Self {
        Self::TransientStoreFailure(value.into())
    }
}

/// Request workflow over one SQLite connection.
pub struct RequestWorkflow<'a> {
    conn: &'a mut Connection,
    directory: &'a dyn PatronDirectory,
    clock: &'a dyn Clock,
    config: &'a CirculationConfig,
}

impl<'a> RequestWorkflow<'a> {
    pub fn new(
        conn: &'a mut Connection,
        directory: &'a dyn PatronDirectory,
        clock: &'a dyn Clock,
        config: &'a CirculationConfig,
    ) -> Self {
        Self {
            conn,
            directory,
            clock,
            config,
        }
    }

    /// Files a borrow request for one copy of `item_id`.
    ///
    /// # Errors
    /// - `ItemUnavailable` when no copy is on the shelf right now.
    /// - `DuplicateRequest` when the patron already has a pending borrow
    ///   request or an outstanding loan for the item.
    pub fn submit_borrow_request(
        &mut self,
        patron_id: PatronId,
        item_id: ItemId,
        note: Option<&str>,
    ) -> WorkflowResult<CirculationRequest> {
        let started_at = Instant::now();
        let result = self.submit_borrow_unit(patron_id, item_id, note);
        log_outcome("request_submit", "borrow", started_at, &result);
        result
    }

    /// Files a return request for an outstanding loan owned by `patron_id`.
    ///
    /// # Errors
    /// - `NoSuchLoan` when the loan is missing or held by someone else.
    /// - `InvalidState` when the loan is already returned.
    /// - `DuplicateRequest` when a return request for the loan is pending.
    pub fn submit_return_request(
        &mut self,
        patron_id: PatronId,
        loan_id: LoanId,
        note: Option<&str>,
    ) -> WorkflowResult<CirculationRequest> {
        let started_at = Instant::now();
        let result = self.submit_return_unit(patron_id, loan_id, note);
        log_outcome("request_submit", "return", started_at, &result);
        result
    }

    /// Applies an admin decision to a pending request.
    ///
    /// Safe to retry after `TransientStoreFailure`: a retry that finds the
    /// request already decided returns `AlreadyProcessed`.
    pub fn decide_request(
        &mut self,
        request_id: RequestId,
        admin_id: PatronId,
        decision: &Decision,
    ) -> WorkflowResult<CirculationRequest> {
        let started_at = Instant::now();
        let result = self.decide_unit(request_id, admin_id, decision);
        let outcome = match decision.outcome {
            DecisionOutcome::Approve => "approve",
            DecisionOutcome::Reject => "reject",
        };
        log_outcome("request_decide", outcome, started_at, &result);
        result
    }

    pub fn get_request(&self, request_id: RequestId) -> WorkflowResult<CirculationRequest> {
        SqliteRequestRepository::new(self.conn)
            .get_request(request_id)?
            .ok_or(WorkflowError::NotFound(Entity::Request, request_id))
    }

    /// Pending requests across all patrons, newest first.
    pub fn list_pending_requests(&self) -> WorkflowResult<Vec<CirculationRequest>> {
        Ok(SqliteRequestRepository::new(self.conn).list_pending()?)
    }

    pub fn list_requests_for_patron(
        &self,
        patron_id: PatronId,
    ) -> WorkflowResult<Vec<CirculationRequest>> {
        Ok(SqliteRequestRepository::new(self.conn).list_for_patron(patron_id)?)
    }

    /// Outstanding (`active`/`overdue`) loans of one patron.
    pub fn list_loans_for_patron(&self, patron_id: PatronId) -> WorkflowResult<Vec<LoanRecord>> {
        Ok(SqliteLoanRepository::new(self.conn).list_loans(&LoanListQuery {
            patron_id,
            include_returned: false,
        })?)
    }

    /// Every loan of one patron, including returned ones.
    pub fn loan_history_for_patron(&self, patron_id: PatronId) -> WorkflowResult<Vec<LoanRecord>> {
        Ok(SqliteLoanRepository::new(self.conn).list_loans(&LoanListQuery {
            patron_id,
            include_returned: true,
        })?)
    }

    fn submit_borrow_unit(
        &mut self,
        patron_id: PatronId,
        item_id: ItemId,
        note: Option<&str>,
    ) -> WorkflowResult<CirculationRequest> {
        self.require_eligible(patron_id)?;
        let now = self.clock.now_ms();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ledger = SqliteInventoryLedger::new(&tx);
        let requests = SqliteRequestRepository::new(&tx);
        let loans = SqliteLoanRepository::new(&tx);

        let item = load_item(&ledger, item_id)?;
        if item.available_copies == 0 {
            return Err(WorkflowError::ItemUnavailable(item_id));
        }
        if requests.find_pending_borrow(patron_id, item_id)?.is_some() {
            return Err(WorkflowError::DuplicateRequest(
                "a borrow request for this item is already pending",
            ));
        }
        if loans.find_outstanding(patron_id, item_id)?.is_some() {
            return Err(WorkflowError::DuplicateRequest(
                "this item is already on loan to the patron",
            ));
        }

        let request = CirculationRequest::borrow(patron_id, item_id, now, normalize_note(note));
        requests.create_request(&request)?;
        tx.commit()?;
        Ok(request)
    }

    fn submit_return_unit(
        &mut self,
        patron_id: PatronId,
        loan_id: LoanId,
        note: Option<&str>,
    ) -> WorkflowResult<CirculationRequest> {
        self.require_eligible(patron_id)?;
        let now = self.clock.now_ms();

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let requests = SqliteRequestRepository::new(&tx);
        let loans = SqliteLoanRepository::new(&tx);

        let loan = loans
            .get_loan(loan_id)?
            .filter(|loan| loan.patron_id == patron_id)
            .ok_or(WorkflowError::NoSuchLoan(loan_id))?;
        if !loan.status.is_outstanding() {
            return Err(WorkflowError::InvalidState(format!(
                "loan {loan_id} is already returned"
            )));
        }
        if requests.find_pending_return(loan_id)?.is_some() {
            return Err(WorkflowError::DuplicateRequest(
                "a return request for this loan is already pending",
            ));
        }

        let request =
            CirculationRequest::return_of(patron_id, loan.item_id, loan_id, now, normalize_note(note));
        requests.create_request(&request)?;
        tx.commit()?;
        Ok(request)
    }

    fn decide_unit(
        &mut self,
        request_id: RequestId,
        admin_id: PatronId,
        decision: &Decision,
    ) -> WorkflowResult<CirculationRequest> {
        let admin_may_decide = self
            .directory
            .standing(admin_id)
            .is_some_and(|standing| standing.may_decide());
        if !admin_may_decide {
            return Err(WorkflowError::Forbidden(admin_id));
        }
        if decision.recorded_fine.is_some_and(|fine| fine < 0) {
            return Err(WorkflowError::InvalidState(
                "recorded fine cannot be negative".to_string(),
            ));
        }
        let now = self.clock.now_ms();
        let offset = self.config.utc_offset();
        let response_note = normalize_note(decision.response_note.as_deref());

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ledger = SqliteInventoryLedger::new(&tx);
        let requests = SqliteRequestRepository::new(&tx);
        let loans = SqliteLoanRepository::new(&tx);
        let alerts = SqliteAlertRepository::new(&tx);

        let mut request = requests
            .get_request(request_id)?
            .ok_or(WorkflowError::NotFound(Entity::Request, request_id))?;
        if !request.is_pending() {
            return Err(WorkflowError::AlreadyProcessed(request_id));
        }
        let item = load_item(&ledger, request.item_id)?;

        let (created_loan, alert) = match (decision.outcome, request.kind) {
            (DecisionOutcome::Approve, RequestKind::Borrow) => {
                ledger.try_reserve(item.item_id)?;
                let loan = LoanRecord::open(
                    request.patron_id,
                    item.item_id,
                    now,
                    self.config.loan_period_days,
                );
                loans.create_loan(&loan)?;
                let alert = messages::borrow_approved(&request, &item, &loan, offset, now);
                (Some(loan.loan_id), alert)
            }
            (DecisionOutcome::Approve, RequestKind::Return) => {
                let loan_id = request.loan_id.ok_or_else(|| {
                    WorkflowError::InvalidState(format!(
                        "return request {request_id} has no loan link"
                    ))
                })?;
                loans.close_loan(loan_id, now, decision.recorded_fine)?;
                ledger.release(item.item_id)?;
                (None, messages::return_approved(&request, &item, now))
            }
            (DecisionOutcome::Reject, _) => (
                None,
                messages::request_rejected(&request, &item, response_note.as_deref(), now),
            ),
        };

        requests.record_decision(
            request_id,
            &DecisionRecord {
                status: decision.outcome.resulting_status(),
                decided_at: now,
                decided_by: admin_id,
                admin_response: response_note.as_deref(),
                loan_id: created_loan,
            },
        )?;
        alerts.insert_alert(&alert)?;
        tx.commit()?;

        request.status = decision.outcome.resulting_status();
        request.decided_at = Some(now);
        request.decided_by = Some(admin_id);
        request.admin_response = response_note;
        if created_loan.is_some() {
            request.loan_id = created_loan;
        }
        Ok(request)
    }

    fn require_eligible(&self, patron_id: PatronId) -> WorkflowResult<()> {
        match self.directory.standing(patron_id) {
            Some(standing) if standing.may_submit() => Ok(()),
            _ => Err(WorkflowError::PatronNotEligible(patron_id)),
        }
    }
}

fn load_item(ledger: &impl InventoryLedger, item_id: ItemId) -> WorkflowResult<CatalogItem> {
    ledger
        .get_item(item_id)?
        .ok_or(WorkflowError::NotFound(Entity::Item, item_id))
}

fn log_outcome(
    event: &str,
    kind: &str,
    started_at: Instant,
    result: &WorkflowResult<CirculationRequest>,
) {
    match result {
        Ok(request) => info!(
            "event={} module=workflow status=ok kind={} request_id={} duration_ms={}",
            event,
            kind,
            request.request_id,
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event={} module=workflow status=error kind={} duration_ms={} error_code={} error={}",
            event,
            kind,
            started_at.elapsed().as_millis(),
            err.error_code(),
            err
        ),
    }
}
