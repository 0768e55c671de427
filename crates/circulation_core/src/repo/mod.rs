//! Repository layer abstractions and SQLite implementations.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for catalog counters,
//!   loans, requests and alerts.
//! - Isolate SQLite query details from workflow orchestration.
//!
//! # Invariants
//! - Repositories never open transactions themselves; callers hand them a
//!   connection or an open `Transaction` so multi-table effects commit as one
//!   unit.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Status transitions are conditional updates guarded by the expected
//!   prior status; a zero-row update surfaces as `StateConflict`.

pub mod alert_repo;
pub mod catalog_repo;
pub mod loan_repo;
pub mod request_repo;
pub mod stats_repo;

use crate::db::DbError;
use crate::model::catalog::ItemId;
use crate::model::ModelValidationError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Record family named in repository errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Item,
    Loan,
    Request,
    Alert,
}

impl Entity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Item => "item",
            Self::Loan => "loan",
            Self::Request => "request",
            Self::Alert => "alert",
        }
    }
}

/// Repository error shared by all circulation tables.
#[derive(Debug)]
pub enum RepoError {
    Validation(ModelValidationError),
    Db(DbError),
    NotFound(Entity, Uuid),
    /// Row exists but was not in the status the conditional update expected.
    StateConflict(Entity, Uuid),
    /// Insert collided with a uniqueness rule (e.g. one pending request).
    Conflict(&'static str),
    /// Ledger reservation found no copy on the shelf.
    NoCopiesAvailable(ItemId),
    /// Ledger release would push available copies above total.
    LedgerOverflow(ItemId),
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(entity, id) => write!(f, "{} not found: {id}", entity.as_str()),
            Self::StateConflict(entity, id) => {
                write!(f, "{} {id} is not in the expected state", entity.as_str())
            }
            Self::Conflict(rule) => write!(f, "uniqueness rule violated: {rule}"),
            Self::NoCopiesAvailable(id) => write!(f, "no copies available for item {id}"),
            Self::LedgerOverflow(id) => {
                write!(f, "release would exceed total copies for item {id}")
            }
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_optional_uuid(value: Option<String>, column: &str) -> RepoResult<Option<Uuid>> {
    value.map(|text| parse_uuid(&text, column)).transpose()
}

pub(crate) fn parse_count(value: i64, column: &str) -> RepoResult<u32> {
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid count `{value}` in {column}")))
}

pub(crate) fn parse_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid boolean value `{other}` in {column}"
        ))),
    }
}

pub(crate) fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _)
            if inner.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}
