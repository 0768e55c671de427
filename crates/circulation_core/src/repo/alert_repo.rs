//! Alert inbox repository.
//!
//! # Responsibility
//! - Persist per-user alerts and their read flags.
//! - Enforce idempotent inserts for alerts carrying a `dedup_key`.
//!
//! # Invariants
//! - Alerts are never deleted here.
//! - `insert_alert` with an already-used `dedup_key` is a no-op that reports
//!   `AlertInsert::Deduplicated`; the check and the insert are one statement.

use crate::model::alert::{Alert, AlertId, AlertKind};
use crate::model::patron::PatronId;
use crate::repo::{
    bool_to_int, parse_bool, parse_count, parse_optional_uuid, parse_uuid, Entity, RepoError,
    RepoResult,
};
use rusqlite::{params, Connection, Row};

const ALERT_SELECT_SQL: &str = "SELECT
    alert_id,
    recipient_id,
    kind,
    title,
    message,
    item_id,
    request_id,
    loan_id,
    is_read,
    created_at,
    dedup_key
FROM alerts";

/// Outcome of an alert insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertInsert {
    Created(AlertId),
    /// Another alert already owns the same dedup key.
    Deduplicated,
}

/// Repository interface for alert inbox operations.
pub trait AlertRepository {
    fn insert_alert(&self, alert: &Alert) -> RepoResult<AlertInsert>;
    /// Alerts of one recipient, newest first.
    fn list_alerts(&self, recipient_id: PatronId, limit: u32) -> RepoResult<Vec<Alert>>;
    /// Fails with `NotFound` when the alert does not belong to `recipient_id`.
    fn mark_read(&self, alert_id: AlertId, recipient_id: PatronId) -> RepoResult<()>;
    /// Returns the number of alerts flipped to read.
    fn mark_all_read(&self, recipient_id: PatronId) -> RepoResult<usize>;
    fn unread_count(&self, recipient_id: PatronId) -> RepoResult<u32>;
}

/// SQLite-backed alert repository.
pub struct SqliteAlertRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAlertRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl AlertRepository for SqliteAlertRepository<'_> {
    fn insert_alert(&self, alert: &Alert) -> RepoResult<AlertInsert> {
        let changed = self.conn.execute(
            "INSERT INTO alerts (
                alert_id,
                recipient_id,
                kind,
                title,
                message,
                item_id,
                request_id,
                loan_id,
                is_read,
                created_at,
                dedup_key
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (dedup_key) DO NOTHING;",
            params![
                alert.alert_id.to_string(),
                alert.recipient_id.to_string(),
                alert_kind_to_db(alert.kind),
                alert.title.as_str(),
                alert.message.as_str(),
                alert.item_id.map(|id| id.to_string()),
                alert.request_id.map(|id| id.to_string()),
                alert.loan_id.map(|id| id.to_string()),
                bool_to_int(alert.is_read),
                alert.created_at,
                alert.dedup_key.as_deref(),
            ],
        )?;

        if changed == 0 {
            return Ok(AlertInsert::Deduplicated);
        }
        Ok(AlertInsert::Created(alert.alert_id))
    }

    fn list_alerts(&self, recipient_id: PatronId, limit: u32) -> RepoResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ALERT_SELECT_SQL}
             WHERE recipient_id = ?1
             ORDER BY created_at DESC, alert_id ASC
             LIMIT ?2;"
        ))?;
        let mut rows = stmt.query(params![recipient_id.to_string(), i64::from(limit)])?;
        let mut alerts = Vec::new();
        while let Some(row) = rows.next()? {
            alerts.push(parse_alert_row(row)?);
        }
        Ok(alerts)
    }

    fn mark_read(&self, alert_id: AlertId, recipient_id: PatronId) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE alerts
             SET is_read = 1
             WHERE alert_id = ?1
               AND recipient_id = ?2;",
            params![alert_id.to_string(), recipient_id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(Entity::Alert, alert_id));
        }
        Ok(())
    }

    fn mark_all_read(&self, recipient_id: PatronId) -> RepoResult<usize> {
        let changed = self.conn.execute(
            "UPDATE alerts
             SET is_read = 1
             WHERE recipient_id = ?1
               AND is_read = 0;",
            [recipient_id.to_string()],
        )?;
        Ok(changed)
    }

    fn unread_count(&self, recipient_id: PatronId) -> RepoResult<u32> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*)
             FROM alerts
             WHERE recipient_id = ?1
               AND is_read = 0;",
            [recipient_id.to_string()],
            |row| row.get(0),
        )?;
        parse_count(count, "alerts.count")
    }
}

fn parse_alert_row(row: &Row<'_>) -> RepoResult<Alert> {
    let alert_text: String = row.get("alert_id")?;
    let recipient_text: String = row.get("recipient_id")?;
    let kind_text: String = row.get("kind")?;
    let kind = parse_alert_kind(&kind_text).ok_or_else(|| {
        RepoError::InvalidData(format!("invalid alert kind `{kind_text}` in alerts.kind"))
    })?;

    Ok(Alert {
        alert_id: parse_uuid(&alert_text, "alerts.alert_id")?,
        recipient_id: parse_uuid(&recipient_text, "alerts.recipient_id")?,
        kind,
        title: row.get("title")?,
        message: row.get("message")?,
        item_id: parse_optional_uuid(row.get("item_id")?, "alerts.item_id")?,
        request_id: parse_optional_uuid(row.get("request_id")?, "alerts.request_id")?,
        loan_id: parse_optional_uuid(row.get("loan_id")?, "alerts.loan_id")?,
        is_read: parse_bool(row.get("is_read")?, "alerts.is_read")?,
        created_at: row.get("created_at")?,
        dedup_key: row.get("dedup_key")?,
    })
}

fn alert_kind_to_db(kind: AlertKind) -> &'static str {
    match kind {
        AlertKind::DueSoon => "due_soon",
        AlertKind::Overdue => "overdue",
        AlertKind::Decision => "decision",
        AlertKind::Welcome => "welcome",
    }
}

fn parse_alert_kind(value: &str) -> Option<AlertKind> {
    match value {
        "due_soon" => Some(AlertKind::DueSoon),
        "overdue" => Some(AlertKind::Overdue),
        "decision" => Some(AlertKind::Decision),
        "welcome" => Some(AlertKind::Welcome),
        _ => None,
    }
}
