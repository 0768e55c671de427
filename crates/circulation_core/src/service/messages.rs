//! Alert wording and free-text normalization.
//!
//! Kept apart from the services so wording changes never touch transaction
//! code.

use crate::clock::format_local_date;
use crate::model::alert::{Alert, AlertKind};
use crate::model::catalog::CatalogItem;
use crate::model::loan::LoanRecord;
use crate::model::patron::PatronId;
use crate::model::request::{CirculationRequest, RequestKind};
use chrono::FixedOffset;
use once_cell::sync::Lazy;
use regex::Regex;

const NOTE_MAX_CHARS: usize = 500;

static CONTROL_CHARS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Cc}&&[^\n\t]]+").expect("valid control char regex"));
static WHITESPACE_RUN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t]+").expect("valid whitespace regex"));
static BLANK_LINES_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid blank line regex"));

/// Normalizes patron notes and admin responses.
///
/// Rules:
/// - control characters other than newline/tab are dropped;
/// - runs of spaces/tabs collapse to one space, 3+ newlines collapse to 2;
/// - result is trimmed and capped at 500 chars; blank input becomes `None`.
pub fn normalize_note(note: Option<&str>) -> Option<String> {
    let raw = note?;
    let without_controls = CONTROL_CHARS_RE.replace_all(raw, "");
    let collapsed = WHITESPACE_RUN_RE.replace_all(&without_controls, " ");
    let tidy = BLANK_LINES_RE.replace_all(&collapsed, "\n\n");
    let trimmed = tidy.trim();
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.chars().take(NOTE_MAX_CHARS).collect())
}

pub(crate) fn borrow_approved(
    request: &CirculationRequest,
    item: &CatalogItem,
    loan: &LoanRecord,
    offset: FixedOffset,
    now: i64,
) -> Alert {
    Alert::new(
        request.patron_id,
        AlertKind::Decision,
        "Borrow Request Approved",
        format!(
            "Your request to borrow \"{}\" has been approved. Due date: {}.",
            item.title,
            format_local_date(loan.due_at, offset)
        ),
        now,
    )
    .with_item(item.item_id)
    .with_request(request.request_id)
    .with_loan(loan.loan_id)
}

pub(crate) fn return_approved(request: &CirculationRequest, item: &CatalogItem, now: i64) -> Alert {
    let alert = Alert::new(
        request.patron_id,
        AlertKind::Decision,
        "Return Request Approved",
        format!(
            "Your return of \"{}\" has been processed successfully.",
            item.title
        ),
        now,
    )
    .with_item(item.item_id)
    .with_request(request.request_id);
    match request.loan_id {
        Some(loan_id) => alert.with_loan(loan_id),
        None => alert,
    }
}

pub(crate) fn request_rejected(
    request: &CirculationRequest,
    item: &CatalogItem,
    note: Option<&str>,
    now: i64,
) -> Alert {
    let (title, kind) = match request.kind {
        RequestKind::Borrow => ("Borrow Request Rejected", RequestKind::Borrow.label()),
        RequestKind::Return => ("Return Request Rejected", RequestKind::Return.label()),
    };
    let mut message = format!(
        "Your {kind} request for \"{}\" has been rejected.",
        item.title
    );
    if let Some(note) = note {
        message.push(' ');
        message.push_str(note);
    }
    Alert::new(request.patron_id, AlertKind::Decision, title, message, now)
        .with_item(item.item_id)
        .with_request(request.request_id)
}

/// Reminder tier for loans approaching their due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderTier {
    ThreeDays,
    Tomorrow,
}

impl ReminderTier {
    /// Days between today and the due day.
    pub fn days_ahead(self) -> i64 {
        match self {
            Self::ThreeDays => 3,
            Self::Tomorrow => 1,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::ThreeDays => "3d",
            Self::Tomorrow => "1d",
        }
    }
}

pub(crate) fn due_soon(
    loan: &LoanRecord,
    item: &CatalogItem,
    tier: ReminderTier,
    offset: FixedOffset,
    now: i64,
) -> Alert {
    let due_date = format_local_date(loan.due_at, offset);
    let (title, message) = match tier {
        ReminderTier::ThreeDays => (
            "Item Due Soon",
            format!(
                "\"{}\" is due in 3 days ({due_date}). Please plan to return it on time.",
                item.title
            ),
        ),
        ReminderTier::Tomorrow => (
            "Item Due Tomorrow",
            format!(
                "\"{}\" is due tomorrow ({due_date}). Please return it on time.",
                item.title
            ),
        ),
    };
    Alert::new(loan.patron_id, AlertKind::DueSoon, title, message, now)
        .with_item(item.item_id)
        .with_loan(loan.loan_id)
}

pub(crate) fn overdue(loan: &LoanRecord, item: &CatalogItem, days_overdue: i64, now: i64) -> Alert {
    Alert::new(
        loan.patron_id,
        AlertKind::Overdue,
        "Item Overdue",
        format!(
            "\"{}\" is {days_overdue} day(s) overdue. Please return it as soon as possible.",
            item.title
        ),
        now,
    )
    .with_item(item.item_id)
    .with_loan(loan.loan_id)
}

pub(crate) fn welcome(recipient_id: PatronId, now: i64) -> Alert {
    Alert::new(
        recipient_id,
        AlertKind::Welcome,
        "Welcome to the Library!",
        "Your account has been approved. You can now browse and borrow items from the collection.",
        now,
    )
}

#[cfg(test)]
mod tests {
    use super::normalize_note;

    #[test]
    fn normalize_note_collapses_whitespace_and_drops_controls() {
        let note = normalize_note(Some("  pages \t\t torn\u{0007}\n\n\n\nplease   check "));
        assert_eq!(note.as_deref(), Some("pages torn\n\nplease check"));
    }

    #[test]
    fn normalize_note_maps_blank_to_none_and_caps_length() {
        assert_eq!(normalize_note(Some(" \t ")), None);
        assert_eq!(normalize_note(None), None);
        let long = "x".repeat(900);
        assert_eq!(normalize_note(Some(&long)).unwrap().chars().count(), 500);
    }
}
