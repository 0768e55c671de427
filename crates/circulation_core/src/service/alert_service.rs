//! Per-user alert inbox use-cases.

use crate::clock::Clock;
use crate::model::alert::{Alert, AlertId};
use crate::model::patron::PatronId;
use crate::repo::alert_repo::{AlertInsert, AlertRepository};
use crate::repo::RepoResult;
use crate::service::messages;
use log::info;

/// Inbox operations over an alert repository.
pub struct AlertService<'a, R: AlertRepository> {
    repo: R,
    clock: &'a dyn Clock,
    default_limit: u32,
}

impl<'a, R: AlertRepository> AlertService<'a, R> {
    /// `default_limit` applies to `list_alerts` calls without a limit; it is
    /// expected to be normalized by the caller's config already.
    pub fn new(repo: R, clock: &'a dyn Clock, default_limit: u32) -> Self {
        Self {
            repo,
            clock,
            default_limit,
        }
    }

    /// Newest-first alerts of `user_id`, at most `limit` (or the default).
    pub fn list_alerts(&self, user_id: PatronId, limit: Option<u32>) -> RepoResult<Vec<Alert>> {
        let limit = match limit {
            Some(value) if value > 0 => value,
            _ => self.default_limit,
        };
        self.repo.list_alerts(user_id, limit)
    }

    /// Fails with `NotFound` when the alert is missing or owned by someone else.
    pub fn mark_read(&self, user_id: PatronId, alert_id: AlertId) -> RepoResult<()> {
        self.repo.mark_read(alert_id, user_id)
    }

    pub fn mark_all_read(&self, user_id: PatronId) -> RepoResult<usize> {
        let changed = self.repo.mark_all_read(user_id)?;
        info!(
            "event=alerts_mark_all_read module=alerts status=ok recipient_id={} changed={}",
            user_id, changed
        );
        Ok(changed)
    }

    pub fn unread_count(&self, user_id: PatronId) -> RepoResult<u32> {
        self.repo.unread_count(user_id)
    }

    /// Sends the account-approved greeting once per user.
    pub fn send_welcome(&self, user_id: PatronId) -> RepoResult<AlertInsert> {
        let alert = messages::welcome(user_id, self.clock.now_ms())
            .with_dedup_key(format!("welcome:{user_id}"));
        let outcome = self.repo.insert_alert(&alert)?;
        info!(
            "event=alert_welcome module=alerts status=ok recipient_id={} deduplicated={}",
            user_id,
            outcome == AlertInsert::Deduplicated
        );
        Ok(outcome)
    }
}
