//! Circulation engine configuration.
//!
//! # Responsibility
//! - Hold loan period, sweep cadence, reminder dedup windows and inbox limits.
//! - Load overrides from JSON; every field falls back to its default.
//!
//! # Invariants
//! - A validated config has non-zero periods, windows and interval, and a
//!   UTC offset within +-18h.

use crate::clock::MS_PER_HOUR;
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_LOAN_PERIOD_DAYS: u32 = 14;
pub const DEFAULT_ALERT_LIST_LIMIT: u32 = 50;
pub const ALERT_LIST_LIMIT_MAX: u32 = 100;

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Tunables for the circulation engine and its notification sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CirculationConfig {
    /// Days between borrow approval and due date.
    pub loan_period_days: u32,
    /// Seconds between scheduled sweeps.
    pub sweep_interval_secs: u64,
    /// Seconds between scheduler start and its first sweep.
    pub startup_delay_secs: u64,
    /// Dedup window for the three-day reminder tier.
    pub three_day_dedup_hours: u32,
    /// Dedup window for the due-tomorrow reminder tier.
    pub tomorrow_dedup_hours: u32,
    /// Default page size for alert listings.
    pub alert_list_limit: u32,
    /// Offset used to decide calendar days ("today", "tomorrow").
    pub utc_offset_minutes: i32,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        Self {
            loan_period_days: DEFAULT_LOAN_PERIOD_DAYS,
            sweep_interval_secs: 60 * 60,
            startup_delay_secs: 5,
            three_day_dedup_hours: 24,
            tomorrow_dedup_hours: 12,
            alert_list_limit: DEFAULT_ALERT_LIST_LIMIT,
            utc_offset_minutes: 0,
        }
    }
}

impl CirculationConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.loan_period_days == 0 {
            return Err(ConfigError::Invalid(
                "loan_period_days must be positive".to_string(),
            ));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        if self.three_day_dedup_hours == 0 || self.tomorrow_dedup_hours == 0 {
            return Err(ConfigError::Invalid(
                "reminder dedup windows must be positive".to_string(),
            ));
        }
        if self.alert_list_limit == 0 || self.alert_list_limit > ALERT_LIST_LIMIT_MAX {
            return Err(ConfigError::Invalid(format!(
                "alert_list_limit must be within 1..={ALERT_LIST_LIMIT_MAX}"
            )));
        }
        if FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60)).is_none() {
            return Err(ConfigError::Invalid(format!(
                "utc_offset_minutes `{}` is out of range",
                self.utc_offset_minutes
            )));
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    /// Calendar offset; falls back to UTC for an unvalidated out-of-range value.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn three_day_window_ms(&self) -> i64 {
        i64::from(self.three_day_dedup_hours) * MS_PER_HOUR
    }

    pub fn tomorrow_window_ms(&self) -> i64 {
        i64::from(self.tomorrow_dedup_hours) * MS_PER_HOUR
    }

    /// Applies the default when `limit` is absent or zero and clamps to max.
    pub fn normalize_alert_limit(&self, limit: Option<u32>) -> u32 {
        match limit {
            Some(0) | None => self.alert_list_limit,
            Some(value) if value > ALERT_LIST_LIMIT_MAX => ALERT_LIST_LIMIT_MAX,
            Some(value) => value,
        }
    }
}
