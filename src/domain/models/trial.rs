//! Trial lifecycle domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::{DomainError, DomainResult};

/// Longest trial the engine will start or accept from storage.
pub const MAX_TRIAL_DURATION_DAYS: u32 = 3650;

/// Accept a trial length in `1..=MAX_TRIAL_DURATION_DAYS`.
pub fn check_trial_duration(duration_days: u32) -> DomainResult<u32> {
    if (1..=MAX_TRIAL_DURATION_DAYS).contains(&duration_days) {
        Ok(duration_days)
    } else {
        Err(DomainError::ValidationFailed(format!(
            "trial duration must be between 1 and {MAX_TRIAL_DURATION_DAYS} days, got {duration_days}"
        )))
    }
}

/// Trial lifecycle status.
///
/// `Expired` is never stored; it is derived from elapsed time on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    NotStarted,
    Active,
    Expired,
    Converted,
}

impl TrialStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Converted => "converted",
        }
    }

    /// Converted is terminal; nothing moves a user out of it.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Converted)
    }
}

impl fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrialStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "converted" => Ok(Self::Converted),
            other => Err(DomainError::SerializationError(format!(
                "Unknown trial status: {other}"
            ))),
        }
    }
}

/// Persisted trial state for one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialState {
    /// When the trial was started, if ever
    pub start_date: Option<DateTime<Utc>>,
    /// Trial length, fixed when the trial starts
    pub duration_days: u32,
    /// Stored status; never `Expired`
    pub status: TrialStatus,
    /// When a verified purchase was reported
    pub converted_at: Option<DateTime<Utc>>,
}

impl Default for TrialState {
    fn default() -> Self {
        Self {
            start_date: None,
            duration_days: 0,
            status: TrialStatus::NotStarted,
            converted_at: None,
        }
    }
}

impl TrialState {
    /// Instant at which an active trial expires.
    ///
    /// `None` if the trial never started, or if the end lies beyond the
    /// representable calendar (such a trial never expires).
    pub fn ends_at(&self) -> Option<DateTime<Utc>> {
        let length = Duration::try_days(i64::from(self.duration_days))?;
        self.start_date?.checked_add_signed(length)
    }

    /// Effective status at `now`, deriving expiry lazily.
    pub fn status_at(&self, now: DateTime<Utc>) -> TrialStatus {
        match self.status {
            TrialStatus::Converted => TrialStatus::Converted,
            TrialStatus::NotStarted => TrialStatus::NotStarted,
            TrialStatus::Active | TrialStatus::Expired => match (self.start_date, self.ends_at()) {
                (None, _) => TrialStatus::NotStarted,
                (Some(_), Some(end)) if now >= end => TrialStatus::Expired,
                (Some(_), _) => TrialStatus::Active,
            },
        }
    }
}
