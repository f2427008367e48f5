//! Trial lifecycle tracking.
//!
//! Expiry is computed lazily from the trial's start date on every read; no
//! timer ever mutates a stored trial.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::domain::errors::DomainResult;
use crate::domain::models::{check_trial_duration, TrialState, TrialStatus};

/// Owns trial start, expiry and conversion transitions.
#[derive(Debug, Clone, Copy)]
pub struct TrialStateTracker {
    default_duration_days: u32,
}

impl TrialStateTracker {
    pub const fn new(default_duration_days: u32) -> Self {
        Self {
            default_duration_days,
        }
    }

    pub const fn default_duration_days(&self) -> u32 {
        self.default_duration_days
    }

    /// Start a trial with the configured duration.
    ///
    /// Returns `true` if the trial moved NotStarted -> Active.
    pub fn start(&self, trial: &mut TrialState, now: DateTime<Utc>) -> DomainResult<bool> {
        self.start_with_duration(trial, self.default_duration_days, now)
    }

    /// Start a trial once; any later call is a no-op.
    ///
    /// Fails with `ValidationFailed` if `duration_days` is outside
    /// `1..=MAX_TRIAL_DURATION_DAYS`, leaving `trial` untouched.
    pub fn start_with_duration(
        &self,
        trial: &mut TrialState,
        duration_days: u32,
        now: DateTime<Utc>,
    ) -> DomainResult<bool> {
        let duration_days = check_trial_duration(duration_days)?;
        if trial.status != TrialStatus::NotStarted {
            debug!(status = %trial.status, "trial already started, ignoring start");
            return Ok(false);
        }
        trial.start_date = Some(now);
        trial.duration_days = duration_days;
        trial.status = TrialStatus::Active;
        Ok(true)
    }

    /// Effective status at `now`.
    pub fn status(&self, trial: &TrialState, now: DateTime<Utc>) -> TrialStatus {
        trial.status_at(now)
    }

    /// Record a verified purchase. Terminal and idempotent.
    ///
    /// Returns `true` if the trial was not already converted.
    pub fn mark_converted(&self, trial: &mut TrialState, now: DateTime<Utc>) -> bool {
        if trial.status.is_terminal() {
            return false;
        }
        trial.status = TrialStatus::Converted;
        trial.converted_at = Some(now);
        true
    }

    /// `max(0, ceil((start + duration - now) / 1 day))`; 0 before the trial starts.
    pub fn days_remaining(&self, trial: &TrialState, now: DateTime<Utc>) -> u32 {
        let Some(end) = trial.ends_at() else {
            // Started but ending past the calendar's range.
            return if trial.start_date.is_some() { trial.duration_days } else { 0 };
        };
        let remaining = end - now;
        if remaining <= Duration::zero() {
            return 0;
        }
        let day_ms = Duration::days(1).num_milliseconds();
        let days = (remaining.num_milliseconds() + day_ms - 1) / day_ms;
        u32::try_from(days).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_start_is_idempotent() {
        let tracker = TrialStateTracker::new(7);
        let mut trial = TrialState::default();

        assert!(tracker.start(&mut trial, day0()).unwrap());
        assert!(!tracker
            .start_with_duration(&mut trial, 30, day0() + Duration::days(2))
            .unwrap());

        assert_eq!(trial.start_date, Some(day0()));
        assert_eq!(trial.duration_days, 7);
    }

    #[test]
    fn test_trial_boundary() {
        let tracker = TrialStateTracker::new(7);
        let mut trial = TrialState::default();
        tracker.start(&mut trial, day0()).unwrap();

        // day 6 at 23:00 is still before the day-7 boundary at 09:00
        for day in 0..7 {
            let now = day0() + Duration::days(day) + Duration::hours(23);
            assert_eq!(tracker.status(&trial, now), TrialStatus::Active, "day {day}");
        }

        let boundary = day0() + Duration::days(7);
        assert_eq!(
            tracker.status(&trial, boundary - Duration::seconds(1)),
            TrialStatus::Active
        );
        assert_eq!(tracker.status(&trial, boundary), TrialStatus::Expired);
        assert_eq!(
            tracker.status(&trial, boundary + Duration::days(30)),
            TrialStatus::Expired
        );
    }

    #[test]
    fn test_converted_is_terminal() {
        let tracker = TrialStateTracker::new(7);
        let mut trial = TrialState::default();
        tracker.start(&mut trial, day0()).unwrap();

        assert!(tracker.mark_converted(&mut trial, day0() + Duration::days(3)));
        assert!(!tracker.mark_converted(&mut trial, day0() + Duration::days(4)));
        assert!(!tracker.start(&mut trial, day0() + Duration::days(5)).unwrap());

        assert_eq!(
            tracker.status(&trial, day0() + Duration::days(90)),
            TrialStatus::Converted
        );
    }

    #[test]
    fn test_conversion_without_trial() {
        let tracker = TrialStateTracker::new(7);
        let mut trial = TrialState::default();

        assert!(tracker.mark_converted(&mut trial, day0()));
        assert_eq!(tracker.status(&trial, day0()), TrialStatus::Converted);
    }

    #[test]
    fn test_days_remaining_rounds_up() {
        let tracker = TrialStateTracker::new(7);
        let mut trial = TrialState::default();
        assert_eq!(tracker.days_remaining(&trial, day0()), 0);

        tracker.start(&mut trial, day0()).unwrap();
        assert_eq!(tracker.days_remaining(&trial, day0()), 7);
        assert_eq!(tracker.days_remaining(&trial, day0() + Duration::hours(1)), 7);
        assert_eq!(tracker.days_remaining(&trial, day0() + Duration::days(1)), 6);
        assert_eq!(
            tracker.days_remaining(&trial, day0() + Duration::days(7) - Duration::minutes(1)),
            1
        );
        assert_eq!(tracker.days_remaining(&trial, day0() + Duration::days(7)), 0);
        assert_eq!(tracker.days_remaining(&trial, day0() + Duration::days(10)), 0);
    }

    #[test]
    fn test_out_of_range_duration_is_rejected() {
        let tracker = TrialStateTracker::new(7);
        let mut trial = TrialState::default();

        assert!(tracker.start_with_duration(&mut trial, u32::MAX, day0()).is_err());
        assert!(tracker.start_with_duration(&mut trial, 0, day0()).is_err());
        assert_eq!(trial, TrialState::default());
    }

    #[test]
    fn test_days_remaining_with_unrepresentable_end() {
        let tracker = TrialStateTracker::new(7);
        let trial = TrialState {
            start_date: Some(day0()),
            duration_days: u32::MAX,
            status: TrialStatus::Active,
            converted_at: None,
        };
        assert_eq!(tracker.days_remaining(&trial, day0()), u32::MAX);
        assert_eq!(tracker.status(&trial, day0()), TrialStatus::Active);
    }
}
