//! Session activity and engagement levels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete classification of a session's activity intensity.
///
/// Ordered so that `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for EngagementLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-scoped activity counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSession {
    pub user_id: String,
    pub session_id: String,
    pub session_start_time: DateTime<Utc>,
    /// Monotonic within a session
    pub action_count: u32,
    pub last_action_at: DateTime<Utc>,
}

impl UserSession {
    /// Open a session whose start is its first observed action.
    pub fn open(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            session_start_time: started_at,
            action_count: 0,
            last_action_at: started_at,
        }
    }

    /// Observed duration in whole seconds, never negative.
    pub fn duration_secs(&self) -> u64 {
        let secs = (self.last_action_at - self.session_start_time).num_seconds();
        u64::try_from(secs).unwrap_or(0)
    }

    /// Return a copy with one more action at `at`.
    ///
    /// Out-of-order timestamps still count as an action but never shrink the
    /// observed duration.
    #[must_use]
    pub fn with_action(&self, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.action_count = next.action_count.saturating_add(1);
        if at > next.last_action_at {
            next.last_action_at = at;
        }
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_level_ordering() {
        assert!(EngagementLevel::Low < EngagementLevel::Medium);
        assert!(EngagementLevel::Medium < EngagementLevel::High);
    }

    #[test]
    fn test_with_action_extends_duration() {
        let start = Utc::now();
        let session = UserSession::open("u1", "s1", start)
            .with_action(start)
            .with_action(start + Duration::seconds(45));
        assert_eq!(session.action_count, 2);
        assert_eq!(session.duration_secs(), 45);
    }

    #[test]
    fn test_out_of_order_action_keeps_duration() {
        let start = Utc::now();
        let session = UserSession::open("u1", "s1", start)
            .with_action(start + Duration::seconds(60))
            .with_action(start + Duration::seconds(10));
        assert_eq!(session.action_count, 2);
        assert_eq!(session.duration_secs(), 60);
    }
}
