//! Session engagement scoring.
//!
//! Sessions live only in process memory and are discarded when they end or
//! go idle. Classification is a pure function of a session's counters.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::domain::models::{EngagementLevel, EngineSettings, UserSession};

/// Duration/action thresholds for each engagement level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngagementThresholds {
    pub high_duration_secs: u64,
    pub high_actions: u32,
    pub medium_duration_secs: u64,
    pub medium_actions: u32,
}

impl Default for EngagementThresholds {
    fn default() -> Self {
        Self {
            high_duration_secs: 300,
            high_actions: 10,
            medium_duration_secs: 120,
            medium_actions: 5,
        }
    }
}

impl From<&EngineSettings> for EngagementThresholds {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            high_duration_secs: settings.engagement_high_duration_sec,
            high_actions: settings.engagement_high_actions,
            medium_duration_secs: settings.engagement_medium_duration_sec,
            medium_actions: settings.engagement_medium_actions,
        }
    }
}

impl EngagementThresholds {
    /// Classify raw counters.
    pub const fn classify(&self, duration_secs: u64, actions: u32) -> EngagementLevel {
        if duration_secs >= self.high_duration_secs && actions >= self.high_actions {
            EngagementLevel::High
        } else if duration_secs >= self.medium_duration_secs && actions >= self.medium_actions {
            EngagementLevel::Medium
        } else {
            EngagementLevel::Low
        }
    }
}

/// Table size past which writes sweep out idle sessions.
const SWEEP_THRESHOLD: usize = 1024;

const DEFAULT_IDLE_TIMEOUT: StdDuration = StdDuration::from_secs(1800);

/// Converts session activity into engagement levels.
///
/// The session table uses a synchronous lock so that `commit` has no await
/// point and cannot be interrupted half way by task cancellation.
#[derive(Debug)]
pub struct EngagementScorer {
    thresholds: EngagementThresholds,
    idle_timeout: StdDuration,
    sessions: RwLock<HashMap<String, UserSession>>,
}

impl Default for EngagementScorer {
    fn default() -> Self {
        Self::new(EngagementThresholds::default())
    }
}

impl EngagementScorer {
    pub fn new(thresholds: EngagementThresholds) -> Self {
        Self {
            thresholds,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Scorer configured from engine settings.
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self::new(EngagementThresholds::from(settings))
            .with_idle_timeout(StdDuration::from_secs(settings.session_idle_timeout_secs))
    }

    #[must_use]
    pub const fn with_idle_timeout(mut self, idle_timeout: StdDuration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub const fn thresholds(&self) -> &EngagementThresholds {
        &self.thresholds
    }

    pub const fn idle_timeout(&self) -> StdDuration {
        self.idle_timeout
    }

    /// Whether `session` has seen no action for the idle timeout as of `now`.
    pub fn is_idle(&self, session: &UserSession, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(session.last_action_at)
            .to_std()
            .is_ok_and(|idle| idle >= self.idle_timeout)
    }

    /// Classify a session snapshot.
    pub fn classify(&self, session: &UserSession) -> EngagementLevel {
        self.thresholds
            .classify(session.duration_secs(), session.action_count)
    }

    /// The session as it would look after one more action, without storing it.
    ///
    /// An unknown session is opened at `at`.
    pub fn preview(&self, user_id: &str, session_id: &str, at: DateTime<Utc>) -> UserSession {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| UserSession::open(user_id, session_id, at))
            .with_action(at)
    }

    /// Store a session snapshot produced by `preview`.
    ///
    /// Once the table grows past a fixed size, sessions idle as of the
    /// snapshot's last action are dropped first.
    pub fn commit(&self, session: UserSession) {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.len() >= SWEEP_THRESHOLD {
            self.sweep(&mut sessions, session.last_action_at);
        }
        sessions.insert(session.session_id.clone(), session);
    }

    /// Count one action for the session and return its updated counters.
    pub fn record(&self, user_id: &str, session_id: &str, at: DateTime<Utc>) -> UserSession {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.len() >= SWEEP_THRESHOLD {
            self.sweep(&mut sessions, at);
        }
        let next = sessions
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| UserSession::open(user_id, session_id, at))
            .with_action(at);
        sessions.insert(session_id.to_string(), next.clone());
        next
    }

    /// Current level of a session; `Low` for an unknown session.
    pub fn level(&self, session_id: &str) -> EngagementLevel {
        self.session(session_id)
            .map_or(EngagementLevel::Low, |session| self.classify(&session))
    }

    pub fn session(&self, session_id: &str) -> Option<UserSession> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).cloned()
    }

    /// Discard a session's counters.
    pub fn end(&self, session_id: &str) -> Option<UserSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id)
    }

    pub fn active_sessions(&self) -> usize {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.len()
    }

    /// Drop every session idle as of `now`. Returns how many were dropped.
    pub fn expire_idle(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        self.sweep(&mut sessions, now)
    }

    fn sweep(&self, sessions: &mut HashMap<String, UserSession>, now: DateTime<Utc>) -> usize {
        let before = sessions.len();
        sessions.retain(|_, session| !self.is_idle(session, now));
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, remaining = sessions.len(), "expired idle sessions");
        }
        expired
    }
}
