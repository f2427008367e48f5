//! Persisted per-user state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::offer::Offer;
use super::trial::TrialState;

/// Everything the engine persists about one user.
///
/// `version` is the optimistic concurrency token: a write succeeds only if the
/// stored version still equals the version the record was loaded at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub trial: TrialState,
    /// Most recently granted offer, expired or not
    pub current_offer: Option<Offer>,
    pub last_offer_at: Option<DateTime<Utc>>,
    pub last_offer_cooldown_until: Option<DateTime<Utc>>,
    pub last_paywall_shown_at: Option<DateTime<Utc>>,
    pub export_count: u32,
    pub save_count: u32,
    pub session_count: u32,
    pub last_session_id: Option<String>,
    /// 0 for a record that has never been written
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

impl UserRecord {
    /// A fresh record for a user the engine has never seen.
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            trial: TrialState::default(),
            current_offer: None,
            last_offer_at: None,
            last_offer_cooldown_until: None,
            last_paywall_shown_at: None,
            export_count: 0,
            save_count: 0,
            session_count: 0,
            last_session_id: None,
            version: 0,
            updated_at: now,
        }
    }

    pub const fn is_new(&self) -> bool {
        self.version == 0
    }

    /// Count `session_id` as a session if it differs from the last one seen.
    ///
    /// Returns the previous session id when the user moved to a new session.
    pub fn observe_session(&mut self, session_id: &str) -> Option<String> {
        if self.last_session_id.as_deref() == Some(session_id) {
            return None;
        }
        self.session_count = self.session_count.saturating_add(1);
        self.last_session_id.replace(session_id.to_string())
    }

    /// Store `offer` as the user's current offer.
    pub fn grant_offer(&mut self, offer: Offer) {
        self.last_offer_at = Some(offer.created_at);
        self.last_offer_cooldown_until = Some(offer.cooldown_until);
        self.current_offer = Some(offer);
    }
}
