use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A retention/discount offer granted to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub discount_percent: u8,
    pub created_at: DateTime<Utc>,
    /// `created_at` + offer lifetime
    pub expires_at: DateTime<Utc>,
    /// `created_at` + offer cooldown
    pub cooldown_until: DateTime<Utc>,
}

impl Offer {
    /// Whether the offer can still be redeemed at `now`.
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whether a new offer is still blocked at `now`.
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until > now
    }
}
