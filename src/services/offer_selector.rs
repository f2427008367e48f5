//! Retention offer eligibility and cooldowns.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::models::{EngineSettings, Offer, TrialStatus, UserRecord};

/// Offer lifetime, cooldown and eligibility settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfferPolicy {
    pub lifetime: Duration,
    pub cooldown: Duration,
    pub discount_percent: u8,
    pub min_sessions: u32,
}

impl Default for OfferPolicy {
    fn default() -> Self {
        Self {
            lifetime: Duration::hours(48),
            cooldown: Duration::days(7),
            discount_percent: 30,
            min_sessions: 3,
        }
    }
}

impl From<&EngineSettings> for OfferPolicy {
    fn from(settings: &EngineSettings) -> Self {
        Self {
            lifetime: Duration::hours(i64::from(settings.offer_lifetime_hours)),
            cooldown: Duration::days(i64::from(settings.offer_cooldown_days)),
            discount_percent: settings.offer_discount_percent,
            min_sessions: settings.offer_min_sessions,
        }
    }
}

/// Why no offer was granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum OfferIneligibility {
    Converted,
    InsufficientSessions { recorded: u32, required: u32 },
    CoolingDown { until: DateTime<Utc> },
}

/// Result of an offer selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfferSelection {
    /// The user's still-active offer, unchanged
    Existing(Offer),
    /// A freshly created offer, now stored on the record
    Granted(Offer),
    Ineligible(OfferIneligibility),
}

impl OfferSelection {
    /// The offer to present, if any.
    pub fn offer(&self) -> Option<&Offer> {
        match self {
            Self::Existing(offer) | Self::Granted(offer) => Some(offer),
            Self::Ineligible(_) => None,
        }
    }

    pub fn into_offer(self) -> Option<Offer> {
        match self {
            Self::Existing(offer) | Self::Granted(offer) => Some(offer),
            Self::Ineligible(_) => None,
        }
    }

    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// Decides offer eligibility and creates offers.
///
/// At most one active offer exists per user: an active offer is returned as is,
/// and a new one is only created once the previous cooldown has elapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfferSelector {
    policy: OfferPolicy,
}

impl OfferSelector {
    pub const fn new(policy: OfferPolicy) -> Self {
        Self { policy }
    }

    pub const fn policy(&self) -> &OfferPolicy {
        &self.policy
    }

    /// Return the user's active offer, grant a new one, or say why not.
    ///
    /// A granted offer is written onto `record`; the caller persists it.
    ///
    /// # Arguments
    /// * `record` - The user's state, updated in place when an offer is granted
    /// * `trial_status` - Trial status at `now`; converted users never get offers
    /// * `now` - Decision time
    ///
    /// # Example
    /// ```
    /// use chrono::Utc;
    /// use paygate::domain::models::{TrialStatus, UserRecord};
    /// use paygate::services::OfferSelector;
    ///
    /// let now = Utc::now();
    /// let mut record = UserRecord::new("u1", now);
    /// record.session_count = 3;
    ///
    /// let selection = OfferSelector::default().select(&mut record, TrialStatus::Active, now);
    /// assert!(selection.is_granted());
    /// assert!(record.current_offer.is_some());
    /// ```
    pub fn select(
        &self,
        record: &mut UserRecord,
        trial_status: TrialStatus,
        now: DateTime<Utc>,
    ) -> OfferSelection {
        if trial_status == TrialStatus::Converted {
            return OfferSelection::Ineligible(OfferIneligibility::Converted);
        }

        if let Some(existing) = record.current_offer.as_ref().filter(|o| o.is_active(now)) {
            return OfferSelection::Existing(existing.clone());
        }

        if record.session_count < self.policy.min_sessions {
            return OfferSelection::Ineligible(OfferIneligibility::InsufficientSessions {
                recorded: record.session_count,
                required: self.policy.min_sessions,
            });
        }

        // A stored offer still blocks even when the record's own cooldown
        // column was never written.
        let until = record
            .current_offer
            .as_ref()
            .filter(|offer| offer.is_cooling_down(now))
            .map(|offer| offer.cooldown_until)
            .into_iter()
            .chain(record.last_offer_cooldown_until.filter(|until| *until > now))
            .max();
        if let Some(until) = until {
            return OfferSelection::Ineligible(OfferIneligibility::CoolingDown { until });
        }

        let offer = Offer {
            discount_percent: self.policy.discount_percent,
            created_at: now,
            expires_at: now + self.policy.lifetime,
            cooldown_until: now + self.policy.cooldown,
        };
        debug!(
            user_id = %record.user_id,
            discount_percent = offer.discount_percent,
            expires_at = %offer.expires_at,
            "granting retention offer"
        );
        record.grant_offer(offer.clone());
        OfferSelection::Granted(offer)
    }
}
