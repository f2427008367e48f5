//! Decision inputs, outputs and the audit records emitted for them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::engagement::EngagementLevel;
use super::offer::Offer;
use super::trial::TrialStatus;

/// Kind of user action that may trigger a paywall.
///
/// Serialized as its camelCase name. Strings outside the known set are kept
/// as `Unrecognized` so the raw value survives into logs and audit records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ActionType {
    Export,
    AdvancedFeature,
    Save,
    Share,
    Other,
    Unrecognized(String),
}

impl ActionType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Export => "export",
            Self::AdvancedFeature => "advancedFeature",
            Self::Save => "save",
            Self::Share => "share",
            Self::Other => "other",
            Self::Unrecognized(raw) => raw,
        }
    }

    pub const fn is_recognized(&self) -> bool {
        !matches!(self, Self::Unrecognized(_))
    }
}

impl From<&str> for ActionType {
    fn from(value: &str) -> Self {
        match value {
            "export" => Self::Export,
            "advancedFeature" | "advanced_feature" => Self::AdvancedFeature,
            "save" => Self::Save,
            "share" => Self::Share,
            "other" => Self::Other,
            raw => Self::Unrecognized(raw.to_string()),
        }
    }
}

impl From<String> for ActionType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<ActionType> for String {
    fn from(value: ActionType) -> Self {
        match value {
            ActionType::Unrecognized(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound user action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActionEvent {
    pub user_id: String,
    pub session_id: String,
    pub action_type: ActionType,
    pub timestamp: DateTime<Utc>,
}

impl UserActionEvent {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        action_type: impl Into<ActionType>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            action_type: action_type.into(),
            timestamp,
        }
    }
}

/// Why the engine reached its decision; rendered as the decision context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    /// All gates passed and the paywall is shown
    Shown,
    /// Paying users never see a paywall
    Converted,
    /// The action's intent threshold was not reached
    BelowIntentThreshold,
    /// A paywall was shown too recently
    RateLimited,
    /// The action type never triggers a paywall
    NoTriggerForAction,
    /// The action type is not part of the known set
    UnrecognizedAction,
    /// First event ever seen for this user
    NewUser,
    /// The user's record could not be read
    StateCorrupted,
    /// The user's record could not be loaded or written in time
    StateUnavailable,
    /// Optimistic write retries were exhausted
    ConflictRetriesExhausted,
}

impl DecisionReason {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Shown => "shown",
            Self::Converted => "converted",
            Self::BelowIntentThreshold => "below_intent_threshold",
            Self::RateLimited => "rate_limited",
            Self::NoTriggerForAction => "no_trigger_for_action",
            Self::UnrecognizedAction => "unrecognized_action",
            Self::NewUser => "new_user",
            Self::StateCorrupted => "state_corrupted",
            Self::StateUnavailable => "state_unavailable",
            Self::ConflictRetriesExhausted => "conflict_retries_exhausted",
        }
    }

    /// Whether the decision was reached without committing any state.
    pub const fn is_fail_open(&self) -> bool {
        matches!(
            self,
            Self::UnrecognizedAction
                | Self::StateCorrupted
                | Self::StateUnavailable
                | Self::ConflictRetriesExhausted
        )
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Auditable record of one decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRecord {
    pub event_id: Uuid,
    pub user_id: String,
    pub session_id: String,
    pub action_type: ActionType,
    pub show: bool,
    pub variant: Option<String>,
    pub offer: Option<Offer>,
    pub reason: DecisionReason,
    pub engagement_level: EngagementLevel,
    pub trial_status: TrialStatus,
    pub timestamp: DateTime<Utc>,
}

impl DecisionRecord {
    /// A conservative no-show record for `event`.
    pub fn no_show(event: &UserActionEvent, reason: DecisionReason) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id: event.user_id.clone(),
            session_id: event.session_id.clone(),
            action_type: event.action_type.clone(),
            show: false,
            variant: None,
            offer: None,
            reason,
            engagement_level: EngagementLevel::Low,
            trial_status: TrialStatus::NotStarted,
            timestamp: event.timestamp,
        }
    }
}

/// The engine's single output per action event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaywallDecision {
    pub show: bool,
    pub variant: Option<String>,
    pub offer: Option<Offer>,
    pub context: String,
    pub event_id: Uuid,
}

impl From<&DecisionRecord> for PaywallDecision {
    fn from(record: &DecisionRecord) -> Self {
        Self {
            show: record.show,
            variant: record.variant.clone(),
            offer: record.offer.clone(),
            context: record.reason.as_str().to_string(),
            event_id: record.event_id,
        }
    }
}

/// What the user did after a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Dismissed,
    Purchased,
    OfferAccepted,
}

impl DecisionOutcome {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Dismissed => "dismissed",
            Self::Purchased => "purchased",
            Self::OfferAccepted => "offer_accepted",
        }
    }
}

impl fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DecisionOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dismissed" => Ok(Self::Dismissed),
            "purchased" => Ok(Self::Purchased),
            "offer_accepted" => Ok(Self::OfferAccepted),
            other => Err(format!(
                "unknown outcome '{other}' (expected dismissed, purchased or offer_accepted)"
            )),
        }
    }
}

/// Later outcome of a decision, addressed by the decision's event id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeRecord {
    pub event_id: Uuid,
    pub outcome: DecisionOutcome,
    pub recorded_at: DateTime<Utc>,
}

/// Unit of delivery to the analytics sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversionEvent {
    Decision(DecisionRecord),
    Outcome(OutcomeRecord),
}

impl ConversionEvent {
    /// Id of the decision this event belongs to.
    pub const fn event_id(&self) -> Uuid {
        match self {
            Self::Decision(record) => record.event_id,
            Self::Outcome(outcome) => outcome.event_id,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Decision(_) => "decision",
            Self::Outcome(_) => "outcome",
        }
    }

    /// Key sinks deduplicate on. A decision and its outcome share an event id
    /// but are distinct records.
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.kind(), self.event_id())
    }
}
