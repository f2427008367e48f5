//! Deterministic experiment variant assignment.
//!
//! A user's bucket is `sha256(user_id 0x00 experiment_id)` reduced modulo the
//! variant count. Nothing is stored: the same inputs produce the same variant
//! in every process, on every platform, forever.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An experiment and the number of variants it splits users into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentSpec {
    pub experiment_id: String,
    pub variant_count: u32,
}

impl ExperimentSpec {
    pub fn new(experiment_id: impl Into<String>, variant_count: u32) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            variant_count,
        }
    }
}

/// A derived (user, experiment) -> variant assignment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentAssignment {
    pub user_id: String,
    pub experiment_id: String,
    pub variant: u32,
}

impl ExperimentAssignment {
    /// Label attached to decisions, e.g. `paywall_v1:1`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.experiment_id, self.variant)
    }
}

/// Stateless variant assigner.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExperimentAssigner;

impl ExperimentAssigner {
    pub const fn new() -> Self {
        Self
    }

    /// Stable variant in `[0, variant_count)`.
    ///
    /// The same user and experiment always land in the same variant, with
    /// no stored state.
    ///
    /// # Arguments
    /// * `user_id` - User being bucketed
    /// * `experiment_id` - Experiment key; each experiment buckets independently
    /// * `variant_count` - Number of variants; 0 is treated as 1
    ///
    /// # Example
    /// ```
    /// use paygate::services::ExperimentAssigner;
    ///
    /// let assigner = ExperimentAssigner::new();
    /// let variant = assigner.variant("u1", "paywall_v1", 2);
    /// assert!(variant < 2);
    /// assert_eq!(variant, assigner.variant("u1", "paywall_v1", 2));
    /// assert_eq!(assigner.variant("u1", "paywall_v1", 0), 0);
    /// ```
    pub fn variant(&self, user_id: &str, experiment_id: &str, variant_count: u32) -> u32 {
        let buckets = u64::from(variant_count.max(1));
        let bucket = bucket_hash(user_id, experiment_id) % buckets;
        // bucket < variant_count, which fits in u32
        u32::try_from(bucket).unwrap_or(0)
    }

    pub fn assign(&self, user_id: &str, spec: &ExperimentSpec) -> ExperimentAssignment {
        ExperimentAssignment {
            user_id: user_id.to_string(),
            experiment_id: spec.experiment_id.clone(),
            variant: self.variant(user_id, &spec.experiment_id, spec.variant_count),
        }
    }

    /// Assign a user in several experiments; each experiment buckets independently.
    pub fn assign_all(&self, user_id: &str, specs: &[ExperimentSpec]) -> Vec<ExperimentAssignment> {
        specs.iter().map(|spec| self.assign(user_id, spec)).collect()
    }
}

fn bucket_hash(user_id: &str, experiment_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(experiment_id.as_bytes());
    let digest = hasher.finalize();

    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
