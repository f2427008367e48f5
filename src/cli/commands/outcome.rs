//! Implementation of the `paygate outcome` command.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use uuid::Uuid;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, DecisionOutcome};
use crate::infrastructure::setup::build_engine;
use crate::services::EmitterStats;

#[derive(Args, Debug)]
pub struct OutcomeArgs {
    /// Event id of the decision the outcome belongs to
    #[arg(short, long)]
    pub event_id: Uuid,

    /// dismissed, purchased or offer_accepted
    #[arg(short, long)]
    pub outcome: DecisionOutcome,

    /// When the outcome happened (defaults to now)
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct OutcomeOutput {
    pub event_id: Uuid,
    pub outcome: DecisionOutcome,
    pub delivered: bool,
    pub emitter: EmitterStats,
}

impl CommandOutput for OutcomeOutput {
    fn to_human(&self) -> String {
        format!(
            "Recorded {} for decision {}{}",
            self.outcome,
            self.event_id,
            if self.delivered { "" } else { " (delivery failed)" }
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: OutcomeArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = build_engine(config).await?;
    let now = args.at.unwrap_or_else(Utc::now);
    if !engine.record_outcome(args.event_id, args.outcome, now) {
        engine.shutdown().await;
        bail!("Outcome could not be queued for delivery");
    }
    let emitter = engine.shutdown().await;

    output(
        &OutcomeOutput {
            event_id: args.event_id,
            outcome: args.outcome,
            delivered: emitter.delivered > 0,
            emitter,
        },
        json_mode,
    );
    Ok(())
}
