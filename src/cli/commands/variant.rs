//! Implementation of the `paygate variant` command.

use anyhow::Result;
use clap::Args;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::services::{ExperimentAssigner, ExperimentAssignment, ExperimentSpec};

#[derive(Args, Debug)]
pub struct VariantArgs {
    /// User identifier
    #[arg(short, long)]
    pub user: String,

    /// Experiment id (defaults to engine.paywall_experiment_id)
    #[arg(short, long)]
    pub experiment: Option<String>,

    /// Number of variants (defaults to engine.experiment_variant_count)
    #[arg(long)]
    pub count: Option<u32>,
}

impl CommandOutput for ExperimentAssignment {
    fn to_human(&self) -> String {
        format!(
            "{} -> variant {} of {} ({})",
            self.user_id,
            self.variant,
            self.experiment_id,
            self.label()
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Assignment is a pure function of its inputs, so no engine or database is needed.
pub fn execute(args: VariantArgs, config: &Config, json_mode: bool) -> Result<()> {
    let spec = ExperimentSpec::new(
        args.experiment
            .unwrap_or_else(|| config.engine.paywall_experiment_id.clone()),
        args.count.unwrap_or(config.engine.experiment_variant_count),
    );
    let assignment = ExperimentAssigner.assign(&args.user, &spec);
    output(&assignment, json_mode);
    Ok(())
}
