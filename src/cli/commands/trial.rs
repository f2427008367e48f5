//! Implementation of the `paygate trial` commands.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::cli::output::{or_dash, output, CommandOutput};
use crate::domain::models::{Config, TrialStatus, MAX_TRIAL_DURATION_DAYS};
use crate::infrastructure::setup::build_engine;

#[derive(Args, Debug)]
pub struct TrialArgs {
    #[command(subcommand)]
    pub command: TrialCommands,
}

#[derive(Subcommand, Debug)]
pub enum TrialCommands {
    /// Start a user's trial (no-op if one was already started)
    Start {
        /// User identifier
        #[arg(short, long)]
        user: String,

        /// Trial length in days (defaults to engine.trial_duration_days)
        #[arg(
            short,
            long,
            value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_TRIAL_DURATION_DAYS))
        )]
        days: Option<u32>,

        /// Evaluate at this RFC 3339 instant instead of now
        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Show a user's trial status and days remaining
    Status {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },

    /// Mark a user as converted after a verified purchase
    Convert {
        #[arg(short, long)]
        user: String,

        #[arg(long)]
        at: Option<DateTime<Utc>>,
    },
}

#[derive(Debug, Serialize)]
pub struct TrialOutput {
    pub user_id: String,
    pub status: TrialStatus,
    pub days_remaining: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

impl CommandOutput for TrialOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("User:           {}", self.user_id),
            format!("Status:         {}", self.status),
            format!("Days remaining: {}", self.days_remaining),
        ];
        if self.start_date.is_some() {
            lines.push(format!("Started:        {}", or_dash(self.start_date)));
        }
        if self.changed == Some(false) {
            lines.push("(already converted)".to_string());
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: TrialArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = build_engine(config).await?;

    let output_data = match args.command {
        TrialCommands::Start { user, days, at } => {
            let now = at.unwrap_or_else(Utc::now);
            let trial = match days {
                Some(days) => engine.start_trial_with_duration(&user, days, now).await?,
                None => engine.start_trial(&user, now).await?,
            };
            TrialOutput {
                status: engine.trial_status(&user, now).await?,
                days_remaining: engine.days_remaining(&user, now).await?,
                start_date: trial.start_date,
                changed: None,
                user_id: user,
            }
        }
        TrialCommands::Status { user, at } => {
            let now = at.unwrap_or_else(Utc::now);
            TrialOutput {
                status: engine.trial_status(&user, now).await?,
                days_remaining: engine.days_remaining(&user, now).await?,
                start_date: None,
                changed: None,
                user_id: user,
            }
        }
        TrialCommands::Convert { user, at } => {
            let now = at.unwrap_or_else(Utc::now);
            let changed = engine.mark_converted(&user, now).await?;
            TrialOutput {
                status: engine.trial_status(&user, now).await?,
                days_remaining: engine.days_remaining(&user, now).await?,
                start_date: None,
                changed: Some(changed),
                user_id: user,
            }
        }
    };
    engine.shutdown().await;

    output(&output_data, json_mode);
    Ok(())
}
