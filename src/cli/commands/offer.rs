//! Implementation of the `paygate offer` command.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, Offer};
use crate::infrastructure::setup::build_engine;
use crate::services::{OfferIneligibility, OfferSelection};

#[derive(Args, Debug)]
pub struct OfferArgs {
    /// User identifier
    #[arg(short, long)]
    pub user: String,

    /// Evaluate at this RFC 3339 instant instead of now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OfferOutput {
    Granted { user_id: String, offer: Offer },
    Existing { user_id: String, offer: Offer },
    Ineligible { user_id: String, detail: OfferIneligibility },
}

impl OfferOutput {
    fn new(user_id: String, selection: OfferSelection) -> Self {
        match selection {
            OfferSelection::Granted(offer) => Self::Granted { user_id, offer },
            OfferSelection::Existing(offer) => Self::Existing { user_id, offer },
            OfferSelection::Ineligible(detail) => Self::Ineligible { user_id, detail },
        }
    }
}

fn describe_offer(offer: &Offer) -> String {
    format!(
        "{}% off, expires {}, next offer after {}",
        offer.discount_percent, offer.expires_at, offer.cooldown_until
    )
}

impl CommandOutput for OfferOutput {
    fn to_human(&self) -> String {
        match self {
            Self::Granted { user_id, offer } => {
                format!("Granted offer to {user_id}: {}", describe_offer(offer))
            }
            Self::Existing { user_id, offer } => {
                format!("{user_id} already holds an offer: {}", describe_offer(offer))
            }
            Self::Ineligible { user_id, detail } => {
                let why = match detail {
                    OfferIneligibility::Converted => "user has converted".to_string(),
                    OfferIneligibility::InsufficientSessions { recorded, required } => {
                        format!("{recorded} of {required} required sessions recorded")
                    }
                    OfferIneligibility::CoolingDown { until } => {
                        format!("cooling down until {until}")
                    }
                };
                format!("No offer for {user_id}: {why}")
            }
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: OfferArgs, config: &Config, json_mode: bool) -> Result<()> {
    let engine = build_engine(config).await?;
    let now = args.at.unwrap_or_else(Utc::now);
    let selection = engine.request_offer(&args.user, now).await?;
    engine.shutdown().await;

    output(&OfferOutput::new(args.user, selection), json_mode);
    Ok(())
}
