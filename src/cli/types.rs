//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::cli::commands::{
    evaluate::EvaluateArgs, init::InitArgs, offer::OfferArgs, outcome::OutcomeArgs,
    trial::TrialArgs, variant::VariantArgs,
};

#[derive(Parser, Debug)]
#[command(name = "paygate")]
#[command(about = "Paygate - subscription lifecycle and paywall decision engine", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Config file to use instead of .paygate/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize Paygate configuration and database
    Init(InitArgs),

    /// Evaluate user action events (JSON lines) into paywall decisions
    Evaluate(EvaluateArgs),

    /// Trial lifecycle commands
    Trial(TrialArgs),

    /// Request a retention offer for a user
    Offer(OfferArgs),

    /// Show a user's experiment variant
    Variant(VariantArgs),

    /// Record what a user did after a decision
    Outcome(OutcomeArgs),
}
