//! Implementation of the `paygate evaluate` command.
//!
//! Replays user action events, one JSON object per line, through the engine
//! and prints the resulting decisions.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::cli::output::{list_table, or_dash, output, render_list, CommandOutput};
use crate::domain::models::{ActionType, Config, DecisionRecord, UserActionEvent};
use crate::infrastructure::setup::build_engine;
use crate::services::{DecisionEngine, EmitterStats};

#[derive(Args, Debug)]
pub struct EvaluateArgs {
    /// JSON lines file of user action events, or `-` for stdin
    #[arg(default_value = "-")]
    pub input: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct EvaluateOutput {
    pub decisions: Vec<DecisionRecord>,
    /// Input lines that could not be turned into an event
    pub skipped_lines: Vec<usize>,
    pub emitter: EmitterStats,
}

impl CommandOutput for EvaluateOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["event", "user", "action", "show", "reason", "variant", "offer"]);
        for record in &self.decisions {
            table.add_row(vec![
                record.event_id.to_string()[..8].to_string(),
                record.user_id.clone(),
                record.action_type.to_string(),
                record.show.to_string(),
                record.reason.to_string(),
                or_dash(record.variant.as_ref()),
                or_dash(
                    record
                        .offer
                        .as_ref()
                        .map(|offer| format!("{}% until {}", offer.discount_percent, offer.expires_at)),
                ),
            ]);
        }
        let skipped = if self.skipped_lines.is_empty() {
            String::new()
        } else {
            let lines: Vec<String> = self.skipped_lines.iter().map(ToString::to_string).collect();
            format!("\n\nSkipped lines: {}", lines.join(", "))
        };
        format!(
            "{}{skipped}\n\nEvents delivered: {}, dropped: {}, failed: {}",
            render_list("decision", &table, self.decisions.len()),
            self.emitter.delivered,
            self.emitter.dropped,
            self.emitter.failed
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Events that can be evaluated, and the 1-based lines that could not.
#[derive(Debug, Default)]
pub struct ParsedEvents {
    pub events: Vec<UserActionEvent>,
    pub skipped_lines: Vec<usize>,
}

/// Parse one event per non-blank line. Never fails.
///
/// A line is skipped only when it is not JSON or has no usable `userId` or
/// `timestamp`. A missing or non-string `actionType` or `sessionId` still
/// yields an event, with an unrecognized action, so it is evaluated to a
/// no-show and audited.
pub fn parse_events(input: &str) -> ParsedEvents {
    let mut parsed = ParsedEvents::default();
    for (index, line) in input.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;
        let event = serde_json::from_str::<Value>(line)
            .map_err(|err| err.to_string())
            .and_then(|value| event_from_value(&value).map_err(str::to_string));
        match event {
            Ok(event) => parsed.events.push(event),
            Err(reason) => {
                warn!(line = line_number, %reason, "skipping unusable event");
                parsed.skipped_lines.push(line_number);
            }
        }
    }
    parsed
}

fn event_from_value(value: &Value) -> Result<UserActionEvent, &'static str> {
    let user_id = value
        .get("userId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .ok_or("missing userId")?;
    let timestamp = value
        .get("timestamp")
        .and_then(Value::as_str)
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .ok_or("missing or invalid timestamp")?
        .with_timezone(&Utc);

    let session_id = value.get("sessionId").and_then(Value::as_str);
    let action_type = match (session_id, value.get("actionType")) {
        (Some(_), Some(Value::String(raw))) => ActionType::from(raw.as_str()),
        (_, raw) => {
            let raw = raw.map_or_else(|| "null".to_string(), Value::to_string);
            warn!(user_id, action_type = %raw, "malformed event, evaluating as unrecognized");
            ActionType::Unrecognized(raw)
        }
    };

    Ok(UserActionEvent::new(
        user_id,
        session_id.unwrap_or_default(),
        action_type,
        timestamp,
    ))
}

async fn read_input(input: &Path) -> Result<String> {
    if input.as_os_str() == "-" {
        let mut buffer = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buffer)
            .await
            .context("Failed to read events from stdin")?;
        Ok(buffer)
    } else {
        tokio::fs::read_to_string(input)
            .await
            .with_context(|| format!("Failed to read {}", input.display()))
    }
}

/// Evaluate every parsed event in order.
pub async fn evaluate_all(engine: &DecisionEngine, events: Vec<UserActionEvent>) -> Vec<DecisionRecord> {
    let mut decisions = Vec::with_capacity(events.len());
    for event in events {
        decisions.push(engine.evaluate_record(event).await);
    }
    decisions
}

pub async fn execute(args: EvaluateArgs, config: &Config, json_mode: bool) -> Result<()> {
    let ParsedEvents {
        events,
        skipped_lines,
    } = parse_events(&read_input(&args.input).await?);
    let engine = build_engine(config).await?;

    let decisions = evaluate_all(&engine, events).await;
    let emitter = engine.shutdown().await;

    output(
        &EvaluateOutput {
            decisions,
            skipped_lines,
            emitter,
        },
        json_mode,
    );
    Ok(())
}
