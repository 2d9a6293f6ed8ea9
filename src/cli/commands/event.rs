//! splitlab event - record user events

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::{Result, SplitError};

#[derive(Args, Debug)]
pub struct EventArgs {
    #[command(subcommand)]
    pub command: EventCommand,
}

#[derive(Subcommand, Debug)]
pub enum EventCommand {
    /// Append an event for an existing user
    Log(LogArgs),

    /// Show a user's events, oldest first
    List(ListArgs),
}

#[derive(Args, Debug)]
pub struct LogArgs {
    #[arg(long)]
    pub user: String,

    /// Event type, e.g. login or experiment_conversion
    #[arg(long = "type")]
    pub event_type: String,

    /// JSON object payload
    #[arg(long, value_parser = parse_payload, default_value = "{}")]
    pub payload: serde_json::Value,

    /// RFC 3339 timestamp; defaults to now
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub user: String,
}

fn parse_payload(raw: &str) -> std::result::Result<serde_json::Value, String> {
    serde_json::from_str(raw).map_err(|err| format!("invalid JSON payload: {err}"))
}

pub fn run(ctx: &AppContext, args: &EventArgs) -> Result<()> {
    match &args.command {
        EventCommand::Log(args) => log(ctx, args),
        EventCommand::List(args) => list(ctx, args),
    }
}

fn log(ctx: &AppContext, args: &LogArgs) -> Result<()> {
    let event = ctx.db.log_event(
        &args.user,
        &args.event_type,
        args.payload.clone(),
        args.at.unwrap_or_else(Utc::now),
    )?;
    if ctx.robot_mode {
        emit_json(&serde_json::json!({ "status": "ok", "event": event }))
    } else {
        let mut layout = HumanLayout::new();
        layout
            .title("Logged event")
            .kv("Id", &event.id)
            .kv("User", &event.user_id)
            .kv("Type", &event.event_type)
            .kv("At", &event.timestamp.to_rfc3339());
        emit_human(layout);
        Ok(())
    }
}

fn list(ctx: &AppContext, args: &ListArgs) -> Result<()> {
    if !ctx.db.user_exists(&args.user)? {
        return Err(SplitError::UserNotFound(args.user.clone()));
    }
    let events = ctx.db.events_for_user(&args.user)?;
    if ctx.robot_mode {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "user": args.user,
            "events": events,
        }));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Events for {}", args.user));
    for event in &events {
        layout.kv(
            &event.timestamp.to_rfc3339(),
            &format!("{} {}", event.event_type, event.payload),
        );
    }
    if events.is_empty() {
        layout.push_line("(no events)");
    }
    emit_human(layout);
    Ok(())
}
