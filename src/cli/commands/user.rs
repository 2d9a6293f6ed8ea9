//! splitlab user - manage users

use chrono::Utc;
use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::churn::experiment_exposed;
use crate::cli::output::{HumanLayout, emit_human, emit_json, or_dash};
use crate::error::{Result, SplitError};

#[derive(Args, Debug)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    /// Register a new user
    Add(AddArgs),

    /// Show a user and their stored churn probability
    Show(ShowArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    #[arg(long)]
    pub email: Option<String>,
}

#[derive(Args, Debug)]
pub struct ShowArgs {
    pub id: String,
}

pub fn run(ctx: &AppContext, args: &UserArgs) -> Result<()> {
    match &args.command {
        UserCommand::Add(args) => add(ctx, args),
        UserCommand::Show(args) => show(ctx, args),
    }
}

fn add(ctx: &AppContext, args: &AddArgs) -> Result<()> {
    let user = ctx.db.create_user(args.email.as_deref(), Utc::now())?;
    if ctx.robot_mode {
        emit_json(&serde_json::json!({ "status": "ok", "user": user }))
    } else {
        let mut layout = HumanLayout::new();
        layout
            .title("Created user")
            .kv("Id", &user.id)
            .kv("Email", &or_dash(user.email.as_deref()));
        emit_human(layout);
        Ok(())
    }
}

fn show(ctx: &AppContext, args: &ShowArgs) -> Result<()> {
    let user = ctx
        .db
        .get_user(&args.id)?
        .ok_or_else(|| SplitError::UserNotFound(args.id.clone()))?;
    let (events, last_event) = ctx.db.event_stats_for_user(&user.id)?;
    let exposed = experiment_exposed(&ctx.db, &user.id)?;

    if ctx.robot_mode {
        emit_json(&serde_json::json!({
            "status": "ok",
            "user": user,
            "total_events": events,
            "last_event_at": last_event,
            "experiment_exposed": exposed,
        }))
    } else {
        let mut layout = HumanLayout::new();
        layout
            .title(&format!("User {}", user.id))
            .kv("Email", &or_dash(user.email.as_deref()))
            .kv("Created", &user.created_at.to_rfc3339())
            .kv("Events", &events.to_string())
            .kv("Last event", &or_dash(last_event.map(|t| t.to_rfc3339())))
            .kv("In an experiment", if exposed == 1 { "yes" } else { "no" })
            .kv("Churn probability", &or_dash(user.churn_probability));
        emit_human(layout);
        Ok(())
    }
}
