//! splitlab churn - features, scoring and model status

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use chrono::Utc;
use clap::{Args, Subcommand, ValueEnum};

use crate::app::AppContext;
use crate::churn::{
    Prediction, RefreshOptions, features_for, generate_churn_features, refresh_churn_scores,
    write_csv,
};
use crate::cli::output::{HumanLayout, emit_human, emit_json, or_dash};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct ChurnArgs {
    #[command(subcommand)]
    pub command: ChurnCommand,
}

#[derive(Subcommand, Debug)]
pub enum ChurnCommand {
    /// Export labelled training features for every user
    Features(FeaturesArgs),

    /// Score one user with the loaded model
    Predict(PredictArgs),

    /// Recompute and store churn probabilities for all users
    Refresh(RefreshArgs),

    /// Users with the highest stored churn probability
    TopRisk(TopRiskArgs),

    /// Show or reload the churn model
    Model(ModelArgs),
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

#[derive(Args, Debug)]
pub struct FeaturesArgs {
    #[arg(long, value_enum, default_value_t)]
    pub format: ExportFormat,

    /// Write to a file instead of stdout
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Override churn.inactivity_days for the labels
    #[arg(long)]
    pub inactivity_days: Option<u32>,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    #[arg(long)]
    pub user: String,
}

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Continue after this user id
    #[arg(long)]
    pub resume_after: Option<String>,

    /// Stop after this many seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(Args, Debug)]
pub struct TopRiskArgs {
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Load this model file (defaults to the configured path)
    #[arg(long)]
    pub load: Option<PathBuf>,
}

pub fn run(ctx: &AppContext, args: &ChurnArgs) -> Result<()> {
    match &args.command {
        ChurnCommand::Features(args) => features(ctx, args),
        ChurnCommand::Predict(args) => predict(ctx, args),
        ChurnCommand::Refresh(args) => refresh(ctx, args),
        ChurnCommand::TopRisk(args) => top_risk(ctx, args),
        ChurnCommand::Model(args) => model(ctx, args),
    }
}

fn features(ctx: &AppContext, args: &FeaturesArgs) -> Result<()> {
    let mut policy = ctx.config.churn.policy();
    if let Some(days) = args.inactivity_days {
        policy = policy.with_inactivity_days(days);
    }
    let rows = generate_churn_features(&ctx.db, Utc::now(), &policy)?;

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    match args.format {
        ExportFormat::Csv => write_csv(&rows, &mut out)?,
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &rows)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn predict(ctx: &AppContext, args: &PredictArgs) -> Result<()> {
    let features = features_for(&ctx.db, &args.user, Utc::now(), &ctx.config.churn.policy())?;
    let prediction = ctx.scorer.predict(&features);

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "user_id": args.user,
            "features": features,
            "prediction": prediction,
        }));
    }
    let mut layout = HumanLayout::new();
    layout
        .title(&format!("Churn prediction for {}", args.user))
        .kv("Total events", &features.total_events.to_string())
        .kv(
            "Days since last event",
            &features.days_since_last_event.to_string(),
        );
    match prediction {
        Prediction::Probability(p) => {
            layout.kv("Churn probability", &format!("{p:.4}"));
        }
        Prediction::Unavailable => {
            layout.warning("no churn model loaded");
        }
    }
    emit_human(layout);
    Ok(())
}

fn refresh(ctx: &AppContext, args: &RefreshArgs) -> Result<()> {
    let options = RefreshOptions {
        deadline: args.timeout_secs.map(Duration::from_secs),
        resume_after: args.resume_after.clone(),
        ..RefreshOptions::default()
    };
    let report = refresh_churn_scores(
        &ctx.db,
        &ctx.scorer,
        Utc::now(),
        &ctx.config.churn.policy(),
        &options,
        &AtomicBool::new(false),
    )?;

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({ "status": "ok", "refresh": report }));
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Churn refresh")
        .kv("Status", &format!("{:?}", report.status))
        .kv("Model version", &or_dash(report.model_version))
        .kv("Users updated", &report.updated.to_string())
        .kv("Last user", &or_dash(report.last_user_id.as_deref()))
        .kv("Elapsed", &format!("{} ms", report.elapsed_ms));
    emit_human(layout);
    Ok(())
}

fn top_risk(ctx: &AppContext, args: &TopRiskArgs) -> Result<()> {
    let users = crate::analytics::top_churn_risk_users(&ctx.db, args.limit)?;
    if ctx.robot_mode {
        return emit_json(&serde_json::json!({ "status": "ok", "users": users }));
    }
    let mut layout = HumanLayout::new();
    layout.title("Highest churn risk");
    if users.is_empty() {
        layout.push_line("(no scored users)");
    }
    for user in &users {
        layout.kv(&user.id, &or_dash(user.churn_probability.map(|p| format!("{p:.4}"))));
    }
    emit_human(layout);
    Ok(())
}

fn model(ctx: &AppContext, args: &ModelArgs) -> Result<()> {
    if let Some(path) = &args.load {
        ctx.scorer.load_from_path(path)?;
    }
    let status = ctx.scorer.status();

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "model": status,
            "configured_path": ctx.model_path().display().to_string(),
        }));
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Churn model")
        .kv("Loaded", &status.loaded.to_string())
        .kv("Kind", &or_dash(status.kind.as_deref()))
        .kv("Version", &or_dash(status.version))
        .kv(
            "Source",
            &or_dash(status.source.as_ref().map(|p| p.display().to_string())),
        )
        .kv("Configured path", &ctx.model_path().display().to_string());
    emit_human(layout);
    Ok(())
}
