//! splitlab experiment - manage experiments, assign users, evaluate results

use chrono::Utc;
use clap::{Args, Subcommand};

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::{Result, SplitError};
use crate::experiment::{
    Allocation, AssignmentEngine, Significance, WeightCheck, check_variants, check_weights,
    churn_by_variant, evaluate,
};
use crate::storage::NewVariant;

#[derive(Args, Debug)]
pub struct ExperimentArgs {
    #[command(subcommand)]
    pub command: ExperimentCommand,
}

#[derive(Subcommand, Debug)]
pub enum ExperimentCommand {
    /// Create an active experiment with ordered, weighted variants
    Create(CreateArgs),

    /// List experiments with their variants
    List,

    /// Stop accepting new assignments
    Close(NameArgs),

    /// Get or create a user's sticky variant
    Assign(AssignArgs),

    /// Conversion rates and significance per variant
    Evaluate(NameArgs),

    /// Average churn probability per variant
    ChurnImpact(NameArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unique experiment name
    pub name: String,

    /// Variant as NAME=PERCENT; repeat in selection order
    #[arg(long = "variant", value_parser = parse_variant)]
    pub variants: Vec<NewVariant>,
}

#[derive(Args, Debug)]
pub struct NameArgs {
    pub name: String,
}

#[derive(Args, Debug)]
pub struct AssignArgs {
    pub name: String,

    #[arg(long)]
    pub user: String,
}

fn parse_variant(raw: &str) -> std::result::Result<NewVariant, String> {
    let (name, weight) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=PERCENT, got {raw}"))?;
    let weight = weight
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("invalid weight in {raw}: {err}"))?;
    Ok(NewVariant::new(name.trim(), weight))
}

pub fn run(ctx: &AppContext, args: &ExperimentArgs) -> Result<()> {
    match &args.command {
        ExperimentCommand::Create(args) => create(ctx, args),
        ExperimentCommand::List => list(ctx),
        ExperimentCommand::Close(args) => close(ctx, args),
        ExperimentCommand::Assign(args) => assign(ctx, args),
        ExperimentCommand::Evaluate(args) => evaluate_cmd(ctx, args),
        ExperimentCommand::ChurnImpact(args) => churn_impact(ctx, args),
    }
}

fn allocation_note(check: &WeightCheck) -> Option<String> {
    let total = check.total;
    match check.allocation {
        Allocation::Exact => None,
        Allocation::Under => Some(format!(
            "weights sum to {total}; the last variant absorbs the remaining {}%",
            check.fallback_share()
        )),
        Allocation::Over => Some(format!(
            "weights sum to {total}; variants past 100 receive less than their weight"
        )),
    }
}

fn create(ctx: &AppContext, args: &CreateArgs) -> Result<()> {
    let experiment = ctx.db.create_experiment(&args.name, &args.variants, Utc::now())?;
    let check = check_weights(args.variants.iter().map(|v| v.traffic_percentage));

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "experiment": experiment,
            "variants": ctx.db.variants_for(&experiment.id)?,
            "weights": check,
        }));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!("Created experiment {}", experiment.name));
    for variant in &args.variants {
        layout.kv(&variant.name, &format!("{}%", variant.traffic_percentage));
    }
    if let Some(note) = allocation_note(&check) {
        layout.blank().warning(&note);
    }
    emit_human(layout);
    Ok(())
}

fn list(ctx: &AppContext) -> Result<()> {
    let experiments = ctx.db.list_experiments()?;
    let mut rows = Vec::with_capacity(experiments.len());
    for experiment in experiments {
        let variants = ctx.db.variants_for(&experiment.id)?;
        let weights = check_variants(&variants);
        let assigned = ctx.db.count_assignments_for_experiment(&experiment.id)?;
        rows.push((experiment, variants, weights, assigned));
    }

    if ctx.robot_mode {
        let payload: Vec<_> = rows
            .iter()
            .map(|(experiment, variants, weights, assigned)| {
                serde_json::json!({
                    "experiment": experiment,
                    "variants": variants,
                    "weights": weights,
                    "assigned_users": assigned,
                })
            })
            .collect();
        return emit_json(&serde_json::json!({ "status": "ok", "experiments": payload }));
    }

    let mut layout = HumanLayout::new();
    layout.title("Experiments");
    if rows.is_empty() {
        layout.push_line("(none)");
    }
    for (experiment, variants, weights, assigned) in &rows {
        let state = if experiment.is_active { "active" } else { "closed" };
        layout
            .section(&format!("{} ({state})", experiment.name))
            .kv("Assigned users", &assigned.to_string());
        for variant in variants {
            layout.bullet(&format!("{} {}%", variant.name, variant.traffic_percentage));
        }
        if let Some(note) = allocation_note(weights) {
            layout.warning(&note);
        }
        layout.blank();
    }
    emit_human(layout);
    Ok(())
}

fn close(ctx: &AppContext, args: &NameArgs) -> Result<()> {
    if !ctx.db.set_experiment_active(&args.name, false)? {
        return Err(SplitError::ExperimentNotFound(args.name.clone()));
    }
    if ctx.robot_mode {
        emit_json(&serde_json::json!({ "status": "ok", "experiment": args.name, "active": false }))
    } else {
        let mut layout = HumanLayout::new();
        layout.title(&format!("Closed experiment {}", args.name));
        emit_human(layout);
        Ok(())
    }
}

fn assign(ctx: &AppContext, args: &AssignArgs) -> Result<()> {
    let outcome = AssignmentEngine::new(&ctx.db).assign(&args.user, &args.name)?;
    if ctx.robot_mode {
        emit_json(&serde_json::json!({ "status": "ok", "assignment": outcome }))
    } else {
        let mut layout = HumanLayout::new();
        layout
            .title(&format!("Assignment for {}", args.user))
            .kv("Experiment", &args.name)
            .kv("Variant", &outcome.variant_name)
            .kv("New", &outcome.created.to_string());
        emit_human(layout);
        Ok(())
    }
}

fn evaluate_cmd(ctx: &AppContext, args: &NameArgs) -> Result<()> {
    let rules = ctx.config.experiments.conversion_rules();
    let evaluation = evaluate(&ctx.db, &args.name, &rules)?;
    if ctx.robot_mode {
        return emit_json(&serde_json::json!({ "status": "ok", "evaluation": evaluation }));
    }

    let mut layout = HumanLayout::new();
    layout.title(&format!(
        "Evaluation: {}{}",
        evaluation.experiment,
        if evaluation.active { "" } else { " (closed)" }
    ));
    for variant in &evaluation.variants {
        layout.kv(
            &variant.variant_name,
            &format!(
                "{} / {} converted ({:.2}%)",
                variant.conversions,
                variant.total_users,
                variant.conversion_rate * 100.0
            ),
        );
    }
    layout.blank().section("Significance");
    match &evaluation.significance {
        Significance::Tested {
            z_statistic,
            p_value,
        } => {
            layout
                .kv("z statistic", &format!("{z_statistic:.5}"))
                .kv("p-value", &format!("{p_value:.5}"));
        }
        other => {
            layout.push_line(other.message());
        }
    }
    emit_human(layout);
    Ok(())
}

fn churn_impact(ctx: &AppContext, args: &NameArgs) -> Result<()> {
    let impact = churn_by_variant(&ctx.db, &args.name)?;
    if ctx.robot_mode {
        return emit_json(&serde_json::json!({ "status": "ok", "experiment": args.name, "variants": impact }));
    }
    let mut layout = HumanLayout::new();
    layout.title(&format!("Churn impact: {}", args.name));
    for variant in &impact {
        layout.kv(
            &variant.variant_name,
            &format!(
                "avg churn {:.4} over {} users",
                variant.average_churn_probability, variant.assigned_users
            ),
        );
    }
    if impact.is_empty() {
        layout.push_line("(no variants)");
    }
    emit_human(layout);
    Ok(())
}
