//! splitlab analytics - activity, retention and executive metrics

use chrono::Utc;
use clap::{Args, Subcommand};

use crate::analytics::{
    cohort_retention, daily_active_users, day1_retention, executive_metrics,
    monthly_active_users, rolling_active_users,
};
use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json};
use crate::error::Result;

#[derive(Args, Debug)]
pub struct AnalyticsArgs {
    #[command(subcommand)]
    pub command: AnalyticsCommand,
}

#[derive(Subcommand, Debug)]
pub enum AnalyticsCommand {
    /// Executive summary: users, DAU, MAU, churn risk
    Summary,

    /// Active user counts
    Active(ActiveArgs),

    /// Day-1 retention and signup cohort curves
    Retention(RetentionArgs),
}

#[derive(Args, Debug)]
pub struct ActiveArgs {
    /// Rolling window in days
    #[arg(long, default_value_t = 7)]
    pub days: u32,
}

#[derive(Args, Debug)]
pub struct RetentionArgs {
    /// Days after signup to report per cohort
    #[arg(long, default_value_t = 7)]
    pub max_days: u32,
}

pub fn run(ctx: &AppContext, args: &AnalyticsArgs) -> Result<()> {
    match &args.command {
        AnalyticsCommand::Summary => summary(ctx),
        AnalyticsCommand::Active(args) => active(ctx, args),
        AnalyticsCommand::Retention(args) => retention(ctx, args),
    }
}

fn summary(ctx: &AppContext) -> Result<()> {
    let now = Utc::now();
    let metrics = executive_metrics(&ctx.db, now, ctx.config.churn.high_risk_threshold)?;
    let day1 = day1_retention(&ctx.db, now)?;

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "metrics": metrics,
            "day1_retention": day1,
        }));
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Executive summary")
        .kv("Total users", &metrics.total_users.to_string())
        .kv("Daily active", &metrics.daily_active_users.to_string())
        .kv("Monthly active", &metrics.monthly_active_users.to_string())
        .kv("Day-1 retention", &format!("{day1:.2}%"))
        .kv(
            "Avg churn probability",
            &format!("{:.4}", metrics.average_churn_probability),
        )
        .kv(
            &format!("High risk (>{})", ctx.config.churn.high_risk_threshold),
            &metrics.high_risk_users.to_string(),
        );
    emit_human(layout);
    Ok(())
}

fn active(ctx: &AppContext, args: &ActiveArgs) -> Result<()> {
    let now = Utc::now();
    let daily = daily_active_users(&ctx.db, now)?;
    let rolling = rolling_active_users(&ctx.db, now, args.days)?;
    let monthly = monthly_active_users(&ctx.db, now)?;

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "daily_active_users": daily,
            "rolling_active_users": rolling,
            "rolling_days": args.days,
            "monthly_active_users": monthly,
        }));
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Active users")
        .kv("Today", &daily.to_string())
        .kv(&format!("Last {} days", args.days), &rolling.to_string())
        .kv("Last 30 days", &monthly.to_string());
    emit_human(layout);
    Ok(())
}

fn retention(ctx: &AppContext, args: &RetentionArgs) -> Result<()> {
    let day1 = day1_retention(&ctx.db, Utc::now())?;
    let cohorts = cohort_retention(&ctx.db, args.max_days)?;

    if ctx.robot_mode {
        return emit_json(&serde_json::json!({
            "status": "ok",
            "day1_retention": day1,
            "cohorts": cohorts,
        }));
    }
    let mut layout = HumanLayout::new();
    layout
        .title("Retention")
        .kv("Day-1 retention", &format!("{day1:.2}%"))
        .blank()
        .section("Cohorts");
    if cohorts.is_empty() {
        layout.push_line("(no users)");
    }
    for cohort in &cohorts {
        let curve = cohort
            .retention
            .iter()
            .map(|pct| format!("{pct:>6.2}"))
            .collect::<Vec<_>>()
            .join(" ");
        layout.kv(
            &format!("{} (n={})", cohort.cohort_date, cohort.cohort_size),
            &curve,
        );
    }
    emit_human(layout);
    Ok(())
}
