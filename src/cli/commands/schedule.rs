//! splitlab schedule - periodic churn refresh and model reload

use std::sync::Arc;

use clap::Args;
use tokio::sync::watch;

use crate::app::AppContext;
use crate::cli::output::{HumanLayout, emit_human, emit_json, or_dash};
use crate::error::Result;
use crate::scheduler::Scheduler;

#[derive(Args, Debug)]
pub struct ScheduleArgs {
    /// Run a single refresh job and exit
    #[arg(long)]
    pub once: bool,
}

pub fn run(ctx: &AppContext, args: &ScheduleArgs) -> Result<()> {
    let scheduler = Scheduler::new(
        ctx.database_path(),
        ctx.model_path(),
        Arc::clone(&ctx.scorer),
        &ctx.config,
    );
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    if args.once {
        let report = runtime.block_on(scheduler.run_refresh_job())?;
        if ctx.robot_mode {
            return emit_json(&serde_json::json!({ "status": "ok", "refresh": report }));
        }
        let mut layout = HumanLayout::new();
        layout
            .title("Churn refresh")
            .kv("Status", &format!("{:?}", report.status))
            .kv("Model version", &or_dash(report.model_version))
            .kv("Users updated", &report.updated.to_string());
        emit_human(layout);
        return Ok(());
    }

    runtime.block_on(async {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = shutdown_tx.send(true);
            }
        });
        scheduler.run(shutdown_rx).await
    })
}
