//! Periodic churn refresh and model reload.
//!
//! The refresh runs on a blocking worker with its own connection so the
//! async loop never touches SQLite. Each run is bounded by the job timeout
//! and by shutdown; either one raises the worker's cancel flag and the run
//! stops at the next user boundary, keeping the scores it already wrote.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::churn::{ChurnPolicy, RefreshOptions, RefreshReport, ScorerHandle, refresh_churn_scores};
use crate::config::{Config, SchedulerConfig};
use crate::error::{Result, SplitError};
use crate::storage::Database;

pub struct Scheduler {
    db_path: PathBuf,
    model_path: PathBuf,
    scorer: Arc<ScorerHandle>,
    settings: SchedulerConfig,
    policy: ChurnPolicy,
    busy_timeout: Duration,
}

impl Scheduler {
    pub fn new(
        db_path: PathBuf,
        model_path: PathBuf,
        scorer: Arc<ScorerHandle>,
        config: &Config,
    ) -> Self {
        Self {
            db_path,
            model_path,
            scorer,
            settings: config.scheduler.clone(),
            policy: config.churn.policy(),
            busy_timeout: config.storage.busy_timeout(),
        }
    }

    /// Run until `shutdown` flips to true or its sender is dropped.
    ///
    /// The first refresh starts immediately; model reloads start one
    /// reload interval in.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut refresh = tokio::time::interval(self.settings.refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reload = tokio::time::interval_at(
            Instant::now() + self.settings.reload_interval,
            self.settings.reload_interval,
        );
        reload.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            target: "scheduler",
            refresh_every = ?self.settings.refresh_interval,
            reload_every = ?self.settings.reload_interval,
            "scheduler started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(target: "scheduler", "scheduler received shutdown signal");
                        break;
                    }
                }
                _ = refresh.tick() => {
                    if let Err(err) = self.refresh_until_shutdown(&mut shutdown).await {
                        warn!(target: "scheduler", error = %err, "churn refresh failed");
                    }
                    if shutdown_requested(&shutdown) {
                        info!(target: "scheduler", "scheduler stopping after cancelled refresh");
                        break;
                    }
                }
                _ = reload.tick() => {
                    self.reload_model();
                }
            }
        }
        Ok(())
    }

    /// One bounded churn refresh on a blocking worker.
    pub async fn run_refresh_job(&self) -> Result<RefreshReport> {
        let (_keep_open, mut never) = watch::channel(false);
        self.refresh_until_shutdown(&mut never).await
    }

    /// Like [`Self::run_refresh_job`], but shutdown also cancels the run.
    pub async fn refresh_until_shutdown(
        &self,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<RefreshReport> {
        let cancel = Arc::new(AtomicBool::new(shutdown_requested(shutdown)));
        let job_timeout = self.settings.job_timeout;

        let db_path = self.db_path.clone();
        let scorer = Arc::clone(&self.scorer);
        let policy = self.policy;
        let busy_timeout = self.busy_timeout;
        let worker_cancel = Arc::clone(&cancel);
        let mut handle = tokio::task::spawn_blocking(move || {
            let db = Database::open_with_timeout(&db_path, busy_timeout)?;
            let options = RefreshOptions {
                deadline: Some(job_timeout),
                ..RefreshOptions::default()
            };
            refresh_churn_scores(&db, &scorer, Utc::now(), &policy, &options, &worker_cancel)
        });

        let deadline = tokio::time::sleep(job_timeout);
        tokio::pin!(deadline);
        let joined = loop {
            let cancelled = cancel.load(Ordering::SeqCst);
            tokio::select! {
                joined = &mut handle => break joined,
                () = &mut deadline, if !cancelled => {
                    warn!(target: "scheduler", timeout = ?job_timeout, "churn refresh over time; cancelling");
                    cancel.store(true, Ordering::SeqCst);
                }
                changed = shutdown.changed(), if !cancelled => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(target: "scheduler", "shutdown requested; cancelling churn refresh");
                        cancel.store(true, Ordering::SeqCst);
                    }
                }
            }
        };
        let report = joined.map_err(|err| SplitError::Io(std::io::Error::other(err)))??;
        debug!(target: "scheduler", status = ?report.status, updated = report.updated, "churn refresh job done");
        Ok(report)
    }

    /// Reload the model file into the shared handle. A missing or invalid
    /// file keeps the current model.
    pub fn reload_model(&self) -> Option<u64> {
        if !self.model_path.exists() {
            debug!(target: "scheduler", path = %self.model_path.display(), "no model file to reload");
            return None;
        }
        match self.scorer.load_from_path(&self.model_path) {
            Ok(version) => Some(version),
            Err(err) => {
                warn!(target: "scheduler", error = %err, "model reload failed; keeping current model");
                None
            }
        }
    }
}

/// True once shutdown was signalled or its sender is gone.
fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}
