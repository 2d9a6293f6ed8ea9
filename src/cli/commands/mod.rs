//! CLI command implementations
//!
//! Each subcommand has its own module with:
//! - Args struct for command-line arguments
//! - run() function to execute the command

use clap::Subcommand;

pub mod analytics;
pub mod churn;
pub mod event;
pub mod experiment;
pub mod init;
pub mod query;
pub mod schedule;
pub mod user;

use crate::app::AppContext;
use crate::error::Result;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the data root, database and default config
    Init(init::InitArgs),

    /// Manage experiments, assign users and evaluate results
    Experiment(experiment::ExperimentArgs),

    /// Manage users
    User(user::UserArgs),

    /// Record user events
    Event(event::EventArgs),

    /// Churn features, scoring and model status
    Churn(churn::ChurnArgs),

    /// Activity, retention and executive metrics
    Analytics(analytics::AnalyticsArgs),

    /// Run a guarded read-only SQL query
    Query(query::QueryArgs),

    /// Run the periodic churn refresh and model reload loop
    Schedule(schedule::ScheduleArgs),
}

/// Dispatch a command to its handler
pub fn run(ctx: &AppContext, command: &Commands) -> Result<()> {
    match command {
        Commands::Init(args) => init::run(ctx, args),
        Commands::Experiment(args) => experiment::run(ctx, args),
        Commands::User(args) => user::run(ctx, args),
        Commands::Event(args) => event::run(ctx, args),
        Commands::Churn(args) => churn::run(ctx, args),
        Commands::Analytics(args) => analytics::run(ctx, args),
        Commands::Query(args) => query::run(ctx, args),
        Commands::Schedule(args) => schedule::run(ctx, args),
    }
}
