//! CLI command definitions and dispatch for the `studyflow` binary.
//!
//! Uses clap derive macros for argument parsing. Commands are grouped by
//! noun (`studyflow workflow run`, `studyflow schedule add`).

pub mod key;
pub mod schedule;
pub mod workflow;

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use comfy_table::{Cell, Color};

use studyflow_types::workflow::RunStatus;

/// Default user for local CLI use.
pub const DEFAULT_USER: &str = "local";

/// Run study workflows and scheduled tasks.
#[derive(Parser)]
#[command(name = "studyflow", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// User the command acts as.
    #[arg(long, global = true, env = "STUDYFLOW_USER", default_value = DEFAULT_USER)]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage and run workflows.
    #[command(alias = "wf")]
    Workflow {
        #[command(subcommand)]
        action: workflow::WorkflowCommand,
    },

    /// Manage scheduled tasks.
    Schedule {
        #[command(subcommand)]
        action: schedule::ScheduleCommand,
    },

    /// Manage REST API keys.
    Key {
        #[command(subcommand)]
        action: key::KeyCommand,
    },

    /// Start the REST API server together with the scheduler daemon.
    Serve {
        /// Port to listen on (default from config).
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to (default from config).
        #[arg(long)]
        host: Option<String>,
    },

    /// Run only the scheduler daemon.
    Scheduler,

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

/// Colored table cell for a run status.
pub fn format_status(status: RunStatus) -> Cell {
    match status {
        RunStatus::Running => Cell::new("running").fg(Color::Blue),
        RunStatus::Completed => Cell::new("completed").fg(Color::Green),
        RunStatus::Failed => Cell::new("failed").fg(Color::Red),
    }
}

/// First eight characters of an ID, for tables.
pub fn short_id(id: &uuid::Uuid) -> String {
    id.to_string().chars().take(8).collect()
}
