//! CLI workflow management subcommands.
//!
//! Provides create, update, list, show, enable/disable, delete, run and run
//! inspection for the acting user's workflows.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Subcommand;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use uuid::Uuid;

use studyflow_core::service::workflow::DEFAULT_RUN_LIMIT;
use studyflow_core::workflow::definition::{load_workflow_file, DefinitionError};
use studyflow_core::workflow::executor::WorkflowExecutor;
use studyflow_types::workflow::{RunRecord, RunStatus, WorkflowSpec};

use crate::cli::{format_status, short_id};
use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Create a workflow from a YAML or JSON definition file.
    Create {
        /// Path to the definition file.
        file: PathBuf,
    },

    /// Replace a workflow's definition from a file.
    Update {
        /// Workflow ID.
        id: Uuid,
        /// Path to the definition file.
        file: PathBuf,
    },

    /// List your workflows.
    #[command(alias = "ls")]
    List,

    /// Show a workflow and its steps.
    Show {
        /// Workflow ID.
        id: Uuid,
    },

    /// Enable a workflow (and its schedule).
    Enable {
        /// Workflow ID.
        id: Uuid,
    },

    /// Disable a workflow (and its schedule).
    Disable {
        /// Workflow ID.
        id: Uuid,
    },

    /// Delete a workflow. Its run history is kept.
    #[command(alias = "rm")]
    Delete {
        /// Workflow ID.
        id: Uuid,
    },

    /// Execute a workflow now and wait for it to finish.
    Run {
        /// Workflow ID.
        id: Uuid,
    },

    /// Show recent runs of a workflow.
    Runs {
        /// Workflow ID.
        id: Uuid,

        /// Maximum number of runs to display.
        #[arg(long, default_value_t = DEFAULT_RUN_LIMIT)]
        limit: u32,
    },

    /// Show one run in detail, including step results.
    RunStatus {
        /// Run ID.
        run_id: Uuid,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    user_id: &str,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create { file } => handle_create(&file, state, user_id, json).await,
        WorkflowCommand::Update { id, file } => {
            handle_update(&id, &file, state, user_id, json).await
        }
        WorkflowCommand::List => handle_list(state, user_id, json).await,
        WorkflowCommand::Show { id } => handle_show(&id, state, user_id, json).await,
        WorkflowCommand::Enable { id } => handle_toggle(&id, true, state, user_id, json).await,
        WorkflowCommand::Disable { id } => handle_toggle(&id, false, state, user_id, json).await,
        WorkflowCommand::Delete { id } => handle_delete(&id, state, user_id, json).await,
        WorkflowCommand::Run { id } => handle_run(id, state, user_id, json).await,
        WorkflowCommand::Runs { id, limit } => {
            handle_runs(&id, limit, state, user_id, json).await
        }
        WorkflowCommand::RunStatus { run_id } => {
            handle_run_status(&run_id, state, user_id, json).await
        }
    }
}

fn load_spec(file: &Path) -> Result<WorkflowSpec> {
    load_workflow_file(file).map_err(|e| match e {
        DefinitionError::ParseError(msg) => {
            anyhow::anyhow!("Failed to parse {}: {msg}", file.display())
        }
        DefinitionError::ValidationError(msg) => anyhow::anyhow!("Workflow validation failed: {msg}"),
        other => anyhow::anyhow!("Failed to load {}: {other}", file.display()),
    })
}

// ---------------------------------------------------------------------------
// Create / Update
// ---------------------------------------------------------------------------

async fn handle_create(file: &Path, state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let spec = load_spec(file)?;
    let wf = state
        .workflow_service
        .create_workflow(user_id, spec)
        .await
        .context("Failed to create workflow")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wf)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Created workflow '{}'",
        style("*").green().bold(),
        style(&wf.name).cyan()
    );
    println!("  ID: {}", wf.id);
    println!("  Steps: {}", wf.steps.len());
    if let Some(ref schedule) = wf.schedule {
        println!("  Schedule: {schedule}");
    }
    println!();
    println!(
        "  Run it with: {}",
        style(format!("studyflow workflow run {}", wf.id)).dim()
    );
    println!();

    Ok(())
}

async fn handle_update(
    id: &Uuid,
    file: &Path,
    state: &AppState,
    user_id: &str,
    json: bool,
) -> Result<()> {
    let spec = load_spec(file)?;
    let wf = state
        .workflow_service
        .update_workflow(user_id, id, spec)
        .await
        .context("Failed to update workflow")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wf)?);
    } else {
        println!();
        println!(
            "  {} Updated workflow '{}' ({} steps)",
            style("*").green().bold(),
            style(&wf.name).cyan(),
            wf.steps.len()
        );
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// List / Show
// ---------------------------------------------------------------------------

async fn handle_list(state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let workflows = state
        .workflow_service
        .list_workflows(user_id)
        .await
        .context("Failed to list workflows")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
        return Ok(());
    }

    if workflows.is_empty() {
        println!();
        println!("  No workflows yet.");
        println!(
            "  Create one with: {}",
            style("studyflow workflow create <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Enabled"),
            Cell::new("Steps"),
            Cell::new("Schedule"),
            Cell::new("Last run"),
        ]);

    for wf in &workflows {
        let enabled = if wf.enabled {
            Cell::new("yes").fg(Color::Green)
        } else {
            Cell::new("no").fg(Color::DarkGrey)
        };
        let last_run = wf
            .last_run_at
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(short_id(&wf.id)),
            Cell::new(&wf.name),
            enabled,
            Cell::new(wf.steps.len()),
            Cell::new(wf.schedule.as_deref().unwrap_or("-")),
            Cell::new(last_run),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

async fn handle_show(id: &Uuid, state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let wf = state
        .workflow_service
        .get_workflow(user_id, id)
        .await
        .with_context(|| format!("Workflow {id}"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&wf)?);
        return Ok(());
    }

    println!();
    println!("  {} {}", style("Workflow:").bold(), style(&wf.name).cyan());
    println!("  ID: {}", wf.id);
    if let Some(ref description) = wf.description {
        println!("  Description: {description}");
    }
    println!("  Enabled: {}", wf.enabled);
    println!("  Schedule: {}", wf.schedule.as_deref().unwrap_or("-"));
    if let Some(timeout) = wf.timeout_secs {
        println!("  Timeout: {timeout}s");
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("#"),
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Type"),
            Cell::new("Retry"),
        ]);

    for (i, step) in wf.steps.iter().enumerate() {
        let retry = step
            .retry
            .as_ref()
            .map(|r| format!("{} attempts", r.max_attempts))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&step.name),
            Cell::new(step.kind.type_name()),
            Cell::new(retry),
        ]);
    }

    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Enable / Disable / Delete
// ---------------------------------------------------------------------------

async fn handle_toggle(
    id: &Uuid,
    enabled: bool,
    state: &AppState,
    user_id: &str,
    json: bool,
) -> Result<()> {
    let wf = state
        .workflow_service
        .set_enabled(user_id, id, enabled)
        .await
        .context("Failed to update workflow")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "id": wf.id, "enabled": wf.enabled }))?
        );
    } else {
        let verb = if enabled { "Enabled" } else { "Disabled" };
        println!();
        println!("  {} {verb} workflow '{}'", style("*").green().bold(), style(&wf.name).cyan());
        println!();
    }

    Ok(())
}

async fn handle_delete(id: &Uuid, state: &AppState, user_id: &str, json: bool) -> Result<()> {
    state
        .workflow_service
        .delete_workflow(user_id, id)
        .await
        .context("Failed to delete workflow")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "id": id, "deleted": true }))?
        );
    } else {
        println!();
        println!("  {} Deleted workflow {id}", style("*").green().bold());
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

async fn handle_run(id: Uuid, state: &AppState, user_id: &str, json: bool) -> Result<()> {
    if !json {
        println!();
        println!("  {} Running workflow {id} ...", style("*").cyan().bold());
    }

    let execution = state.interpreter.execute(id, user_id);
    tokio::pin!(execution);

    // Ctrl+C cancels the run so it is recorded as failed rather than left running.
    let outcome = tokio::select! {
        outcome = &mut execution => outcome,
        _ = tokio::signal::ctrl_c() => {
            for run_id in state.interpreter.active_runs() {
                let _ = state.interpreter.cancel(run_id).await;
            }
            execution.await
        }
    };

    let run = outcome.map_err(|e| anyhow::anyhow!("Workflow run failed: {e}"))?;
    display_run(&run, json)
}

async fn handle_runs(
    id: &Uuid,
    limit: u32,
    state: &AppState,
    user_id: &str,
    json: bool,
) -> Result<()> {
    let runs = state
        .workflow_service
        .list_runs(user_id, id, limit)
        .await
        .context("Failed to list runs")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(());
    }

    if runs.is_empty() {
        println!();
        println!("  No runs for workflow {id}.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Run ID").fg(Color::Cyan),
            Cell::new("Status"),
            Cell::new("Started"),
            Cell::new("Completed"),
            Cell::new("Error"),
        ]);

    for r in &runs {
        let completed = r
            .completed_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(r.id),
            format_status(r.status),
            Cell::new(r.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(completed),
            Cell::new(r.error.as_deref().unwrap_or("")),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

async fn handle_run_status(
    run_id: &Uuid,
    state: &AppState,
    user_id: &str,
    json: bool,
) -> Result<()> {
    let run = state
        .workflow_service
        .get_run(user_id, run_id)
        .await
        .with_context(|| format!("Run {run_id}"))?;
    display_run(&run, json)
}

fn display_run(run: &RunRecord, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(run)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Run {}",
        style("Workflow:").bold(),
        style(short_id(&run.id)).cyan()
    );
    println!("  Run ID: {}", run.id);
    println!("  Workflow: {}", run.workflow_id);
    let status = match run.status {
        RunStatus::Completed => style(run.status.as_str()).green(),
        RunStatus::Failed => style(run.status.as_str()).red(),
        RunStatus::Running => style(run.status.as_str()).blue(),
    };
    println!("  Status: {status}");
    println!("  Started: {}", run.started_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(completed) = run.completed_at {
        println!("  Completed: {}", completed.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(ref err) = run.error {
        println!("  Error: {}", style(err).red());
    }

    if let Some(steps) = run.result.as_ref().or(run.partial_result.as_ref()) {
        println!();
        for step in &steps.steps {
            println!("  {} {}", style("-").dim(), style(&step.step).bold());
            let rendered = serde_json::to_string_pretty(&step.result)?;
            for line in rendered.lines() {
                println!("      {line}");
            }
        }
    }
    println!();

    Ok(())
}
