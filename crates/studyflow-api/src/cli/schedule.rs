//! CLI scheduled task subcommands.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use comfy_table::{presets, Cell, Color, ContentArrangement, Table};
use console::style;
use serde_json::{json, Value};
use uuid::Uuid;

use studyflow_core::service::schedule::NewTask;
use studyflow_types::schedule::TaskType;

use crate::cli::short_id;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum ScheduleCommand {
    /// Add a scheduled task.
    Add {
        /// Task name.
        name: String,

        /// Task type: workflow, reminder or data_sync.
        #[arg(long = "type")]
        task_type: TaskType,

        /// Cron expression or shorthand ("daily", "every 15 minutes", ...).
        #[arg(long)]
        cron: String,

        /// Workflow to run (workflow tasks only).
        #[arg(long)]
        workflow: Option<Uuid>,

        /// Task parameters as a JSON object.
        #[arg(long)]
        params: Option<String>,

        /// Optional description.
        #[arg(long)]
        description: Option<String>,
    },

    /// List your scheduled tasks.
    #[command(alias = "ls")]
    List,

    /// Remove a scheduled task.
    #[command(alias = "rm")]
    Remove {
        /// Task ID.
        id: Uuid,
    },

    /// Run one scheduler pass now (all due tasks, every user).
    RunOnce,
}

pub async fn handle_schedule_command(
    cmd: ScheduleCommand,
    state: &AppState,
    user_id: &str,
    json: bool,
) -> Result<()> {
    match cmd {
        ScheduleCommand::Add {
            name,
            task_type,
            cron,
            workflow,
            params,
            description,
        } => {
            let parameters = build_parameters(params.as_deref(), workflow)?;
            let new = NewTask {
                name,
                description,
                task_type,
                schedule: cron,
                parameters,
            };
            handle_add(new, state, user_id, json).await
        }
        ScheduleCommand::List => handle_list(state, user_id, json).await,
        ScheduleCommand::Remove { id } => handle_remove(&id, state, user_id, json).await,
        ScheduleCommand::RunOnce => handle_run_once(state, json).await,
    }
}

/// Merge `--params` JSON with `--workflow` into the task parameters.
fn build_parameters(params: Option<&str>, workflow: Option<Uuid>) -> Result<Value> {
    let mut parameters = match params {
        Some(raw) => serde_json::from_str::<Value>(raw).context("Invalid --params JSON")?,
        None => json!({}),
    };

    if let Some(workflow_id) = workflow {
        let object = parameters
            .as_object_mut()
            .context("--params must be a JSON object")?;
        object.insert("workflow_id".to_string(), json!(workflow_id));
    }

    Ok(parameters)
}

async fn handle_add(new: NewTask, state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let task = state
        .schedule_service
        .add_task(user_id, new)
        .await
        .context("Failed to add scheduled task")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&task)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} Scheduled '{}' ({})",
        style("*").green().bold(),
        style(&task.name).cyan(),
        task.task_type
    );
    println!("  ID: {}", task.id);
    if let Some(next) = task.next_run_at {
        println!("  Next run: {}", next.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    println!();

    Ok(())
}

async fn handle_list(state: &AppState, user_id: &str, json: bool) -> Result<()> {
    let tasks = state
        .schedule_service
        .list_tasks(user_id)
        .await
        .context("Failed to list scheduled tasks")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&tasks)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!();
        println!("  No scheduled tasks.");
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
            Cell::new("Type"),
            Cell::new("Schedule"),
            Cell::new("Enabled"),
            Cell::new("Next run"),
            Cell::new("Last run"),
        ]);

    let fmt = |t: Option<chrono::DateTime<Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "-".to_string())
    };

    for task in &tasks {
        table.add_row(vec![
            Cell::new(short_id(&task.id)),
            Cell::new(&task.name),
            Cell::new(task.task_type),
            Cell::new(&task.schedule),
            Cell::new(if task.enabled { "yes" } else { "no" }),
            Cell::new(fmt(task.next_run_at)),
            Cell::new(fmt(task.last_run_at)),
        ]);
    }

    println!();
    println!("{table}");
    println!();

    Ok(())
}

async fn handle_remove(id: &Uuid, state: &AppState, user_id: &str, json: bool) -> Result<()> {
    state
        .schedule_service
        .remove_task(user_id, id)
        .await
        .context("Failed to remove scheduled task")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&json!({ "id": id, "removed": true }))?);
    } else {
        println!();
        println!("  {} Removed scheduled task {id}", style("*").green().bold());
        println!();
    }

    Ok(())
}

async fn handle_run_once(state: &AppState, json: bool) -> Result<()> {
    let tasks_run = state
        .task_scheduler
        .run_pass(Utc::now())
        .await
        .context("Scheduler pass failed")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "success": true, "tasks_run": tasks_run }))?
        );
    } else {
        println!();
        println!("  {} Ran {tasks_run} due task(s)", style("*").green().bold());
        println!();
    }

    Ok(())
}
