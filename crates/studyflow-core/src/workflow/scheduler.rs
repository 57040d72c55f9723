//! Scheduler trigger: finds due scheduled tasks and runs them.
//!
//! Provides:
//! - Schedule normalization (5/6/7-field cron and English shorthands)
//! - Next-run computation with `croner`, falling back to a fixed 24 hours
//! - [`TaskScheduler::run_pass`], one scan over due tasks with per-task
//!   failure isolation
//! - [`SchedulerDaemon`], which repeats passes on `tokio-cron-scheduler`

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tokio_cron_scheduler::{Job, JobScheduler};
use uuid::Uuid;

use studyflow_types::error::RepositoryError;
use studyflow_types::schedule::{ScheduledTask, TaskType};
use studyflow_types::usage::UsageEvent;

use crate::repository::schedule::ScheduleRepository;
use crate::repository::workflow::WorkflowRepository;

use super::executor::{StepInterpreter, WorkflowExecutor};

/// Offset used when a schedule expression cannot be evaluated.
pub const FALLBACK_INTERVAL_HOURS: i64 = 24;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Failed to create or manipulate the background job.
    #[error("scheduler error: {0}")]
    JobError(String),

    /// Invalid cron expression or schedule string.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Could not list due tasks.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),
}

// ---------------------------------------------------------------------------
// Schedule expressions
// ---------------------------------------------------------------------------

/// Normalize a schedule string to a 6-field (seconds-first) cron expression.
///
/// Supported patterns (case-insensitive):
/// - 5-field cron           -> "0 " prepended
/// - 6/7-field cron         -> unchanged
/// - "every N seconds"      -> "*/N * * * * *"
/// - "every N minutes"      -> "0 */N * * * *"
/// - "every N hours"        -> "0 0 */N * * *"
/// - "every minute" / "minutely"
/// - "every hour" / "hourly"
/// - "every day" / "daily"
/// - "every week" / "weekly"  -> Sundays at midnight
/// - "every day at HH:MM"   -> "0 MM HH * * *"
pub fn normalize_schedule(input: &str) -> Result<String, SchedulerError> {
    let trimmed = input.trim();

    // Shorthands have at most four words and all start with "every".
    let parts: Vec<&str> = trimmed.split_whitespace().collect();
    let cron_shaped = parts
        .first()
        .is_some_and(|first| !first.eq_ignore_ascii_case("every"));
    if cron_shaped {
        match parts.len() {
            5 => return Ok(format!("0 {trimmed}")),
            6 | 7 => return Ok(trimmed.to_string()),
            _ => {}
        }
    }

    let lower = trimmed.to_lowercase();

    match lower.as_str() {
        "every minute" | "minutely" => return Ok("0 * * * * *".to_string()),
        "every hour" | "hourly" => return Ok("0 0 * * * *".to_string()),
        "every day" | "daily" => return Ok("0 0 0 * * *".to_string()),
        "every week" | "weekly" => return Ok("0 0 0 * * SUN".to_string()),
        _ => {}
    }

    if let Some(rest) = lower.strip_prefix("every ") {
        if let Some(at_part) = rest.strip_prefix("day at ") {
            let (hour, minute) = at_part
                .split_once(':')
                .ok_or_else(|| SchedulerError::InvalidSchedule(input.to_string()))?;
            let hour: u32 = hour
                .trim()
                .parse()
                .map_err(|_| SchedulerError::InvalidSchedule(input.to_string()))?;
            let minute: u32 = minute
                .trim()
                .parse()
                .map_err(|_| SchedulerError::InvalidSchedule(input.to_string()))?;
            if hour < 24 && minute < 60 {
                return Ok(format!("0 {minute} {hour} * * *"));
            }
            return Err(SchedulerError::InvalidSchedule(input.to_string()));
        }

        let words: Vec<&str> = rest.split_whitespace().collect();
        if words.len() == 2 {
            let n: u32 = words[0]
                .parse()
                .map_err(|_| SchedulerError::InvalidSchedule(input.to_string()))?;
            if n == 0 {
                return Err(SchedulerError::InvalidSchedule(
                    "interval must be > 0".to_string(),
                ));
            }
            return match words[1].trim_end_matches('s') {
                "second" => Ok(format!("*/{n} * * * * *")),
                "minute" => Ok(format!("0 */{n} * * * *")),
                "hour" => Ok(format!("0 0 */{n} * * *")),
                _ => Err(SchedulerError::InvalidSchedule(input.to_string())),
            };
        }
    }

    Err(SchedulerError::InvalidSchedule(format!(
        "unrecognized schedule format: '{trimmed}'"
    )))
}

/// Parse a schedule into a `croner::Cron`.
fn parse_cron(schedule: &str) -> Result<croner::Cron, SchedulerError> {
    let expr = normalize_schedule(schedule)?;
    expr.parse::<croner::Cron>()
        .map_err(|e| SchedulerError::InvalidSchedule(format!("{schedule}: {e}")))
}

/// Check that a schedule is understood, without computing anything.
pub fn validate_schedule(schedule: &str) -> Result<(), SchedulerError> {
    parse_cron(schedule).map(|_| ())
}

/// The first occurrence of `schedule` strictly after `after`.
///
/// Falls back to `after + 24h` when the expression cannot be evaluated, so a
/// bad stored schedule degrades to a daily task instead of a hot loop.
pub fn next_run_after(schedule: &str, after: DateTime<Utc>) -> DateTime<Utc> {
    let next = parse_cron(schedule)
        .ok()
        .and_then(|cron| cron.iter_after(after).next());

    match next {
        Some(next) => next,
        None => {
            tracing::warn!(
                schedule,
                "could not evaluate schedule, falling back to {FALLBACK_INTERVAL_HOURS}h"
            );
            after + chrono::Duration::hours(FALLBACK_INTERVAL_HOURS)
        }
    }
}

// ---------------------------------------------------------------------------
// TaskScheduler
// ---------------------------------------------------------------------------

/// Runs due scheduled tasks. Workflow tasks go through the step interpreter
/// as the task's owner.
pub struct TaskScheduler<R: WorkflowRepository, S: ScheduleRepository> {
    interpreter: Arc<StepInterpreter<R>>,
    tasks: Arc<S>,
    /// Held for the duration of a pass so daemon ticks never overlap.
    pass_lock: Mutex<()>,
}

impl<R: WorkflowRepository + 'static, S: ScheduleRepository + 'static> TaskScheduler<R, S> {
    pub fn new(interpreter: Arc<StepInterpreter<R>>, tasks: Arc<S>) -> Self {
        Self {
            interpreter,
            tasks,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run every task due at `now`. Returns the number of tasks attempted,
    /// whether or not they succeeded.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let _guard = self.pass_lock.lock().await;
        self.run_due_tasks(now).await
    }

    /// Like [`run_pass`](Self::run_pass), but skips instead of waiting when a
    /// pass is already in progress. Returns `None` when skipped.
    pub async fn try_run_pass(
        &self,
        now: DateTime<Utc>,
    ) -> Option<Result<usize, SchedulerError>> {
        let _guard = self.pass_lock.try_lock().ok()?;
        Some(self.run_due_tasks(now).await)
    }

    async fn run_due_tasks(&self, now: DateTime<Utc>) -> Result<usize, SchedulerError> {
        let due = self.tasks.list_due_tasks(now).await?;
        if due.is_empty() {
            tracing::debug!("no scheduled tasks due");
            return Ok(0);
        }

        tracing::info!(count = due.len(), "running due scheduled tasks");

        for task in &due {
            let result = match self.run_task(task).await {
                Ok(result) => {
                    tracing::info!(task_id = %task.id, task = %task.name, task_type = %task.task_type, "scheduled task completed");
                    result
                }
                Err(message) => {
                    tracing::error!(task_id = %task.id, task = %task.name, error = %message, "scheduled task failed");
                    json!({ "error": message })
                }
            };

            let ran_at = Utc::now();
            let next_run_at = next_run_after(&task.schedule, ran_at);
            let usage = UsageEvent::scheduled_task(&task.user_id, task.id, task.task_type, result);

            if let Err(e) = self
                .tasks
                .record_task_run(&task.id, ran_at, next_run_at, &usage)
                .await
            {
                tracing::error!(task_id = %task.id, error = %e, "failed to record scheduled task run");
            }
        }

        Ok(due.len())
    }

    async fn run_task(&self, task: &ScheduledTask) -> Result<Value, String> {
        match task.task_type {
            TaskType::Workflow => {
                let workflow_id = task
                    .workflow_id()
                    .ok_or_else(|| "task has no workflow_id parameter".to_string())?;
                let run = self
                    .interpreter
                    .execute(workflow_id, &task.user_id)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok(json!({
                    "workflow_id": workflow_id,
                    "run_id": run.id,
                    "status": run.status,
                }))
            }
            TaskType::Reminder => Ok(placeholder("Reminder sent", &task.parameters)),
            TaskType::DataSync => Ok(placeholder("Data synced", &task.parameters)),
            TaskType::Unknown => Ok(json!({ "error": "Unknown task type" })),
        }
    }
}

/// `{"message": message}` with the task parameters merged over it.
fn placeholder(message: &str, parameters: &Value) -> Value {
    let mut out = serde_json::Map::new();
    out.insert("message".to_string(), json!(message));
    if let Some(params) = parameters.as_object() {
        for (key, value) in params {
            out.insert(key.clone(), value.clone());
        }
    }
    Value::Object(out)
}

// ---------------------------------------------------------------------------
// SchedulerDaemon
// ---------------------------------------------------------------------------

/// Repeats scheduler passes on a fixed interval using
/// `tokio-cron-scheduler::JobScheduler`.
pub struct SchedulerDaemon {
    inner: RwLock<Option<JobScheduler>>,
    job_id: RwLock<Option<Uuid>>,
}

impl SchedulerDaemon {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
            job_id: RwLock::new(None),
        }
    }

    /// Start repeating passes every `interval`.
    pub async fn start<R, S>(
        &self,
        scheduler: Arc<TaskScheduler<R, S>>,
        interval: Duration,
    ) -> Result<(), SchedulerError>
    where
        R: WorkflowRepository + 'static,
        S: ScheduleRepository + 'static,
    {
        let job_scheduler = JobScheduler::new()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
            let scheduler = Arc::clone(&scheduler);
            Box::pin(async move {
                match scheduler.try_run_pass(Utc::now()).await {
                    Some(Ok(attempted)) => {
                        tracing::debug!(attempted, "scheduler pass finished");
                    }
                    Some(Err(e)) => tracing::error!(error = %e, "scheduler pass failed"),
                    None => tracing::debug!("previous scheduler pass still running, skipping tick"),
                }
            })
        })
        .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        let job_id = job_scheduler
            .add(job)
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        job_scheduler
            .start()
            .await
            .map_err(|e| SchedulerError::JobError(e.to_string()))?;

        *self.inner.write().await = Some(job_scheduler);
        *self.job_id.write().await = Some(job_id);

        tracing::info!(interval_secs = interval.as_secs(), "scheduler daemon started");
        Ok(())
    }

    /// Stop the daemon. A pass already in flight is not interrupted.
    pub async fn stop(&self) -> Result<(), SchedulerError> {
        if let Some(mut scheduler) = self.inner.write().await.take() {
            scheduler
                .shutdown()
                .await
                .map_err(|e| SchedulerError::JobError(e.to_string()))?;
            tracing::info!("scheduler daemon stopped");
        }
        self.job_id.write().await.take();
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        self.job_id.read().await.is_some()
    }
}

impl Default for SchedulerDaemon {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::executor::ExecutorSettings;
    use crate::workflow::test_support::{InMemoryRepo, ScriptedContext, sample_workflow};
    use chrono::TimeZone;
    use studyflow_types::workflow::{RunStatus, StepKind};

    // -------------------------------------------------------------------
    // normalize_schedule
    // -------------------------------------------------------------------

    #[test]
    fn normalize_five_field_cron() {
        assert_eq!(normalize_schedule("*/5 * * * *").unwrap(), "0 */5 * * * *");
        assert_eq!(normalize_schedule("0 7 * * 1-5").unwrap(), "0 0 7 * * 1-5");
    }

    #[test]
    fn normalize_six_field_cron_unchanged() {
        assert_eq!(normalize_schedule("30 0 9 * * MON").unwrap(), "30 0 9 * * MON");
    }

    #[test]
    fn lowercase_cron_names_are_cron() {
        assert_eq!(normalize_schedule("0 9 * * mon").unwrap(), "0 0 9 * * mon");
        assert_eq!(normalize_schedule("0 8 1 jan *").unwrap(), "0 0 8 1 jan *");
        assert!(validate_schedule("0 9 * * mon").is_ok());
        assert!(validate_schedule("0 9 * * mon-fri").is_ok());
    }

    #[test]
    fn normalize_shorthands() {
        assert_eq!(normalize_schedule("hourly").unwrap(), "0 0 * * * *");
        assert_eq!(normalize_schedule("Daily").unwrap(), "0 0 0 * * *");
        assert_eq!(normalize_schedule("weekly").unwrap(), "0 0 0 * * SUN");
        assert_eq!(normalize_schedule("every 15 minutes").unwrap(), "0 */15 * * * *");
        assert_eq!(normalize_schedule("every 2 hours").unwrap(), "0 0 */2 * * *");
        assert_eq!(normalize_schedule("every 30 seconds").unwrap(), "*/30 * * * * *");
        assert_eq!(normalize_schedule("every day at 07:30").unwrap(), "0 30 7 * * *");
    }

    #[test]
    fn normalize_rejects_garbage() {
        assert!(normalize_schedule("whenever").is_err());
        assert!(normalize_schedule("every 0 minutes").is_err());
        assert!(normalize_schedule("every day at 25:00").is_err());
        assert!(normalize_schedule("every 3 fortnights").is_err());
    }

    // -------------------------------------------------------------------
    // next_run_after
    // -------------------------------------------------------------------

    #[test]
    fn next_run_follows_cron() {
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 6, 15, 0).unwrap();
        let next = next_run_after("0 7 * * *", after);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap());

        let next = next_run_after("every 15 minutes", after);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 2, 6, 30, 0).unwrap());
    }

    #[test]
    fn next_run_is_strictly_after() {
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 7, 0, 0).unwrap();
        let next = next_run_after("0 7 * * *", after);
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 3, 7, 0, 0).unwrap());
    }

    #[test]
    fn next_run_falls_back_to_a_day() {
        let after = Utc.with_ymd_and_hms(2026, 3, 2, 6, 15, 0).unwrap();
        let next = next_run_after("not a schedule", after);
        assert_eq!(next, after + chrono::Duration::hours(24));
    }

    #[test]
    fn placeholder_merges_parameters() {
        let out = placeholder("Reminder sent", &json!({"course": "cs101"}));
        assert_eq!(out, json!({"message": "Reminder sent", "course": "cs101"}));

        let out = placeholder("Data synced", &Value::Null);
        assert_eq!(out, json!({"message": "Data synced"}));
    }

    // -------------------------------------------------------------------
    // run_pass
    // -------------------------------------------------------------------

    fn make_scheduler(
        repo: Arc<InMemoryRepo>,
        ctx: Arc<ScriptedContext>,
    ) -> TaskScheduler<InMemoryRepo, InMemoryRepo> {
        let interpreter = Arc::new(StepInterpreter::new(
            Arc::clone(&repo),
            ctx,
            ExecutorSettings::default(),
        ));
        TaskScheduler::new(interpreter, repo)
    }

    fn workflow_task(user: &str, workflow_id: Uuid) -> ScheduledTask {
        ScheduledTask::new(
            user,
            "run workflow",
            TaskType::Workflow,
            "daily",
            json!({ "workflow_id": workflow_id.to_string() }),
        )
    }

    #[tokio::test]
    async fn pass_attempts_every_due_task_even_when_one_fails() {
        let repo = Arc::new(InMemoryRepo::default());
        let ctx = Arc::new(ScriptedContext::new().with_api_results(vec![Err(
            crate::workflow::step_runner::StepError::Transient("connection refused".to_string()),
        )]));

        let failing = sample_workflow(
            "alice",
            vec![(
                "Fetch",
                StepKind::ApiCall {
                    url: "https://lms.example.edu/api".to_string(),
                    method: "GET".to_string(),
                    headers: None,
                    body: None,
                },
            )],
        );
        let healthy = sample_workflow(
            "alice",
            vec![(
                "Summarize",
                StepKind::AiTask {
                    model: None,
                    system_prompt: None,
                    prompt: "Summarize: X".to_string(),
                },
            )],
        );
        repo.insert_workflow(failing.clone());
        repo.insert_workflow(healthy.clone());
        let failing_task = workflow_task("alice", failing.id);
        let healthy_task = workflow_task("alice", healthy.id);
        repo.insert_task(failing_task.clone());
        repo.insert_task(healthy_task.clone());

        let scheduler = make_scheduler(Arc::clone(&repo), ctx);
        let attempted = scheduler.run_pass(Utc::now()).await.unwrap();
        assert_eq!(attempted, 2);

        let runs = repo.all_runs();
        assert_eq!(runs.len(), 2);
        let failed = runs.iter().find(|r| r.workflow_id == failing.id).unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        let completed = runs.iter().find(|r| r.workflow_id == healthy.id).unwrap();
        assert_eq!(completed.status, RunStatus::Completed);

        // Both tasks advanced, so neither is due again right away.
        for id in [failing_task.id, healthy_task.id] {
            let task = repo.task(&id).unwrap();
            assert!(task.last_run_at.is_some());
            assert!(task.next_run_at.unwrap() > Utc::now());
        }

        let usage = repo.usage_events();
        let task_events: Vec<_> = usage
            .iter()
            .filter(|e| e.action_type == "scheduled_task")
            .collect();
        assert_eq!(task_events.len(), 2);
        assert!(
            task_events
                .iter()
                .any(|e| e.metadata["result"]["error"].as_str().is_some())
        );
    }

    #[tokio::test]
    async fn placeholder_task_types() {
        let repo = Arc::new(InMemoryRepo::default());
        let reminder = ScheduledTask::new(
            "bob",
            "study reminder",
            TaskType::Reminder,
            "daily",
            json!({"note": "flashcards"}),
        );
        let mut unknown = ScheduledTask::new("bob", "mystery", TaskType::Unknown, "daily", json!({}));
        unknown.next_run_at = Some(Utc::now() - chrono::Duration::minutes(1));
        repo.insert_task(reminder.clone());
        repo.insert_task(unknown.clone());

        let scheduler = make_scheduler(Arc::clone(&repo), Arc::new(ScriptedContext::new()));
        assert_eq!(scheduler.run_pass(Utc::now()).await.unwrap(), 2);

        let usage = repo.usage_events();
        let reminder_event = usage
            .iter()
            .find(|e| e.metadata["task_id"] == json!(reminder.id))
            .unwrap();
        assert_eq!(reminder_event.metadata["result"]["message"], "Reminder sent");
        assert_eq!(reminder_event.metadata["result"]["note"], "flashcards");

        let unknown_event = usage
            .iter()
            .find(|e| e.metadata["task_id"] == json!(unknown.id))
            .unwrap();
        assert_eq!(unknown_event.metadata["result"]["error"], "Unknown task type");
    }

    #[tokio::test]
    async fn tasks_not_yet_due_or_disabled_are_skipped() {
        let repo = Arc::new(InMemoryRepo::default());
        let mut later = ScheduledTask::new("bob", "later", TaskType::Reminder, "daily", json!({}));
        later.next_run_at = Some(Utc::now() + chrono::Duration::hours(1));
        let mut disabled = ScheduledTask::new("bob", "off", TaskType::Reminder, "daily", json!({}));
        disabled.enabled = false;
        repo.insert_task(later);
        repo.insert_task(disabled);

        let scheduler = make_scheduler(Arc::clone(&repo), Arc::new(ScriptedContext::new()));
        assert_eq!(scheduler.run_pass(Utc::now()).await.unwrap(), 0);
        assert!(repo.usage_events().is_empty());
    }

    #[tokio::test]
    async fn workflow_task_runs_as_task_owner() {
        let repo = Arc::new(InMemoryRepo::default());
        let ctx = Arc::new(ScriptedContext::new());
        let workflow = sample_workflow("alice", vec![("Wait", StepKind::Delay { duration: 1 })]);
        repo.insert_workflow(workflow.clone());
        // Owned by someone else: the interpreter must treat it as not found.
        repo.insert_task(workflow_task("mallory", workflow.id));

        let scheduler = make_scheduler(Arc::clone(&repo), ctx.clone());
        assert_eq!(scheduler.run_pass(Utc::now()).await.unwrap(), 1);

        assert!(repo.all_runs().is_empty());
        assert_eq!(ctx.delay_calls(), 0);
        let usage = repo.usage_events();
        assert_eq!(usage[0].metadata["result"]["error"], "workflow not found");
    }

    #[tokio::test]
    async fn daemon_start_and_stop() {
        let repo = Arc::new(InMemoryRepo::default());
        let scheduler = Arc::new(make_scheduler(
            Arc::clone(&repo),
            Arc::new(ScriptedContext::new()),
        ));

        let daemon = SchedulerDaemon::new();
        assert!(!daemon.is_running().await);
        daemon
            .start(scheduler, Duration::from_secs(60))
            .await
            .unwrap();
        assert!(daemon.is_running().await);
        daemon.stop().await.unwrap();
        assert!(!daemon.is_running().await);
    }
}
