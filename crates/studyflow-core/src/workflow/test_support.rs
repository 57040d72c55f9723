//! In-memory repository and scripted execution context shared by the
//! interpreter, scheduler and service tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use studyflow_types::error::RepositoryError;
use studyflow_types::schedule::ScheduledTask;
use studyflow_types::usage::UsageEvent;
use studyflow_types::workflow::{
    RunOutcome, RunRecord, RunResult, RunStatus, StepDefinition, StepKind, Workflow,
};

use crate::repository::schedule::ScheduleRepository;
use crate::repository::workflow::WorkflowRepository;

use super::step_runner::{StepError, StepExecutionContext, StepFuture};

pub fn sample_workflow(user_id: &str, steps: Vec<(&str, StepKind)>) -> Workflow {
    let now = Utc::now();
    Workflow {
        id: Uuid::now_v7(),
        user_id: user_id.to_string(),
        name: "Morning digest".to_string(),
        description: None,
        enabled: true,
        schedule: None,
        timeout_secs: None,
        steps: steps
            .into_iter()
            .map(|(name, kind)| StepDefinition {
                name: name.to_string(),
                kind,
                timeout_secs: None,
                retry: None,
            })
            .collect(),
        last_run_at: None,
        created_at: now,
        updated_at: now,
    }
}

// ---------------------------------------------------------------------------
// InMemoryRepo
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryRepo {
    workflows: Mutex<HashMap<Uuid, Workflow>>,
    runs: Mutex<Vec<RunRecord>>,
    tasks: Mutex<HashMap<Uuid, ScheduledTask>>,
    usage: Mutex<Vec<UsageEvent>>,
    fail_finishing: AtomicBool,
}

impl InMemoryRepo {
    pub fn insert_workflow(&self, workflow: Workflow) {
        self.workflows.lock().unwrap().insert(workflow.id, workflow);
    }

    pub fn insert_task(&self, task: ScheduledTask) {
        self.tasks.lock().unwrap().insert(task.id, task);
    }

    pub fn insert_run(&self, run: RunRecord) {
        self.runs.lock().unwrap().push(run);
    }

    pub fn workflow(&self, id: &Uuid) -> Option<Workflow> {
        self.workflows.lock().unwrap().get(id).cloned()
    }

    pub fn task(&self, id: &Uuid) -> Option<ScheduledTask> {
        self.tasks.lock().unwrap().get(id).cloned()
    }

    pub fn run(&self, id: &Uuid) -> Option<RunRecord> {
        self.runs.lock().unwrap().iter().find(|r| r.id == *id).cloned()
    }

    pub fn all_runs(&self) -> Vec<RunRecord> {
        self.runs.lock().unwrap().clone()
    }

    pub fn usage_events(&self) -> Vec<UsageEvent> {
        self.usage.lock().unwrap().clone()
    }

    /// Make `complete_run` and `fail_run` return a query error.
    pub fn fail_finishing_writes(&self) {
        self.fail_finishing.store(true, Ordering::SeqCst);
    }

    fn finish(
        &self,
        run_id: &Uuid,
        outcome: RunOutcome,
        at: DateTime<Utc>,
    ) -> Result<RunRecord, RepositoryError> {
        if self.fail_finishing.load(Ordering::SeqCst) {
            return Err(RepositoryError::Query("disk I/O error".to_string()));
        }
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .iter_mut()
            .find(|r| r.id == *run_id)
            .ok_or(RepositoryError::NotFound)?;
        if run.status != RunStatus::Running {
            return Err(RepositoryError::Conflict(format!(
                "run {run_id} is already {}",
                run.status
            )));
        }
        outcome.apply_to(run, at);
        Ok(run.clone())
    }
}

impl WorkflowRepository for InMemoryRepo {
    async fn save_workflow(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.insert_workflow(workflow.clone());
        Ok(())
    }

    async fn get_workflow(&self, id: &Uuid) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.workflow(id))
    }

    async fn list_workflows(&self, user_id: &str) -> Result<Vec<Workflow>, RepositoryError> {
        let mut list: Vec<_> = self
            .workflows
            .lock()
            .unwrap()
            .values()
            .filter(|w| w.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }

    async fn delete_workflow(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        let existed = self.workflows.lock().unwrap().remove(id).is_some();
        if existed {
            self.tasks
                .lock()
                .unwrap()
                .retain(|_, t| t.workflow_id() != Some(*id));
        }
        Ok(existed)
    }

    async fn create_run(&self, run: &RunRecord) -> Result<(), RepositoryError> {
        self.insert_run(run.clone());
        Ok(())
    }

    async fn complete_run(
        &self,
        run_id: &Uuid,
        result: &RunResult,
        completed_at: DateTime<Utc>,
        usage: &UsageEvent,
    ) -> Result<(), RepositoryError> {
        let run = self.finish(run_id, RunOutcome::Completed(result.clone()), completed_at)?;
        if let Some(wf) = self.workflows.lock().unwrap().get_mut(&run.workflow_id) {
            wf.last_run_at = Some(completed_at);
        }
        self.usage.lock().unwrap().push(usage.clone());
        Ok(())
    }

    async fn fail_run(
        &self,
        run_id: &Uuid,
        error: &str,
        partial: &RunResult,
        failed_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        self.finish(
            run_id,
            RunOutcome::Failed {
                error: error.to_string(),
                partial: partial.clone(),
            },
            failed_at,
        )?;
        Ok(())
    }

    async fn get_run(&self, run_id: &Uuid) -> Result<Option<RunRecord>, RepositoryError> {
        Ok(self.run(run_id))
    }

    async fn list_runs(
        &self,
        workflow_id: &Uuid,
        limit: u32,
    ) -> Result<Vec<RunRecord>, RepositoryError> {
        let mut runs: Vec<_> = self
            .all_runs()
            .into_iter()
            .filter(|r| r.workflow_id == *workflow_id)
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn list_running_runs(&self) -> Result<Vec<RunRecord>, RepositoryError> {
        Ok(self
            .all_runs()
            .into_iter()
            .filter(|r| r.status == RunStatus::Running)
            .collect())
    }
}

impl ScheduleRepository for InMemoryRepo {
    async fn save_task(&self, task: &ScheduledTask) -> Result<(), RepositoryError> {
        self.insert_task(task.clone());
        Ok(())
    }

    async fn get_task(&self, id: &Uuid) -> Result<Option<ScheduledTask>, RepositoryError> {
        Ok(self.task(id))
    }

    async fn list_tasks(
        &self,
        user_id: Option<&str>,
    ) -> Result<Vec<ScheduledTask>, RepositoryError> {
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| user_id.is_none_or(|u| t.user_id == u))
            .cloned()
            .collect())
    }

    async fn delete_task(&self, id: &Uuid) -> Result<bool, RepositoryError> {
        Ok(self.tasks.lock().unwrap().remove(id).is_some())
    }

    async fn list_due_tasks(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTask>, RepositoryError> {
        let mut due: Vec<_> = self
            .tasks
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.is_due(now))
            .cloned()
            .collect();
        due.sort_by_key(|t| t.next_run_at);
        Ok(due)
    }

    async fn record_task_run(
        &self,
        task_id: &Uuid,
        ran_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
        usage: &UsageEvent,
    ) -> Result<(), RepositoryError> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks.get_mut(task_id).ok_or(RepositoryError::NotFound)?;
        task.last_run_at = Some(ran_at);
        task.next_run_at = Some(next_run_at);
        self.usage.lock().unwrap().push(usage.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedContext
// ---------------------------------------------------------------------------

/// Execution context with canned responses and call counters.
///
/// `api_call` results are consumed in order; once the script runs out every
/// call succeeds with `{"ok": true}`.
pub struct ScriptedContext {
    ai_result: Result<Value, StepError>,
    ai_latency: Option<Duration>,
    api_results: Mutex<VecDeque<Result<Value, StepError>>>,
    ai_calls: AtomicUsize,
    api_calls: AtomicUsize,
    delay_calls: AtomicUsize,
}

impl ScriptedContext {
    pub fn new() -> Self {
        Self {
            ai_result: Ok(json!("completion")),
            ai_latency: None,
            api_results: Mutex::new(VecDeque::new()),
            ai_calls: AtomicUsize::new(0),
            api_calls: AtomicUsize::new(0),
            delay_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_ai(mut self, result: Result<Value, StepError>) -> Self {
        self.ai_result = result;
        self
    }

    pub fn with_ai_latency(mut self, latency: Duration) -> Self {
        self.ai_latency = Some(latency);
        self
    }

    pub fn with_api_results(self, results: Vec<Result<Value, StepError>>) -> Self {
        *self.api_results.lock().unwrap() = results.into();
        self
    }

    pub fn ai_calls(&self) -> usize {
        self.ai_calls.load(Ordering::SeqCst)
    }

    pub fn api_calls(&self) -> usize {
        self.api_calls.load(Ordering::SeqCst)
    }

    pub fn delay_calls(&self) -> usize {
        self.delay_calls.load(Ordering::SeqCst)
    }
}

impl StepExecutionContext for ScriptedContext {
    fn execute_ai_task(
        &self,
        _model: Option<&str>,
        _system_prompt: Option<&str>,
        _prompt: &str,
    ) -> StepFuture<'_> {
        Box::pin(async move {
            self.ai_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.ai_latency {
                tokio::time::sleep(latency).await;
            }
            self.ai_result.clone()
        })
    }

    fn execute_api_call(
        &self,
        _method: &str,
        _url: &str,
        _headers: Option<&HashMap<String, String>>,
        _body: Option<&Value>,
    ) -> StepFuture<'_> {
        Box::pin(async move {
            self.api_calls.fetch_add(1, Ordering::SeqCst);
            self.api_results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(json!({"ok": true})))
        })
    }

    fn execute_delay(&self, duration_ms: u64) -> StepFuture<'_> {
        Box::pin(async move {
            self.delay_calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(duration_ms)).await;
            Ok(json!({ "delayed": duration_ms }))
        })
    }
}
