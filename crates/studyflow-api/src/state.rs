//! Application state wiring all services together.
//!
//! AppState holds the concrete service instances used by both CLI and REST API.
//! Services are generic over repository traits; AppState pins them to the
//! SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use studyflow_core::llm::box_provider::BoxLlmProvider;
use studyflow_core::service::schedule::ScheduleService;
use studyflow_core::service::workflow::WorkflowService;
use studyflow_core::workflow::executor::{ExecutorSettings, StepInterpreter};
use studyflow_core::workflow::scheduler::TaskScheduler;
use studyflow_infra::config::{load_global_config, resolve_ai_api_key, resolve_data_dir};
use studyflow_infra::llm::openai_compat::config::gateway_config;
use studyflow_infra::llm::openai_compat::OpenAiCompatibleProvider;
use studyflow_infra::sqlite::pool::{database_url, DatabasePool};
use studyflow_infra::sqlite::schedule::SqliteScheduleRepository;
use studyflow_infra::sqlite::workflow::SqliteWorkflowRepository;
use studyflow_infra::workflow::execution_context::LiveExecutionContext;
use studyflow_types::config::GlobalConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcreteWorkflowService = WorkflowService<SqliteWorkflowRepository, SqliteScheduleRepository>;

pub type ConcreteScheduleService = ScheduleService<SqliteWorkflowRepository, SqliteScheduleRepository>;

pub type ConcreteInterpreter = StepInterpreter<SqliteWorkflowRepository>;

pub type ConcreteTaskScheduler = TaskScheduler<SqliteWorkflowRepository, SqliteScheduleRepository>;

/// Shared application state holding all services.
///
/// Used by both CLI commands and REST API handlers.
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<ConcreteWorkflowService>,
    pub schedule_service: Arc<ConcreteScheduleService>,
    pub interpreter: Arc<ConcreteInterpreter>,
    pub task_scheduler: Arc<ConcreteTaskScheduler>,
    pub config: Arc<GlobalConfig>,
    pub data_dir: PathBuf,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Initialize the application state in the resolved data directory.
    pub async fn init() -> anyhow::Result<Self> {
        Self::init_at(resolve_data_dir()).await
    }

    /// Connect to the database under `data_dir` and wire services.
    pub async fn init_at(data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create data directory {}", data_dir.display()))?;

        let config = load_global_config(&data_dir).await;

        let db_pool = DatabasePool::new(&database_url(&data_dir))
            .await
            .context("failed to open database")?;

        let workflow_repo = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let task_repo = Arc::new(SqliteScheduleRepository::new(db_pool.clone()));

        // Without a key the server still runs; ai_task steps fail individually.
        let provider = match resolve_ai_api_key(&config.ai) {
            Some(key) => Some(BoxLlmProvider::new(OpenAiCompatibleProvider::new(
                gateway_config(&config.ai, key),
            ))),
            None => {
                tracing::warn!(
                    env = %config.ai.api_key_env,
                    "AI gateway API key not set, ai_task steps will fail"
                );
                None
            }
        };

        let exec_ctx = LiveExecutionContext::new(
            &config.execution,
            provider,
            config.ai.system_prompt.clone(),
        )
        .context("failed to build HTTP client")?;

        let interpreter = Arc::new(StepInterpreter::new(
            Arc::clone(&workflow_repo),
            Arc::new(exec_ctx),
            ExecutorSettings::from(&config.execution),
        ));

        let task_scheduler = Arc::new(TaskScheduler::new(
            Arc::clone(&interpreter),
            Arc::clone(&task_repo),
        ));

        Ok(Self {
            workflow_service: Arc::new(WorkflowService::new(
                Arc::clone(&workflow_repo),
                Arc::clone(&task_repo),
            )),
            schedule_service: Arc::new(ScheduleService::new(workflow_repo, task_repo)),
            interpreter,
            task_scheduler,
            config: Arc::new(config),
            data_dir,
            db_pool,
        })
    }

    /// Fail runs left `running` by a previous process.
    pub async fn recover_interrupted_runs(&self) -> anyhow::Result<()> {
        let recovered = self
            .interpreter
            .recover_interrupted_runs()
            .await
            .context("failed to recover interrupted runs")?;
        if recovered > 0 {
            tracing::warn!(recovered, "marked interrupted runs as failed");
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) async fn test_state() -> (AppState, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::init_at(dir.path().to_path_buf()).await.unwrap();
    (state, dir)
}
