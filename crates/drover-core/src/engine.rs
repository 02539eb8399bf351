// Orchestration Engine
// Owns the task registry and drives every submitted task through the two
// phases, updating the registry on each transition.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use drover_observability::{emit_event, ObservabilityEvent, ProcessKind};
use drover_runtime::{LogSink, ProcessOutcome};
use drover_types::{TaskErrorKind, TaskRecord, TaskStatus};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::phase::{Phase, PhaseRunner};
use crate::registry::TaskRegistry;
use crate::workspace::Workspace;

/// Terminal verdict of one task's phase sequence.
enum TaskVerdict {
    Completed { pr_url: Option<String> },
    Failed { kind: TaskErrorKind, message: String },
}

/// Cloneable engine handle. One instance per process; each submitted task is
/// driven by its own spawned flow, and that flow is the only writer of the
/// task's record.
#[derive(Clone)]
pub struct OrchestrationEngine {
    config: Arc<EngineConfig>,
    registry: TaskRegistry,
}

impl OrchestrationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: TaskRegistry::new(),
        }
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Register a new task and return its `running` record immediately; the
    /// phases run in a spawned flow. Identifiers are never reused: each
    /// submission allocates a fresh UUID.
    ///
    /// Nothing here touches the filesystem, so submission cannot fail;
    /// workspace-creation failures surface later as `failed`/`unknown` on
    /// the record itself.
    pub async fn submit(&self, prompt: String) -> TaskRecord {
        let id = Uuid::new_v4().to_string();
        let log_file = self.config.task_log_path(&id).display().to_string();
        let record = TaskRecord::new(id.clone(), prompt.clone(), log_file);
        self.registry.insert(record.clone()).await;

        tracing::info!(task_id = %id, "task submitted");
        let engine = self.clone();
        tokio::spawn(async move {
            engine.drive(id, prompt).await;
        });

        record
    }

    /// Drive one task to a terminal state. Every error is captured into this
    /// task's record; nothing propagates out of the spawned flow.
    async fn drive(&self, id: String, prompt: String) {
        let verdict = self.run_phases(&id, &prompt).await;

        let Some(mut record) = self.registry.get(&id).await else {
            // The registry never drops records while the process lives.
            tracing::error!(task_id = %id, "task record vanished mid-flight");
            return;
        };
        record.finished = Some(Utc::now());

        match verdict {
            Ok(TaskVerdict::Completed { pr_url }) => {
                record.status = TaskStatus::Completed;
                record.pr_url = pr_url;
                emit_event(
                    tracing::Level::INFO,
                    ProcessKind::Engine,
                    ObservabilityEvent {
                        event: "task.completed",
                        component: "core.engine",
                        task_id: Some(id.as_str()),
                        phase: None,
                        status: Some("completed"),
                        detail: record.pr_url.as_deref(),
                    },
                );
            }
            Ok(TaskVerdict::Failed { kind, message }) => {
                record.status = TaskStatus::Failed;
                record.error_type = Some(kind);
                record.error = Some(message.clone());
                emit_event(
                    tracing::Level::WARN,
                    ProcessKind::Engine,
                    ObservabilityEvent {
                        event: "task.failed",
                        component: "core.engine",
                        task_id: Some(id.as_str()),
                        phase: None,
                        status: Some("failed"),
                        detail: Some(message.as_str()),
                    },
                );
            }
            Err(e) => {
                let message = e.to_string();
                record.status = TaskStatus::Failed;
                record.error_type = Some(TaskErrorKind::Unknown);
                record.error = Some(message.clone());
                emit_event(
                    tracing::Level::ERROR,
                    ProcessKind::Engine,
                    ObservabilityEvent {
                        event: "task.failed",
                        component: "core.engine",
                        task_id: Some(id.as_str()),
                        phase: None,
                        status: Some("failed"),
                        detail: Some(message.as_str()),
                    },
                );
            }
        }

        self.registry.update(record).await;
    }

    async fn run_phases(&self, id: &str, prompt: &str) -> Result<TaskVerdict> {
        let workspace = Workspace::create(&self.config.tasks_root(), id)?;
        let sink = LogSink::open(workspace.log_path()).await?;
        let runner = PhaseRunner::new(&self.config, &workspace, &sink);

        match runner.run_discovery(prompt).await? {
            ProcessOutcome::Ok => {}
            outcome => return Ok(failure(Phase::Discovery, outcome, &self.config)),
        }

        let (outcome, pr_url) = runner.run_execution(prompt).await?;
        match outcome {
            ProcessOutcome::Ok => {
                // The clone served its purpose; the log stays for inspection.
                workspace.remove_repo_dir();
                Ok(TaskVerdict::Completed { pr_url })
            }
            outcome => Ok(failure(Phase::Execution, outcome, &self.config)),
        }
    }
}

/// Map a non-Ok supervisor outcome onto the task failure taxonomy.
fn failure(phase: Phase, outcome: ProcessOutcome, config: &EngineConfig) -> TaskVerdict {
    let (kind, message) = match outcome {
        ProcessOutcome::ExitError { code } => (
            TaskErrorKind::ExitCode,
            format!("{} phase agent exited with status {}", phase.label(), code),
        ),
        ProcessOutcome::ClassifiedError { kind, message } => (kind, message),
        ProcessOutcome::Timeout => {
            let deadline = match phase {
                Phase::Discovery => config.discovery_timeout,
                Phase::Execution => config.execution_timeout,
            };
            (
                TaskErrorKind::Timeout,
                format!(
                    "{} phase exceeded its {}s deadline and was terminated",
                    phase.label(),
                    deadline.as_secs()
                ),
            )
        }
        ProcessOutcome::Ok => unreachable!("Ok outcomes are handled by the caller"),
    };
    TaskVerdict::Failed { kind, message }
}
