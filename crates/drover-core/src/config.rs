use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration for the orchestration engine, resolved from the
/// environment with CLI overrides applied by the binary.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// External coding-agent binary invoked for both phases
    pub agent_bin: String,
    /// Root directory for task workspaces and process logs
    pub state_dir: PathBuf,
    /// Hosting-provider token injected into the agent environment
    pub github_token: Option<String>,
    pub discovery_timeout: Duration,
    pub execution_timeout: Duration,
}

pub const DEFAULT_AGENT_BIN: &str = "claude";
pub const DEFAULT_STATE_DIR: &str = ".drover";
const DEFAULT_DISCOVERY_TIMEOUT_SECS: u64 = 10 * 60;
const DEFAULT_EXECUTION_TIMEOUT_SECS: u64 = 60 * 60;

/// Name of the repository directory Discovery clones into, relative to the
/// task workspace. Discovery's postcondition and Execution's precondition.
pub const REPO_DIR_NAME: &str = "repo";
pub const TASK_LOG_FILE_NAME: &str = "task.log";

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            agent_bin: DEFAULT_AGENT_BIN.to_string(),
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            github_token: None,
            discovery_timeout: Duration::from_secs(DEFAULT_DISCOVERY_TIMEOUT_SECS),
            execution_timeout: Duration::from_secs(DEFAULT_EXECUTION_TIMEOUT_SECS),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            agent_bin: non_empty_env("DROVER_AGENT_BIN")
                .unwrap_or_else(|| DEFAULT_AGENT_BIN.to_string()),
            state_dir: non_empty_env("DROVER_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            github_token: non_empty_env("GH_TOKEN").or_else(|| non_empty_env("GITHUB_TOKEN")),
            discovery_timeout: secs_env(
                "DROVER_DISCOVERY_TIMEOUT_SECS",
                DEFAULT_DISCOVERY_TIMEOUT_SECS,
            ),
            execution_timeout: secs_env(
                "DROVER_EXECUTION_TIMEOUT_SECS",
                DEFAULT_EXECUTION_TIMEOUT_SECS,
            ),
        }
    }

    pub fn tasks_root(&self) -> PathBuf {
        self.state_dir.join("tasks")
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.tasks_root().join(task_id)
    }

    pub fn task_log_path(&self, task_id: &str) -> PathBuf {
        self.task_dir(task_id).join(TASK_LOG_FILE_NAME)
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.state_dir.join("logs")
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secs_env(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

/// Resolve the state directory the way the binary does: explicit flag, then
/// environment, then the local default.
pub fn resolve_state_dir(flag: Option<String>) -> PathBuf {
    if let Some(dir) = flag {
        return PathBuf::from(dir);
    }
    non_empty_env("DROVER_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
}

impl EngineConfig {
    pub fn with_state_dir(mut self, state_dir: impl AsRef<Path>) -> Self {
        self.state_dir = state_dir.as_ref().to_path_buf();
        self
    }

    pub fn with_agent_bin(mut self, agent_bin: impl Into<String>) -> Self {
        self.agent_bin = agent_bin.into();
        self
    }
}
