// Task Workspace
// Directory tree owned by exactly one task for its entire lifetime.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{REPO_DIR_NAME, TASK_LOG_FILE_NAME};
use crate::error::{DroverError, Result};

/// Typed handle over `<tasks_root>/<task_id>/`.
///
/// Holds the task log and, between Discovery and cleanup, the cloned
/// repository at `repo/`. Discovery's postcondition (repository present at
/// `repo_dir()`) is Execution's precondition, checked through this handle
/// rather than passed around as a bare path.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Create the workspace directory tree for a task.
    pub fn create(tasks_root: &Path, task_id: &str) -> Result<Self> {
        let root = tasks_root.join(task_id);
        fs::create_dir_all(&root).map_err(|e| {
            DroverError::Workspace(format!(
                "failed to create workspace {}: {}",
                root.display(),
                e
            ))
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(TASK_LOG_FILE_NAME)
    }

    pub fn repo_dir(&self) -> PathBuf {
        self.root.join(REPO_DIR_NAME)
    }

    pub fn repo_is_ready(&self) -> bool {
        self.repo_dir().is_dir()
    }

    /// Remove the cloned repository. Best-effort: the log file always stays,
    /// and a failed removal is logged, not surfaced.
    pub fn remove_repo_dir(&self) {
        let repo = self.repo_dir();
        if !repo.exists() {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&repo) {
            tracing::warn!(repo = %repo.display(), error = %e, "failed to remove repository directory");
        }
    }
}
