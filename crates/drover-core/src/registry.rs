// Task Registry
// In-memory single source of truth for externally observable task state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use drover_types::{TaskRecord, TaskStatus};

/// Cloneable handle over the task table.
///
/// Records are inserted once by the engine, then replaced whole by the flow
/// driving that task. Reads clone out under the lock so callers never see a
/// partially written record, and registry operations never block on phase
/// execution. HTTP handlers read this concurrently with the orchestration
/// flows writing it, hence the lock.
#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<RwLock<HashMap<String, TaskRecord>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, record: TaskRecord) {
        self.tasks.write().await.insert(record.id.clone(), record);
    }

    pub async fn get(&self, id: &str) -> Option<TaskRecord> {
        self.tasks.read().await.get(id).cloned()
    }

    /// All records, most recently started first.
    pub async fn list(&self) -> Vec<TaskRecord> {
        let mut rows = self
            .tasks
            .read()
            .await
            .values()
            .cloned()
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| b.started.cmp(&a.started));
        rows
    }

    /// Replace the stored record atomically with respect to readers.
    pub async fn update(&self, record: TaskRecord) {
        self.tasks.write().await.insert(record.id.clone(), record);
    }

    pub async fn counts(&self) -> (usize, usize) {
        let guard = self.tasks.read().await;
        let running = guard
            .values()
            .filter(|record| record.status == TaskStatus::Running)
            .count();
        (guard.len(), running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drover_types::TaskErrorKind;

    fn record(id: &str) -> TaskRecord {
        TaskRecord::new(id.to_string(), "do things".to_string(), "/tmp/x.log".to_string())
    }

    #[tokio::test]
    async fn get_returns_inserted_record() {
        let registry = TaskRegistry::new();
        registry.insert(record("a")).await;

        let found = registry.get("a").await.unwrap();
        assert_eq!(found.id, "a");
        assert_eq!(found.status, TaskStatus::Running);
        assert!(registry.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn list_orders_most_recent_first() {
        let registry = TaskRegistry::new();
        let mut first = record("first");
        first.started = chrono::Utc::now() - chrono::Duration::seconds(10);
        registry.insert(first).await;
        registry.insert(record("second")).await;

        let rows = registry.list().await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "second");
        assert_eq!(rows[1].id, "first");
    }

    #[tokio::test]
    async fn update_replaces_whole_record() {
        let registry = TaskRegistry::new();
        registry.insert(record("a")).await;

        let mut updated = registry.get("a").await.unwrap();
        updated.status = TaskStatus::Failed;
        updated.error_type = Some(TaskErrorKind::Timeout);
        updated.error = Some("discovery phase exceeded its deadline".to_string());
        registry.update(updated).await;

        let found = registry.get("a").await.unwrap();
        assert_eq!(found.status, TaskStatus::Failed);
        assert_eq!(found.error_type, Some(TaskErrorKind::Timeout));
        let (total, running) = registry.counts().await;
        assert_eq!((total, running), (1, 0));
    }
}
