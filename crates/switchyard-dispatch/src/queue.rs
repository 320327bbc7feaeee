use crate::types::Task;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Priority-ordered buffer for tasks that could not be dispatched.
///
/// Lower priority values drain first; equal priorities keep submission
/// order. Insertion scans from the back, so a new task lands behind every
/// waiting task of the same priority.
pub struct WorkQueue {
    tasks: RwLock<VecDeque<Task>>,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(VecDeque::new()),
        }
    }

    /// Adds a task behind all tasks with an equal or smaller priority value.
    pub async fn push(&self, task: Task) {
        let mut tasks = self.tasks.write().await;
        let at = tasks
            .iter()
            .rposition(|queued| queued.priority <= task.priority)
            .map_or(0, |idx| idx + 1);
        tasks.insert(at, task);
    }

    /// Removes and returns the head task.
    pub async fn pop(&self) -> Option<Task> {
        self.tasks.write().await.pop_front()
    }

    /// Puts a task back at the head, ahead of everything waiting.
    ///
    /// The drain loop uses this when the head task found no agent, so the
    /// task keeps its turn instead of moving behind its priority class.
    pub async fn push_front(&self, task: Task) {
        self.tasks.write().await.push_front(task);
    }

    /// Whether a task with this key is waiting.
    pub async fn contains(&self, key: &str) -> bool {
        self.tasks.read().await.iter().any(|t| t.key == key)
    }

    /// Number of waiting tasks.
    pub async fn depth(&self) -> usize {
        self.tasks.read().await.len()
    }

    /// Whether the queue is empty.
    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }

    /// Keys of waiting tasks in drain order.
    pub async fn queued_keys(&self) -> Vec<String> {
        self.tasks.read().await.iter().map(|t| t.key.clone()).collect()
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new()
    }
}
