//! Task orchestrator - FIFO work queue stamped by the temporal spine
//!
//! A task is stamped with a pulse when queued, when handed out and when
//! marked done. The queueing pulse's cycle id is the task id. Completed
//! tasks are returned to the caller and not retained.

use bicameral_core::{Error, Priority, QueuedTask, Result, TaskState, TemporalSpine};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Default)]
struct Board {
    pending: VecDeque<QueuedTask>,
    executing: HashMap<String, QueuedTask>,
}

pub struct TaskQueue {
    state: Mutex<Board>,
    spine: Arc<TemporalSpine>,
    capacity: usize,
}

impl TaskQueue {
    pub fn new(spine: Arc<TemporalSpine>, capacity: usize) -> Self {
        Self {
            state: Mutex::new(Board::default()),
            spine,
            capacity: capacity.max(1),
        }
    }

    /// Append a task. Fails with `Overloaded` once pending plus executing
    /// tasks reach capacity.
    pub async fn queue(&self, data: serde_json::Value, priority: Priority) -> Result<QueuedTask> {
        let mut state = self.state.lock().await;
        if state.pending.len() + state.executing.len() >= self.capacity {
            warn!("Task queue full ({} tasks)", self.capacity);
            return Err(Error::Overloaded { limit: self.capacity });
        }

        let queued_at = self.spine.pulse();
        let task = QueuedTask {
            task_id: queued_at.cycle_id.clone(),
            data,
            priority,
            state: TaskState::Queued,
            queued_at,
            executed_at: None,
            completed_at: None,
        };
        state.pending.push_back(task.clone());
        debug!("Queued task {} ({} pending)", task.task_id, state.pending.len());
        Ok(task)
    }

    /// Hand out the oldest pending task, or `None` when the queue is empty.
    pub async fn next(&self) -> Option<QueuedTask> {
        let mut state = self.state.lock().await;
        let mut task = state.pending.pop_front()?;
        task.state = TaskState::Executing;
        task.executed_at = Some(self.spine.pulse());
        state.executing.insert(task.task_id.clone(), task.clone());
        debug!("Executing task {}", task.task_id);
        Some(task)
    }

    /// Complete a task that was handed out by `next`.
    pub async fn done(&self, task_id: &str) -> Result<QueuedTask> {
        let mut state = self.state.lock().await;
        let mut task = state
            .executing
            .remove(task_id)
            .ok_or_else(|| Error::UnknownTask(task_id.to_string()))?;
        task.state = TaskState::Completed;
        task.completed_at = Some(self.spine.pulse());
        info!("Task {} completed", task.task_id);
        Ok(task)
    }

    pub async fn pending(&self) -> usize {
        self.state.lock().await.pending.len()
    }

    pub async fn executing(&self) -> usize {
        self.state.lock().await.executing.len()
    }
}
