//! Priority scheduler for ready tasks.
//!
//! Ready tasks wait in a max-heap. The next task out is the one with the
//! highest priority; ties go to the older task, then to the one submitted
//! first.

use crate::core::task::{Priority, Task, TaskId};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueueItem {
    task_id: TaskId,
    rank: u8,
    created_at: DateTime<Utc>,
    seq: usize,
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            // older items should win for same priority
            .then_with(|| other.created_at.cmp(&self.created_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Queue of ready tasks ordered by dispatch preference.
#[derive(Debug, Default)]
pub struct PriorityScheduler {
    queue: BinaryHeap<QueueItem>,
}

impl PriorityScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a ready task. `seq` is its submission position.
    pub fn push(&mut self, task: &Task, seq: usize) {
        self.push_raw(task.id, task.priority, task.created_at, seq);
    }

    pub(crate) fn push_raw(
        &mut self,
        task_id: TaskId,
        priority: Priority,
        created_at: DateTime<Utc>,
        seq: usize,
    ) {
        self.queue.push(QueueItem {
            task_id,
            rank: priority.rank(),
            created_at,
            seq,
        });
    }

    /// Take the most preferred ready task.
    pub fn pop(&mut self) -> Option<TaskId> {
        self.queue.pop().map(|item| item.task_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Drain every queued task, most preferred first.
    pub fn drain(&mut self) -> Vec<TaskId> {
        let mut drained = Vec::with_capacity(self.queue.len());
        while let Some(id) = self.pop() {
            drained.push(id);
        }
        drained
    }
}
