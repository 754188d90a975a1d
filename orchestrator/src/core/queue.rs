//! Per-provider priority task queue
//!
//! Tasks drain highest priority first; within one priority level the queue
//! is FIFO. Requeueing demotes a task one priority level with a floor of 1,
//! so a repeatedly failing combo sinks behind fresh work but is never
//! starved out entirely.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use shared::Task;

pub const MIN_PRIORITY: u8 = 1;

/// Heap entry pairing the task with an insertion sequence number. The
/// sequence breaks priority ties so equal-priority tasks come out in
/// insertion order.
#[derive(Debug)]
struct QueuedTask {
    task: Task,
    seq: u64,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.task.priority == other.task.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins, then lower sequence (older) wins
        self.task
            .priority
            .cmp(&other.task.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    heap: BinaryHeap<QueuedTask>,
    next_seq: u64,
}

/// Thread-safe priority queue owned by one provider
#[derive(Debug, Default)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, task: Task) {
        let mut state = self.state.lock().expect("task queue lock poisoned");
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueuedTask { task, seq });
    }

    /// Pop the highest-priority task, oldest first within a priority level
    pub fn pop(&self) -> Option<Task> {
        let mut state = self.state.lock().expect("task queue lock poisoned");
        state.heap.pop().map(|entry| entry.task)
    }

    /// Re-enter a task after a failed attempt: one priority level lower
    /// (floor 1), attempt counter incremented
    pub fn requeue_demoted(&self, mut task: Task) {
        task.priority = task.priority.saturating_sub(1).max(MIN_PRIORITY);
        task.attempt += 1;
        self.push(task);
    }

    /// Re-enter a task untouched. Used when the local limiter refused a
    /// slot: no attempt was made, so nothing is consumed or demoted.
    pub fn requeue_unchanged(&self, task: Task) {
        self.push(task);
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("task queue lock poisoned").heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every queued task. Used when a provider goes
    /// unhealthy and its remaining work must move elsewhere.
    pub fn drain_all(&self) -> Vec<Task> {
        let mut state = self.state.lock().expect("task queue lock poisoned");
        let mut drained: Vec<Task> = std::mem::take(&mut state.heap)
            .into_sorted_vec()
            .into_iter()
            .map(|entry| entry.task)
            .collect();
        // into_sorted_vec is ascending; callers expect highest priority first
        drained.reverse();
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{ProviderConfig, ProviderId};
    use std::time::Duration;

    fn test_config(priority: u8) -> ProviderConfig {
        ProviderConfig {
            provider_id: ProviderId::Synthetic,
            model_id: "synthetic-1".to_string(),
            model_family: "synthetic".to_string(),
            requests_per_minute: 60,
            requests_per_hour: 1000,
            max_concurrency: 4,
            base_retry_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_retries: 3,
            priority,
            call_timeout: Duration::from_secs(1),
        }
    }

    fn task(subject: &str, priority: u8) -> Task {
        Task::new(subject.to_string(), "prompt_v1".to_string(), &test_config(priority))
    }

    #[test]
    fn test_pop_highest_priority_first() {
        let queue = TaskQueue::new();
        queue.push(task("low", 2));
        queue.push(task("high", 9));
        queue.push(task("mid", 5));

        assert_eq!(queue.pop().unwrap().subject, "high");
        assert_eq!(queue.pop().unwrap().subject, "mid");
        assert_eq!(queue.pop().unwrap().subject, "low");
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_same_priority() {
        let queue = TaskQueue::new();
        queue.push(task("first", 5));
        queue.push(task("second", 5));
        queue.push(task("third", 5));

        assert_eq!(queue.pop().unwrap().subject, "first");
        assert_eq!(queue.pop().unwrap().subject, "second");
        assert_eq!(queue.pop().unwrap().subject, "third");
    }

    #[test]
    fn test_requeue_demotes_with_floor() {
        let queue = TaskQueue::new();
        queue.push(task("combo", 2));

        let popped = queue.pop().unwrap();
        assert_eq!(popped.attempt, 0);
        queue.requeue_demoted(popped);

        let demoted = queue.pop().unwrap();
        assert_eq!(demoted.priority, 1);
        assert_eq!(demoted.attempt, 1);
        queue.requeue_demoted(demoted);

        // Already at the floor: priority stays at 1
        let floored = queue.pop().unwrap();
        assert_eq!(floored.priority, 1);
        assert_eq!(floored.attempt, 2);
    }

    #[test]
    fn test_requeue_unchanged_preserves_task() {
        let queue = TaskQueue::new();
        queue.push(task("combo", 7));

        let popped = queue.pop().unwrap();
        queue.requeue_unchanged(popped);

        let back = queue.pop().unwrap();
        assert_eq!(back.priority, 7);
        assert_eq!(back.attempt, 0);
    }

    #[test]
    fn test_demoted_task_sorts_behind_fresh_work() {
        let queue = TaskQueue::new();
        queue.push(task("failing", 5));

        let popped = queue.pop().unwrap();
        queue.requeue_demoted(popped);
        queue.push(task("fresh", 5));

        assert_eq!(queue.pop().unwrap().subject, "fresh");
        assert_eq!(queue.pop().unwrap().subject, "failing");
    }

    #[test]
    fn test_drain_all_returns_priority_order() {
        let queue = TaskQueue::new();
        queue.push(task("low", 1));
        queue.push(task("high", 8));
        queue.push(task("mid", 4));

        let drained = queue.drain_all();
        assert!(queue.is_empty());
        let subjects: Vec<&str> = drained.iter().map(|t| t.subject.as_str()).collect();
        assert_eq!(subjects, vec!["high", "mid", "low"]);
    }
}
