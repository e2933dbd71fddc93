//! Shared task queue
//!
//! Built once from the discovered references and then drained by the workers.
//! Nothing is ever pushed back: retries happen inside the worker that holds the
//! task.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// 1-based position in discovery order, used for progress lines
    pub ordinal: usize,

    /// Detail page reference
    pub target: String,

    /// Attempts made so far
    pub attempt: u32,
}

/// FIFO of pending tasks shared by all workers
#[derive(Debug)]
pub struct TaskQueue {
    tasks: Mutex<VecDeque<Task>>,
    total: usize,
}

impl TaskQueue {
    /// Builds a queue from references in discovery order, dropping repeats
    pub fn from_targets<I, S>(targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = HashSet::new();
        let tasks: VecDeque<Task> = targets
            .into_iter()
            .map(Into::into)
            .filter(|target: &String| seen.insert(target.clone()))
            .enumerate()
            .map(|(index, target)| Task {
                ordinal: index + 1,
                target,
                attempt: 0,
            })
            .collect();

        let total = tasks.len();
        Self {
            tasks: Mutex::new(tasks),
            total,
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the next task, or `None` when the queue is drained
    pub fn pop(&self) -> Option<Task> {
        self.guard().pop_front()
    }

    /// Number of tasks the queue started with
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of tasks not yet taken
    pub fn remaining(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    /// Drops every pending task so other workers stop after their current one
    ///
    /// # Returns
    ///
    /// The number of tasks that were discarded
    pub fn abandon(&self) -> usize {
        let mut tasks = self.guard();
        let dropped = tasks.len();
        tasks.clear();
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_from_targets_dedups_in_order() {
        let queue = TaskQueue::from_targets(["a", "b", "a", "c", "b"]);

        assert_eq!(queue.total(), 3);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop())
            .map(|t| (t.ordinal, t.target))
            .collect();
        assert_eq!(
            order,
            vec![
                (1, "a".to_string()),
                (2, "b".to_string()),
                (3, "c".to_string())
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_empty_queue() {
        let queue = TaskQueue::from_targets(Vec::<String>::new());
        assert_eq!(queue.total(), 0);
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_abandon() {
        let queue = TaskQueue::from_targets(["a", "b", "c"]);
        queue.pop();

        assert_eq!(queue.abandon(), 2);
        assert_eq!(queue.remaining(), 0);
        assert_eq!(queue.total(), 3);
    }

    #[test]
    fn test_each_task_taken_once() {
        let targets: Vec<String> = (0..200).map(|i| format!("t{}", i)).collect();
        let queue = Arc::new(TaskQueue::from_targets(targets));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(task) = queue.pop() {
                        taken.push(task.ordinal);
                    }
                    taken
                })
            })
            .collect();

        let mut all: Vec<usize> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        assert_eq!(all, (1..=200).collect::<Vec<_>>());
    }
}
