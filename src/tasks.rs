//! Keyed registry of background tasks with at most one live task per key.

use parking_lot::Mutex;
use std::{collections::HashMap, future::Future, hash::Hash};
use tokio::task::JoinHandle;

/// Tracks short-lived per-peer tasks (SYN retries, LIST transfers).
///
/// The liveness check and the insertion of a new task happen under one lock
/// acquisition, so two concurrent callers can never both start a task for
/// the same key.
#[derive(Debug)]
pub struct TaskRegistry<K> {
    tasks: Mutex<HashMap<K, JoinHandle<()>>>,
}

impl<K> Default for TaskRegistry<K> {
    fn default() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Clone + Eq + Hash> TaskRegistry<K> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `fut` for `key` unless a task for `key` is still running.
    ///
    /// Returns true if the task was spawned.
    pub fn spawn_unique<F>(&self, key: K, fut: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock();
        if tasks.get(&key).is_some_and(|h| !h.is_finished()) {
            return false;
        }
        tasks.insert(key, tokio::spawn(fut));
        true
    }

    /// Abort the task for `key`, if any.
    ///
    /// Returns true if a running task was aborted.
    pub fn cancel(&self, key: &K) -> bool {
        match self.tasks.lock().remove(key) {
            Some(handle) => {
                let running = !handle.is_finished();
                handle.abort();
                running
            }
            None => false,
        }
    }

    /// Abort every task.
    pub fn cancel_all(&self) {
        for (_, handle) in self.tasks.lock().drain() {
            handle.abort();
        }
    }

    /// Check whether a task for `key` is still running.
    pub fn is_active(&self, key: &K) -> bool {
        self.tasks
            .lock()
            .get(key)
            .is_some_and(|h| !h.is_finished())
    }

    /// Number of running tasks. Finished entries are pruned.
    pub fn active_count(&self) -> usize {
        let mut tasks = self.tasks.lock();
        tasks.retain(|_, h| !h.is_finished());
        tasks.len()
    }
}

impl<K> Drop for TaskRegistry<K> {
    fn drop(&mut self) {
        for (_, handle) in self.tasks.get_mut().drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[tokio::test]
    async fn test_at_most_one_task_per_key() {
        let registry = TaskRegistry::new();
        let runs = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let runs = runs.clone();
            registry.spawn_unique("A", async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
        tokio::task::yield_now().await;

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(registry.is_active(&"A"));
        assert_eq!(registry.active_count(), 1);

        assert!(registry.spawn_unique("B", async {}));
        registry.cancel_all();
    }

    #[tokio::test]
    async fn test_respawn_after_finish() {
        let registry = TaskRegistry::new();
        assert!(registry.spawn_unique(1u32, async {}));
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!registry.is_active(&1));
        assert!(registry.spawn_unique(1u32, async {}));
    }

    #[tokio::test]
    async fn test_cancel() {
        let registry = TaskRegistry::new();
        registry.spawn_unique("A", std::future::pending::<()>());
        assert!(registry.cancel(&"A"));
        assert!(!registry.is_active(&"A"));
        assert!(!registry.cancel(&"A"));
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_spawn_unique() {
        let registry = Arc::new(TaskRegistry::new());
        let spawned = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let spawned = spawned.clone();
                tokio::spawn(async move {
                    if registry.spawn_unique("peer", std::future::pending::<()>()) {
                        spawned.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        futures::future::join_all(handles).await;

        assert_eq!(spawned.load(Ordering::SeqCst), 1);
        registry.cancel_all();
    }
}
