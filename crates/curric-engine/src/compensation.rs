//! Best-effort compensation of index writes.
//!
//! When a relational write fails after the index already accepted a change,
//! the sync engine submits a [`CompensationTask`] instead of blocking the
//! caller. [`SpawnedCompensator`] runs each task on a detached tokio task with
//! bounded, jittered retries. A task that exhausts its attempts is logged at
//! ERROR as an orphan inconsistency for the resync pass to repair.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use curric_core::{defaults, CompensationTask, Compensator, CurriculumConfig, SearchIndex};

/// Compensator that applies tasks on detached tokio tasks.
#[derive(Clone)]
pub struct SpawnedCompensator {
    index: Arc<dyn SearchIndex>,
    max_attempts: u32,
    backoff: Duration,
}

impl SpawnedCompensator {
    pub fn new(index: Arc<dyn SearchIndex>, max_attempts: u32) -> Self {
        Self {
            index,
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(defaults::COMPENSATION_BACKOFF_MS),
        }
    }

    pub fn from_config(index: Arc<dyn SearchIndex>, config: &CurriculumConfig) -> Self {
        Self::new(index, config.compensation_max_attempts)
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run a task to completion, retrying up to `max_attempts` times.
    ///
    /// Returns true when the index accepted the task.
    pub async fn run(&self, task: &CompensationTask) -> bool {
        let start = Instant::now();
        for attempt in 1..=self.max_attempts {
            match task.apply(self.index.as_ref()).await {
                Ok(()) => {
                    info!(
                        subsystem = "sync",
                        component = "compensator",
                        op = task.name(),
                        tag_id = task.tag_id(),
                        attempt,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Compensation applied"
                    );
                    return true;
                }
                Err(e) => {
                    warn!(
                        subsystem = "sync",
                        component = "compensator",
                        op = task.name(),
                        tag_id = task.tag_id(),
                        attempt,
                        error = %e,
                        "Compensation attempt failed"
                    );
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.delay(attempt)).await;
                    }
                }
            }
        }
        error!(
            subsystem = "sync",
            component = "compensator",
            op = task.name(),
            tag_id = task.tag_id(),
            attempts = self.max_attempts,
            task = ?task,
            "Compensation exhausted; index and store are inconsistent until resync"
        );
        false
    }

    fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.as_millis() as u64 * attempt as u64;
        let jitter = rand::thread_rng().gen_range(0..=base / 2);
        Duration::from_millis(base + jitter)
    }
}

impl Compensator for SpawnedCompensator {
    fn submit(&self, task: CompensationTask) {
        if task.is_noop() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            error!(
                subsystem = "sync",
                component = "compensator",
                op = task.name(),
                tag_id = task.tag_id(),
                "No runtime to run compensation; task dropped"
            );
            return;
        };
        debug!(
            subsystem = "sync",
            component = "compensator",
            op = task.name(),
            tag_id = task.tag_id(),
            "Compensation submitted"
        );
        let this = self.clone();
        handle.spawn(async move {
            this.run(&task).await;
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Compensator that records every submitted task.
///
/// With an index attached, each task is also applied once in the background;
/// [`RecordingCompensator::settle`] waits for those applications.
#[derive(Clone, Default)]
pub struct RecordingCompensator {
    tasks: Arc<Mutex<Vec<CompensationTask>>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
    index: Option<Arc<dyn SearchIndex>>,
}

impl RecordingCompensator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn applying_to(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index: Some(index),
            ..Self::default()
        }
    }

    pub fn tasks(&self) -> Vec<CompensationTask> {
        lock(&self.tasks).clone()
    }

    pub fn clear(&self) {
        lock(&self.tasks).clear();
    }

    /// Wait for every background application started so far.
    pub async fn settle(&self) {
        let handles: Vec<JoinHandle<()>> = lock(&self.pending).drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}

impl Compensator for RecordingCompensator {
    fn submit(&self, task: CompensationTask) {
        if task.is_noop() {
            return;
        }
        lock(&self.tasks).push(task.clone());
        if let Some(index) = &self.index {
            let index = index.clone();
            let handle = tokio::spawn(async move {
                let _ = task.apply(index.as_ref()).await;
            });
            lock(&self.pending).push(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curric_search::{IndexCall, MemorySearchIndex};

    #[tokio::test]
    async fn test_run_retries_until_success() {
        let index = MemorySearchIndex::new();
        index.fail_all(true);
        let compensator =
            SpawnedCompensator::new(Arc::new(index.clone()), 3).with_backoff(Duration::ZERO);

        let task = CompensationTask::MarkDeleted { tag_id: 4 };
        assert!(!compensator.run(&task).await);
        let attempts = index
            .calls()
            .iter()
            .filter(|c| matches!(c, IndexCall::Update { id: 4, .. }))
            .count();
        assert_eq!(attempts, 3);

        index.clear_faults();
        assert!(compensator.run(&task).await);
    }

    #[tokio::test]
    async fn test_submit_skips_noop_tasks() {
        let index = MemorySearchIndex::new();
        let recorder = RecordingCompensator::applying_to(Arc::new(index.clone()));
        recorder.submit(CompensationTask::AddParents {
            tag_id: 1,
            parents: vec![],
        });
        recorder.settle().await;
        assert!(recorder.tasks().is_empty());
        assert!(index.calls().is_empty());
    }

    #[tokio::test]
    async fn test_recording_compensator_applies_when_attached() {
        let index = MemorySearchIndex::new();
        let recorder = RecordingCompensator::applying_to(Arc::new(index.clone()));
        recorder.submit(CompensationTask::HideParents {
            tag_id: 2,
            parents: vec!["1.2".into()],
        });
        recorder.settle().await;

        assert_eq!(recorder.tasks().len(), 1);
        assert_eq!(
            index.writes(),
            vec![IndexCall::HideParents(2, vec!["1.2".into()])]
        );
    }

    #[tokio::test]
    async fn test_spawned_submit_runs_in_background() {
        let index = MemorySearchIndex::new();
        let compensator =
            SpawnedCompensator::new(Arc::new(index.clone()), 1).with_backoff(Duration::ZERO);
        compensator.submit(CompensationTask::RemoveParents {
            tag_id: 9,
            parents: vec!["3".into()],
        });
        for _ in 0..50 {
            if !index.writes().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(index.writes(), vec![IndexCall::RemoveParents(9, vec!["3".into()])]);
    }
}
