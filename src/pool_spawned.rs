//! The Task-spawned worker pool (§4.C): every submitted item gets its own
//! `tokio::spawn`, with no fixed worker count and no queue-wait to report.
//!
//! Bookkeeping is a plain `Vec<JoinHandle<()>>` behind a mutex, drained with
//! `join_all` under a budget exactly like the Hybrid pool's shutdown path —
//! the two pools differ in how work is dispatched, not in how they wind down.

use tokio::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::collector::CollectorHandle;
use crate::pool::{WorkItem, WorkerPool};
use crate::user_operation::UserOperation;

/// A pool with no fixed worker set: each item is its own task, spawned the
/// moment it's submitted.
pub struct TaskSpawnedPool {
    operation: UserOperation,
    collector: CollectorHandle,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl TaskSpawnedPool {
    pub fn new(operation: UserOperation, collector: CollectorHandle) -> Self {
        // §4.A: `worker_threads_used` is 0 for this mode, there's no fixed
        // set of long-lived workers to report.
        collector.worker_thread_count(0);
        Self {
            operation,
            collector,
            handles: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl WorkerPool for TaskSpawnedPool {
    async fn submit(&self, items: Vec<WorkItem>) {
        let mut handles = self.handles.lock().await;
        for item in items {
            let operation = self.operation.clone();
            let collector = self.collector.clone();
            handles.push(tokio::spawn(run_item(item, operation, collector)));
        }
    }

    /// No submission-side state to close — items are already spawned as
    /// their own independent tasks.
    fn close(&self) {}

    async fn drain(&self, budget: Duration) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        if handles.is_empty() {
            return;
        }

        // Taken before the handles are consumed by `join_all`, so a
        // budget timeout can still abort whatever's left outstanding.
        let abort_handles: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();

        let joined = join_all(handles);
        tokio::pin!(joined);

        tokio::select! {
            results = &mut joined => {
                debug!(count = results.len(), "task-spawned pool drained within budget");
            }
            _ = tokio::time::sleep(budget) => {
                warn!(?budget, "task-spawned pool drain budget exceeded; aborting remaining tasks");
                let aborted = abort_handles.len();
                for handle in abort_handles {
                    handle.abort();
                }
                joined.await;
                // Best-effort reconciliation (§5): some of these may have
                // already finished and reported before the abort landed,
                // but `requests_in_flight` is clamped to zero either way.
                self.collector.adjust_in_flight(aborted as i64);
            }
        }
    }

    fn worker_threads_used(&self) -> usize {
        0
    }
}

async fn run_item(item: WorkItem, operation: UserOperation, collector: CollectorHandle) {
    let started_at = Instant::now();
    let _ = item.enqueued_at; // no queue-wait to report in this mode
    collector.request_started();

    let (_tx, rx) = tokio::sync::watch::channel(false);
    let success = operation.call(rx).await;
    let service_time_ms = started_at.elapsed().as_secs_f64() * 1000.0;

    debug!(success, service_time_ms, "task-spawned item completed");
    collector.step_result(success, service_time_ms, None);
}
