//! The Hybrid worker pool (§4.B): a fixed set of long-lived workers draining
//! a shared queue, sized once at construction and never resized.
//!
//! The queue's receive side is wrapped in a `tokio::sync::Mutex` shared by
//! every worker — each worker locks it only long enough to pull the next
//! item, then releases it before executing the user operation, so a slow
//! operation on one worker never blocks the others from pulling work.

use std::sync::Arc;

use tokio::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::CollectorHandle;
use crate::pool::{default_worker_count, WorkItem, WorkerPool};
use crate::user_operation::UserOperation;

#[derive(Clone)]
enum Sender {
    Bounded(tokio::sync::mpsc::Sender<WorkItem>),
    Unbounded(tokio::sync::mpsc::UnboundedSender<WorkItem>),
}

impl Sender {
    async fn send(&self, item: WorkItem) {
        match self {
            // Back-pressures the caller when the queue is full, per §4.B's
            // "submission may back-pressure" contract.
            Sender::Bounded(tx) => {
                let _ = tx.send(item).await;
            }
            Sender::Unbounded(tx) => {
                let _ = tx.send(item);
            }
        }
    }
}

#[derive(Clone)]
enum Receiver {
    Bounded(Arc<Mutex<tokio::sync::mpsc::Receiver<WorkItem>>>),
    Unbounded(Arc<Mutex<tokio::sync::mpsc::UnboundedReceiver<WorkItem>>>),
}

impl Receiver {
    async fn recv(&self) -> Option<WorkItem> {
        match self {
            Receiver::Bounded(rx) => rx.lock().await.recv().await,
            Receiver::Unbounded(rx) => rx.lock().await.recv().await,
        }
    }
}

/// A fixed-size pool of long-lived workers sharing one queue.
pub struct HybridPool {
    worker_threads_used: usize,
    /// Fires when the drain budget expires, telling workers to abandon
    /// whatever they're mid-flight on instead of waiting it out.
    hard_cancel: CancellationToken,
    /// Taken by `close()` so dropping it lets `recv()` observe end-of-queue.
    sender: Mutex<Option<Sender>>,
    handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl HybridPool {
    /// Spawns `W` long-lived workers immediately. `W` is
    /// `max_worker_threads` if set, otherwise computed from `concurrency`
    /// per §4.B's formula.
    pub fn spawn(
        concurrency: usize,
        channel_capacity: Option<usize>,
        max_worker_threads: Option<usize>,
        operation: UserOperation,
        collector: CollectorHandle,
    ) -> Self {
        let worker_count = max_worker_threads.unwrap_or_else(|| default_worker_count(concurrency));
        collector.worker_thread_count(worker_count);

        let hard_cancel = CancellationToken::new();

        let (sender, receiver) = match channel_capacity {
            Some(cap) => {
                let (tx, rx) = tokio::sync::mpsc::channel(cap);
                (Sender::Bounded(tx), Receiver::Bounded(Arc::new(Mutex::new(rx))))
            }
            None => {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                (Sender::Unbounded(tx), Receiver::Unbounded(Arc::new(Mutex::new(rx))))
            }
        };

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let receiver = receiver.clone();
            let operation = operation.clone();
            let collector = collector.clone();
            let hard_cancel = hard_cancel.clone();
            let cancel_observed = watch_from_token(&hard_cancel);

            handles.push(tokio::spawn(async move {
                run_worker(worker_id, receiver, operation, collector, hard_cancel, cancel_observed).await;
            }));
        }

        info!(worker_count, "hybrid pool started");

        Self {
            worker_threads_used: worker_count,
            hard_cancel,
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        }
    }
}

/// Bridges a `CancellationToken` into the `watch::Receiver<bool>` shape that
/// `UserOperation::call` expects — one bridging task per worker, not per
/// request, since the token only ever fires once per pool lifetime.
fn watch_from_token(token: &CancellationToken) -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    let token = token.clone();
    tokio::spawn(async move {
        token.cancelled().await;
        let _ = tx.send(true);
    });
    rx
}

async fn run_worker(
    worker_id: usize,
    receiver: Receiver,
    operation: UserOperation,
    collector: CollectorHandle,
    hard_cancel: CancellationToken,
    cancel_observed: watch::Receiver<bool>,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = hard_cancel.cancelled() => None,
            item = receiver.recv() => item,
        };

        let item = match item {
            Some(item) => item,
            None => break,
        };

        let started_at = Instant::now();
        let queue_time_ms = started_at.duration_since(item.enqueued_at).as_secs_f64() * 1000.0;
        collector.request_started();

        let outcome = tokio::select! {
            biased;
            _ = hard_cancel.cancelled() => None,
            success = operation.call(cancel_observed.clone()) => Some(success),
        };

        match outcome {
            Some(success) => {
                let service_time_ms = started_at.elapsed().as_secs_f64() * 1000.0;
                debug!(worker_id, success, service_time_ms, "hybrid worker completed item");
                collector.step_result(success, service_time_ms, Some(queue_time_ms));
            }
            None => {
                // Hard-cancelled mid-flight: abandoned, not counted either way.
                debug!(worker_id, "hybrid worker abandoned in-flight item on cancellation");
                collector.adjust_in_flight(1);
            }
        }
    }
    debug!(worker_id, "hybrid worker exiting");
}

#[async_trait]
impl WorkerPool for HybridPool {
    async fn submit(&self, items: Vec<WorkItem>) {
        let guard = self.sender.lock().await;
        if let Some(sender) = guard.as_ref() {
            for item in items {
                sender.send(item).await;
            }
        } else {
            warn!("submit called after close; dropping {} item(s)", items.len());
        }
    }

    fn close(&self) {
        // Dropping the only sender lets every worker's `recv()` observe
        // end-of-queue once what's already enqueued has drained. The
        // Orchestrator never calls `close` concurrently with `submit`, so
        // the lock is uncontended in practice.
        match self.sender.try_lock() {
            Ok(mut guard) => {
                guard.take();
            }
            Err(_) => warn!("close() found the submit lock contended; queue will close once it frees"),
        }
    }

    async fn drain(&self, budget: Duration) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        if handles.is_empty() {
            return;
        }

        let joined = join_all(handles);
        tokio::pin!(joined);

        tokio::select! {
            _ = &mut joined => {
                debug!("hybrid pool drained within budget");
            }
            _ = tokio::time::sleep(budget) => {
                warn!(?budget, "hybrid pool drain budget exceeded; cancelling remaining workers");
                self.hard_cancel.cancel();
                // Workers observe the cancellation at their next select
                // point and exit promptly.
                joined.await;
            }
        }
    }

    fn worker_threads_used(&self) -> usize {
        self.worker_threads_used
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::spawn_collector;

    fn work_items(n: usize) -> Vec<WorkItem> {
        let now = Instant::now();
        (0..n).map(|_| WorkItem { enqueued_at: now }).collect()
    }

    #[tokio::test]
    async fn all_submitted_items_are_counted_after_drain() {
        let collector = spawn_collector("hybrid".to_string(), Instant::now(), false);
        let operation = UserOperation::new(|| async { true });
        let pool = HybridPool::spawn(10, None, Some(4), operation, collector.clone());

        pool.submit(work_items(25)).await;
        pool.close();
        pool.drain(Duration::from_secs(5)).await;

        let result = collector.get_load_result().await.unwrap();
        assert_eq!(result.total, 25);
        assert_eq!(result.success, 25);
        assert_eq!(result.worker_threads_used, 4);
    }

    #[tokio::test]
    async fn worker_count_override_is_honored() {
        let collector = spawn_collector("hybrid-count".to_string(), Instant::now(), false);
        let operation = UserOperation::new(|| async { true });
        let pool = HybridPool::spawn(1000, None, Some(3), operation, collector);
        assert_eq!(pool.worker_threads_used(), 3);
        pool.close();
        pool.drain(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn drain_cancels_items_stuck_past_the_budget() {
        let collector = spawn_collector("hybrid-cancel".to_string(), Instant::now(), false);
        let operation = UserOperation::new(|| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            true
        });
        let pool = HybridPool::spawn(1, None, Some(2), operation, collector.clone());

        pool.submit(work_items(2)).await;
        pool.close();
        pool.drain(Duration::from_millis(50)).await;

        let result = collector.get_load_result().await.unwrap();
        // Neither item ever completes; both are reconciled away as abandoned.
        assert_eq!(result.total, 0);
        assert_eq!(result.requests_in_flight, 0);
    }

    #[tokio::test]
    async fn submit_after_close_is_dropped_not_blocked() {
        let collector = spawn_collector("hybrid-late".to_string(), Instant::now(), false);
        let operation = UserOperation::new(|| async { true });
        let pool = HybridPool::spawn(1, None, Some(1), operation, collector.clone());

        pool.close();
        pool.submit(work_items(3)).await;
        pool.drain(Duration::from_secs(1)).await;

        let result = collector.get_load_result().await.unwrap();
        assert_eq!(result.total, 0);
    }
}
