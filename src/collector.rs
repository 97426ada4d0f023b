//! The Result Collector: a single long-lived task that serializes all
//! per-request bookkeeping and, on request, finalizes a `LoadResult`.
//!
//! One task per run owns a private `CollectorState` — no `Arc<Mutex<_>>`
//! anywhere in this module. Producers (workers, the Orchestrator) only ever
//! hold a `CollectorHandle`, a cheap clone of the inbox's sender half, and
//! never block on delivery since the channel is unbounded.

use tokio::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::errors::EngineError;
use crate::memory::sample_rss_bytes;

/// Events the Collector absorbs, in the order a run actually produces them.
enum CollectorEvent {
    RequestStarted,
    StepResult {
        success: bool,
        service_time_ms: f64,
        queue_time_ms: Option<f64>,
    },
    BatchCompleted,
    WorkerThreadCount(usize),
    /// Reconciles `requests_in_flight` when items are abandoned at
    /// cancellation time instead of completing normally (§5).
    AdjustInFlight(i64),
    GetLoadResult {
        reply: oneshot::Sender<Result<LoadResult, EngineError>>,
    },
}

/// The finalized report returned by `run()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadResult {
    pub name: String,
    pub total: u64,
    pub success: u64,
    pub failure: u64,
    pub requests_started: u64,
    pub requests_in_flight: u64,
    pub batches_completed: u64,
    pub worker_threads_used: usize,
    pub time_seconds: f64,
    pub requests_per_second: f64,
    pub min_latency_ms: f64,
    pub avg_latency_ms: f64,
    pub median_latency_ms: f64,
    pub p95_latency_ms: f64,
    pub p99_latency_ms: f64,
    pub max_latency_ms: f64,
    pub avg_queue_time_ms: f64,
    pub max_queue_time_ms: f64,
    pub worker_utilization: f64,
    pub peak_memory_bytes: u64,
}

/// Private, single-owner accumulator. Append-only until finalization, which
/// reads without mutating so `GetLoadResult` is idempotent (§8).
struct CollectorState {
    name: String,
    test_start: Instant,
    detailed_metrics: bool,

    requests_started: u64,
    requests_in_flight: i64,
    success: u64,
    failure: u64,
    batches_completed: u64,
    worker_threads_used: usize,

    service_time_samples_ms: Vec<f64>,
    service_time_sum_ms: f64,
    service_time_min_ms: f64,
    service_time_max_ms: f64,

    queue_time_sum_ms: f64,
    queue_time_max_ms: f64,
    queue_time_count: u64,

    peak_memory_bytes: u64,

    /// Cached on the first `GetLoadResult`, so a repeat request after the
    /// run has already finished returns a byte-identical report instead of
    /// recomputing `elapsed_seconds` against a later wall-clock instant.
    finalized: Option<LoadResult>,

    /// Set the first time `requests_in_flight` would go negative — an
    /// internal invariant violation (§7.1). Once set, every `GetLoadResult`
    /// replies with this as an `EngineError::Invariant` instead of a report,
    /// same idempotence guarantee as the happy path.
    invariant_violation: Option<String>,
}

impl CollectorState {
    fn new(name: String, test_start: Instant, detailed_metrics: bool) -> Self {
        Self {
            name,
            test_start,
            detailed_metrics,
            requests_started: 0,
            requests_in_flight: 0,
            success: 0,
            failure: 0,
            batches_completed: 0,
            worker_threads_used: 0,
            service_time_samples_ms: Vec::new(),
            service_time_sum_ms: 0.0,
            service_time_min_ms: f64::INFINITY,
            service_time_max_ms: 0.0,
            queue_time_sum_ms: 0.0,
            queue_time_max_ms: 0.0,
            queue_time_count: 0,
            peak_memory_bytes: 0,
            finalized: None,
            invariant_violation: None,
        }
    }

    fn apply(&mut self, event: CollectorEvent) -> Option<LoadResult> {
        match event {
            CollectorEvent::RequestStarted => {
                self.requests_started += 1;
                self.requests_in_flight += 1;
                if self.detailed_metrics {
                    if let Some(bytes) = sample_rss_bytes() {
                        self.peak_memory_bytes = self.peak_memory_bytes.max(bytes);
                    }
                }
                None
            }
            CollectorEvent::StepResult {
                success,
                service_time_ms,
                queue_time_ms,
            } => {
                self.requests_in_flight -= 1;
                debug_assert!(
                    self.requests_in_flight >= 0,
                    "requests_in_flight went negative applying StepResult"
                );
                if self.requests_in_flight < 0 {
                    self.invariant_violation.get_or_insert_with(|| {
                        format!(
                            "requests_in_flight went negative ({}) applying StepResult",
                            self.requests_in_flight
                        )
                    });
                    self.requests_in_flight = 0;
                }
                if success {
                    self.success += 1;
                } else {
                    self.failure += 1;
                }
                self.service_time_samples_ms.push(service_time_ms);
                self.service_time_sum_ms += service_time_ms;
                self.service_time_min_ms = self.service_time_min_ms.min(service_time_ms);
                self.service_time_max_ms = self.service_time_max_ms.max(service_time_ms);
                if let Some(qt) = queue_time_ms {
                    self.queue_time_sum_ms += qt;
                    self.queue_time_max_ms = self.queue_time_max_ms.max(qt);
                    self.queue_time_count += 1;
                }
                None
            }
            CollectorEvent::BatchCompleted => {
                self.batches_completed += 1;
                None
            }
            CollectorEvent::WorkerThreadCount(n) => {
                // Idempotent single-shot per §4.A: first write wins.
                if self.worker_threads_used == 0 {
                    self.worker_threads_used = n;
                }
                None
            }
            CollectorEvent::AdjustInFlight(delta) => {
                // Unlike `StepResult`, this is a best-effort reconciliation
                // signal (§5): a pool's drain-timeout path may abort items
                // that finish concurrently with the abort call, so `delta`
                // can legitimately overshoot what's actually outstanding.
                // That's expected, not an invariant violation — clamp and
                // move on rather than promoting it to `EngineError::Invariant`.
                self.requests_in_flight -= delta;
                if self.requests_in_flight < 0 {
                    warn!(
                        requests_in_flight = self.requests_in_flight,
                        delta, "AdjustInFlight overshot zero; clamping"
                    );
                    self.requests_in_flight = 0;
                }
                None
            }
            CollectorEvent::GetLoadResult { reply } => {
                if let Some(message) = self.invariant_violation.clone() {
                    let _ = reply.send(Err(EngineError::Invariant(message)));
                    return None;
                }
                if self.finalized.is_none() {
                    self.finalized = Some(self.finalize_uncached());
                }
                let result = self.finalized.clone().expect("just inserted");
                let _ = reply.send(Ok(result));
                None
            }
        }
    }

    fn finalize_uncached(&self) -> LoadResult {
        let count = self.service_time_samples_ms.len();
        let total = self.success + self.failure;

        let mut sorted = self.service_time_samples_ms.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("service times are never NaN"));

        let nearest_rank = |p: f64| -> f64 {
            if count == 0 {
                return 0.0;
            }
            let idx = ((p * count as f64).ceil() as isize - 1).clamp(0, count as isize - 1);
            sorted[idx as usize]
        };

        let avg_latency_ms = if count == 0 {
            0.0
        } else {
            self.service_time_sum_ms / count as f64
        };
        let min_latency_ms = if count == 0 { 0.0 } else { self.service_time_min_ms };
        let max_latency_ms = if count == 0 { 0.0 } else { self.service_time_max_ms };

        let elapsed = self.test_start.elapsed();
        let elapsed_seconds = elapsed.as_secs_f64();
        let requests_per_second = if elapsed_seconds > 0.0 {
            total as f64 / elapsed_seconds
        } else {
            0.0
        };

        let worker_utilization = if self.worker_threads_used > 0 && elapsed_seconds > 0.0 {
            let elapsed_ms = elapsed_seconds * 1000.0;
            (avg_latency_ms * total as f64 / (self.worker_threads_used as f64 * elapsed_ms))
                .min(1.0)
        } else {
            0.0
        };

        let (avg_queue_time_ms, max_queue_time_ms) = if self.queue_time_count > 0 {
            (
                self.queue_time_sum_ms / self.queue_time_count as f64,
                self.queue_time_max_ms,
            )
        } else {
            (0.0, 0.0)
        };

        LoadResult {
            name: self.name.clone(),
            total,
            success: self.success,
            failure: self.failure,
            requests_started: self.requests_started,
            requests_in_flight: self.requests_in_flight.max(0) as u64,
            batches_completed: self.batches_completed,
            worker_threads_used: self.worker_threads_used,
            time_seconds: elapsed_seconds,
            requests_per_second,
            min_latency_ms,
            avg_latency_ms,
            median_latency_ms: nearest_rank(0.50),
            p95_latency_ms: nearest_rank(0.95),
            p99_latency_ms: nearest_rank(0.99),
            max_latency_ms,
            avg_queue_time_ms,
            max_queue_time_ms,
            worker_utilization,
            peak_memory_bytes: self.peak_memory_bytes,
        }
    }
}

/// A cheap, clonable handle to the Collector's inbox.
#[derive(Clone)]
pub struct CollectorHandle {
    tx: mpsc::UnboundedSender<CollectorEvent>,
}

impl CollectorHandle {
    pub fn request_started(&self) {
        let _ = self.tx.send(CollectorEvent::RequestStarted);
    }

    pub fn step_result(&self, success: bool, service_time_ms: f64, queue_time_ms: Option<f64>) {
        let _ = self.tx.send(CollectorEvent::StepResult {
            success,
            service_time_ms,
            queue_time_ms,
        });
    }

    pub fn batch_completed(&self) {
        let _ = self.tx.send(CollectorEvent::BatchCompleted);
    }

    pub fn worker_thread_count(&self, n: usize) {
        let _ = self.tx.send(CollectorEvent::WorkerThreadCount(n));
    }

    pub fn adjust_in_flight(&self, delta: i64) {
        let _ = self.tx.send(CollectorEvent::AdjustInFlight(delta));
    }

    /// The ask-pattern exchange: send a request carrying a one-shot reply
    /// channel, then await the answer. Idempotent — may be called more than
    /// once and will return byte-identical results each time (§8).
    pub async fn get_load_result(&self) -> Result<LoadResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(CollectorEvent::GetLoadResult { reply: reply_tx })
            .map_err(|_| EngineError::CollectorUnreachable)?;
        reply_rx.await.map_err(|_| EngineError::CollectorUnreachable)?
    }
}

/// Spawns the Collector task and returns a handle to it. The task exits once
/// every clone of the returned handle has been dropped.
pub fn spawn_collector(
    name: String,
    test_start: Instant,
    detailed_metrics: bool,
) -> CollectorHandle {
    let (tx, mut rx) = mpsc::unbounded_channel::<CollectorEvent>();

    tokio::spawn(async move {
        let mut state = CollectorState::new(name, test_start, detailed_metrics);
        while let Some(event) = rx.recv().await {
            state.apply(event);
        }
        debug!("collector task exiting, all handles dropped");
    });

    CollectorHandle { tx }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn state() -> CollectorState {
        CollectorState::new("test".to_string(), Instant::now(), false)
    }

    #[tokio::test]
    async fn empty_collector_finalizes_to_zeroes() {
        let result = state().finalize_uncached();
        assert_eq!(result.total, 0);
        assert_eq!(result.min_latency_ms, 0.0);
        assert_eq!(result.max_latency_ms, 0.0);
        assert_eq!(result.median_latency_ms, 0.0);
    }

    #[tokio::test]
    async fn success_and_failure_counts_sum_to_total() {
        let mut s = state();
        for success in [true, true, false, true, false] {
            s.apply(CollectorEvent::RequestStarted);
            s.apply(CollectorEvent::StepResult {
                success,
                service_time_ms: 10.0,
                queue_time_ms: None,
            });
        }
        let result = s.finalize_uncached();
        assert_eq!(result.success, 3);
        assert_eq!(result.failure, 2);
        assert_eq!(result.total, 5);
        assert_eq!(result.requests_started, 5);
        assert_eq!(result.requests_in_flight, 0);
    }

    /// Pins the exact upper-nearest-rank indexing from §4.A: for 10 sorted
    /// samples 10,20,...,100, p50 index = ceil(0.5*10)-1 = 4 -> value 50;
    /// p95 index = ceil(0.95*10)-1 = 9 -> value 100 (clamped); p99 likewise.
    #[tokio::test]
    async fn percentile_indexing_matches_upper_nearest_rank() {
        let mut s = state();
        for i in 1..=10 {
            s.apply(CollectorEvent::RequestStarted);
            s.apply(CollectorEvent::StepResult {
                success: true,
                service_time_ms: (i * 10) as f64,
                queue_time_ms: None,
            });
        }
        let result = s.finalize_uncached();
        assert_eq!(result.median_latency_ms, 50.0);
        assert_eq!(result.p95_latency_ms, 100.0);
        assert_eq!(result.p99_latency_ms, 100.0);
        assert_eq!(result.min_latency_ms, 10.0);
        assert_eq!(result.max_latency_ms, 100.0);
    }

    #[tokio::test]
    async fn percentile_shape_on_1000_uniform_samples() {
        let mut s = state();
        for i in 0..1000u64 {
            // Uniform in [10, 110) ms.
            let ms = 10.0 + (i as f64 / 1000.0) * 100.0;
            s.apply(CollectorEvent::RequestStarted);
            s.apply(CollectorEvent::StepResult {
                success: true,
                service_time_ms: ms,
                queue_time_ms: None,
            });
        }
        let result = s.finalize_uncached();
        assert!((result.avg_latency_ms - 60.0).abs() < 5.0, "{}", result.avg_latency_ms);
        assert!((result.median_latency_ms - 60.0).abs() < 2.0, "{}", result.median_latency_ms);
        assert!((result.p95_latency_ms - 105.0).abs() < 2.0, "{}", result.p95_latency_ms);
        assert!((result.p99_latency_ms - 109.0).abs() < 2.0, "{}", result.p99_latency_ms);
    }

    #[tokio::test]
    async fn percentile_monotonicity_holds() {
        let mut s = state();
        for i in 1..=37 {
            s.apply(CollectorEvent::RequestStarted);
            s.apply(CollectorEvent::StepResult {
                success: true,
                service_time_ms: i as f64,
                queue_time_ms: None,
            });
        }
        let result = s.finalize_uncached();
        assert!(result.median_latency_ms <= result.p95_latency_ms);
        assert!(result.p95_latency_ms <= result.p99_latency_ms);
        assert!(result.p99_latency_ms <= result.max_latency_ms);
        assert!(result.min_latency_ms <= result.avg_latency_ms);
        assert!(result.avg_latency_ms <= result.max_latency_ms);
    }

    #[tokio::test]
    async fn queue_time_is_zero_when_no_pool_reports_it() {
        let mut s = state();
        s.apply(CollectorEvent::RequestStarted);
        s.apply(CollectorEvent::StepResult {
            success: true,
            service_time_ms: 5.0,
            queue_time_ms: None,
        });
        let result = s.finalize_uncached();
        assert_eq!(result.avg_queue_time_ms, 0.0);
        assert_eq!(result.max_queue_time_ms, 0.0);
    }

    #[tokio::test]
    async fn queue_time_aggregates_when_reported() {
        let mut s = state();
        for qt in [1.0, 2.0, 3.0] {
            s.apply(CollectorEvent::RequestStarted);
            s.apply(CollectorEvent::StepResult {
                success: true,
                service_time_ms: 10.0,
                queue_time_ms: Some(qt),
            });
        }
        let result = s.finalize_uncached();
        assert_eq!(result.avg_queue_time_ms, 2.0);
        assert_eq!(result.max_queue_time_ms, 3.0);
    }

    #[tokio::test]
    async fn worker_thread_count_is_idempotent_single_shot() {
        let mut s = state();
        s.apply(CollectorEvent::WorkerThreadCount(8));
        s.apply(CollectorEvent::WorkerThreadCount(16));
        let result = s.finalize_uncached();
        assert_eq!(result.worker_threads_used, 8);
    }

    #[tokio::test]
    async fn adjust_in_flight_reconciles_cancellation() {
        let mut s = state();
        s.apply(CollectorEvent::RequestStarted);
        s.apply(CollectorEvent::RequestStarted);
        s.apply(CollectorEvent::AdjustInFlight(2));
        let result = s.finalize_uncached();
        assert_eq!(result.requests_in_flight, 0);
        // Abandoned items contribute no samples and no success/failure.
        assert_eq!(result.total, 0);
    }

    #[tokio::test]
    async fn adjust_in_flight_never_goes_negative() {
        let mut s = state();
        s.apply(CollectorEvent::AdjustInFlight(5));
        let result = s.finalize_uncached();
        assert_eq!(result.requests_in_flight, 0);
    }

    #[tokio::test]
    async fn handle_round_trip_through_the_spawned_task() {
        let handle = spawn_collector("round-trip".to_string(), Instant::now(), false);
        handle.request_started();
        handle.step_result(true, 12.5, None);
        handle.batch_completed();
        handle.worker_thread_count(4);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = handle.get_load_result().await.unwrap();
        assert_eq!(result.name, "round-trip");
        assert_eq!(result.success, 1);
        assert_eq!(result.batches_completed, 1);
        assert_eq!(result.worker_threads_used, 4);
    }

    #[tokio::test]
    async fn get_load_result_is_idempotent() {
        let handle = spawn_collector("idempotent".to_string(), Instant::now(), false);
        handle.step_result(true, 20.0, None);
        tokio::time::sleep(Duration::from_millis(10)).await;

        let first = handle.get_load_result().await.unwrap();
        let second = handle.get_load_result().await.unwrap();
        assert_eq!(first.success, second.success);
        assert_eq!(first.median_latency_ms, second.median_latency_ms);
    }
}
