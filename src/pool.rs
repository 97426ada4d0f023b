//! The capability shared by both worker pools: something the Orchestrator
//! can submit batches into, close, and drain with a timeout budget.
//!
//! The teacher's pattern of a small seam trait between "thing that
//! schedules" and "thing that executes" — `ScenarioExecutor` takes a
//! pre-built `reqwest::Client` rather than constructing its own transport —
//! is mirrored here: the Orchestrator is generic over `WorkerPool` so it
//! never needs to know whether it is driving the Hybrid or Task-spawned
//! implementation.

use tokio::time::{Duration, Instant};

use async_trait::async_trait;

/// One unit of work submitted to a pool. `enqueued_at` lets the Hybrid pool
/// compute queue-wait time; the Task-spawned pool ignores it.
///
/// Derived from `tokio::time::Instant`, not `std::time::Instant` — under
/// `tokio::time::pause`/`advance` (§8.1's test-tooling contract) the two
/// clocks diverge, and every duration fed into the Collector's latency
/// statistics must come from the same pausable clock the scheduler uses.
#[derive(Debug, Clone, Copy)]
pub struct WorkItem {
    pub enqueued_at: Instant,
}

#[async_trait]
pub trait WorkerPool: Send + Sync {
    /// Submit one batch of items. May back-pressure the caller if the pool
    /// uses a bounded channel internally.
    async fn submit(&self, items: Vec<WorkItem>);

    /// Signal "no more items" — closes the submission side. Idempotent.
    fn close(&self);

    /// Waits for all outstanding work to finish, up to `budget`. On timeout,
    /// cancels remaining work and returns without error — the caller (the
    /// Orchestrator) is responsible for comparing the elapsed wait against
    /// its own hard ceiling and raising `EngineError::DrainTimeoutExceeded`
    /// if *that* is exceeded.
    async fn drain(&self, budget: Duration);

    /// `0` for the Task-spawned pool, which has no fixed worker count.
    fn worker_threads_used(&self) -> usize;
}

/// Computes the Hybrid pool's default worker count per §4.B:
/// `W = min(max(cpu*2, ceil(concurrency/10)), min(1000, cpu*50))`.
pub fn default_worker_count(concurrency: usize) -> usize {
    let cpu_count = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);

    let base = cpu_count * 2;
    let scaled_for_concurrency = concurrency.div_ceil(10);
    let scaled = base.max(scaled_for_concurrency);
    let ceiling = (cpu_count * 50).min(1000);

    scaled.min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_count_scales_with_cpu_and_concurrency() {
        // With at least 1 CPU, base >= 2, so small concurrency never drives
        // the count below the CPU-derived floor.
        let w = default_worker_count(1);
        assert!(w >= 2);
    }

    #[test]
    fn worker_count_scales_up_for_high_concurrency() {
        let cpu_count = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
        let w = default_worker_count(100_000);
        let expected_ceiling = (cpu_count * 50).min(1000);
        assert_eq!(w, expected_ceiling);
    }

    #[test]
    fn worker_count_never_exceeds_1000() {
        let w = default_worker_count(usize::MAX / 100);
        assert!(w <= 1000);
    }
}
