//! The Load Orchestrator (§4.D): drives batches on a precise interval,
//! decides when to stop, coordinates the graceful drain, and returns the
//! final report. This module owns the crate's single public entry point.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{error, info, warn};

use crate::collector::{spawn_collector, LoadResult};
use crate::errors::{EngineError, LoadTestError};
use crate::pool::{WorkItem, WorkerPool};
use crate::pool_hybrid::HybridPool;
use crate::pool_spawned::TaskSpawnedPool;
use crate::settings::{LoadExecutionPlan, TerminationMode};
use crate::worker_config::{WorkerConfiguration, WorkerMode};

/// Runs one load test to completion and returns its finalized report.
///
/// Validates `plan.settings` and `config` before spawning any task — a
/// configuration problem is returned as `LoadTestError::Config` with no
/// side effects. Everything after that point is an engine failure
/// (`LoadTestError::Engine`) if it occurs; a failing user operation is never
/// one of these, it is recorded as data in the returned `LoadResult`.
pub async fn run(plan: LoadExecutionPlan, config: WorkerConfiguration) -> Result<LoadResult, LoadTestError> {
    plan.settings.validate()?;
    config.validate()?;

    // One clock for everything: `t0` is tokio's pausable, virtual-time-aware
    // Instant. It drives the sleep_until schedule *and* is handed to the
    // Collector as `test_start`, so `time_seconds`/`requests_per_second` stay
    // correct under `tokio::time::pause`/`advance` (§8.1) instead of reading
    // the real OS clock while every duration they're compared against is
    // simulated.
    let t0 = Instant::now();
    let collector = spawn_collector(plan.name.clone(), t0, config.enable_detailed_metrics);
    info!(name = %plan.name, "entering Running");

    let pool: Box<dyn WorkerPool> = match config.mode {
        WorkerMode::Hybrid => Box::new(HybridPool::spawn(
            plan.settings.concurrency,
            config.channel_capacity,
            config.max_worker_threads,
            plan.operation.clone(),
            collector.clone(),
        )),
        WorkerMode::TaskSpawned => Box::new(TaskSpawnedPool::new(plan.operation.clone(), collector.clone())),
    };

    run_schedule(&plan, &*pool, &collector, t0).await;

    info!("entering Draining");
    pool.close();

    let graceful_budget = plan.settings.effective_graceful_stop_timeout();
    let ceiling = Duration::from_secs(60).max(plan.settings.duration + Duration::from_secs(60));
    let drain_clock = Instant::now();

    if time::timeout(ceiling, pool.drain(graceful_budget)).await.is_err() {
        let waited = drain_clock.elapsed();
        error!(?waited, ?ceiling, "drain timeout ceiling exceeded; aborting run with no LoadResult");
        return Err(LoadTestError::Engine(EngineError::DrainTimeoutExceeded { waited, ceiling }));
    }

    // Best-effort: hand unused arena pages back to the OS now that the pool's
    // workers (and whatever they allocated per request) have exited. `false`
    // skips the more expensive full generational collection.
    unsafe {
        libmimalloc_sys::mi_collect(false);
    }

    info!("entering Reporting");
    let result = collector.get_load_result().await.map_err(|e| {
        error!(error = %e, "collector reported an engine failure while finalizing");
        LoadTestError::Engine(e)
    });

    info!("entering Terminated");
    result
}

/// The `Running` state: schedules batches at `t0 + k * interval` until a
/// stop condition fires, then returns so the caller can transition to
/// `Draining`. Never submits a partial final batch except to respect
/// `max_iterations`.
async fn run_schedule(
    plan: &LoadExecutionPlan,
    pool: &dyn WorkerPool,
    collector: &crate::collector::CollectorHandle,
    t0: Instant,
) {
    let settings = &plan.settings;
    let mut next_fire = t0;
    let mut submitted: usize = 0;

    loop {
        time::sleep_until(next_fire).await;
        let now = Instant::now();
        let elapsed = now.saturating_duration_since(t0);
        let scheduled_elapsed = next_fire.saturating_duration_since(t0);

        if now > next_fire + settings.interval {
            warn!(
                ?elapsed,
                behind_by = ?now.saturating_duration_since(next_fire),
                "batch scheduling fell behind by more than one interval; continuing without catch-up"
            );
        }

        let stop_before_submit = match settings.termination_mode {
            TerminationMode::Duration | TerminationMode::StrictDuration => elapsed >= settings.duration,
            TerminationMode::CompleteCurrentInterval => scheduled_elapsed > settings.duration,
        };
        if stop_before_submit {
            break;
        }

        let remaining_cap = settings.max_iterations.map(|cap| cap.saturating_sub(submitted));
        if remaining_cap == Some(0) {
            break;
        }
        let batch_size = remaining_cap.map_or(settings.concurrency, |remaining| remaining.min(settings.concurrency));
        if batch_size == 0 {
            break;
        }

        let items: Vec<WorkItem> = (0..batch_size).map(|_| WorkItem { enqueued_at: now }).collect();
        pool.submit(items).await;
        submitted += batch_size;
        collector.batch_completed();

        let cap_reached = settings.max_iterations.is_some_and(|cap| submitted >= cap);

        next_fire += settings.interval;

        if cap_reached {
            break;
        }
    }

    info!(submitted, "scheduling stopped, transitioning to drain");
}
