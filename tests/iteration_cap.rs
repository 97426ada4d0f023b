//! Iteration-cap scenario (§8): `max_iterations` stops the run well before
//! the configured duration would have.

use std::time::Duration;

use loadgen_engine::{run, LoadExecutionPlan, LoadSettings, UserOperation, WorkerConfiguration};

#[tokio::test(start_paused = true)]
async fn max_iterations_stops_the_run_before_the_time_budget() {
    let operation = UserOperation::new(|| async { true });
    let settings = LoadSettings::new(10, Duration::from_millis(100), Duration::from_secs(300))
        .with_max_iterations(100);
    let plan = LoadExecutionPlan::new("iteration-cap", settings, operation);

    let started = tokio::time::Instant::now();
    let result = run(plan, WorkerConfiguration::hybrid()).await.unwrap();

    assert_eq!(result.requests_started, 100);
    assert_eq!(result.total, 100);
    assert!(started.elapsed() < Duration::from_secs(300));
}

#[tokio::test(start_paused = true)]
async fn iteration_cap_trims_the_final_partial_batch() {
    let operation = UserOperation::new(|| async { true });
    let settings = LoadSettings::new(10, Duration::from_millis(100), Duration::from_secs(300))
        .with_max_iterations(37);
    let plan = LoadExecutionPlan::new("iteration-cap-partial", settings, operation);

    let result = run(plan, WorkerConfiguration::task_spawned()).await.unwrap();

    assert_eq!(result.requests_started, 37);
    assert_eq!(result.total, 37);
}
