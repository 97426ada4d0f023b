//! Graceful-drain scenario (§8): items started before the duration boundary
//! are given room to finish rather than being cancelled outright.

use std::time::Duration;

use loadgen_engine::{run, LoadExecutionPlan, LoadSettings, UserOperation, WorkerConfiguration};

#[tokio::test]
async fn in_flight_work_completes_within_the_graceful_budget() {
    let operation = UserOperation::new(|| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        true
    });
    let settings = LoadSettings::new(5, Duration::from_millis(100), Duration::from_secs(1))
        .with_graceful_stop_timeout(Duration::from_millis(500));
    let plan = LoadExecutionPlan::new("graceful-drain", settings, operation);

    let result = run(plan, WorkerConfiguration::hybrid()).await.unwrap();

    assert_eq!(result.failure, 0);
    assert!(result.time_seconds >= 1.0 && result.time_seconds <= 1.5);
}
