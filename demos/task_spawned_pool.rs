//! Drives the Task-spawned worker pool against a deterministic in-memory
//! operation with a mix of outcomes, printing the finalized report as
//! pretty JSON.
//!
//! Run with `cargo run --example task_spawned_pool`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use loadgen_engine::{run, LoadExecutionPlan, LoadSettings, UserOperation, WorkerConfiguration};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let call_index = Arc::new(AtomicU64::new(0));
    let operation = UserOperation::new(move || {
        let call_index = call_index.clone();
        async move {
            let index = call_index.fetch_add(1, Ordering::Relaxed);
            tokio::time::sleep(Duration::from_millis(5)).await;
            // Odd calls succeed, even calls fail — exercises the mixed-outcome path.
            index % 2 == 1
        }
    });

    let settings = LoadSettings::new(
        20,
        Duration::from_millis(100),
        Duration::from_secs(2),
    );
    let plan = LoadExecutionPlan::new("task-spawned-demo", settings, operation);
    let config = WorkerConfiguration::task_spawned();

    let result = run(plan, config).await.expect("demo run should not hit an engine error");
    println!("{}", serde_json::to_string_pretty(&result).unwrap());
}
