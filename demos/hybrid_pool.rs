//! Drives the Hybrid worker pool against a deterministic in-memory operation
//! and prints the finalized report as pretty JSON.
//!
//! Run with `cargo run --example hybrid_pool`.

use std::time::Duration;

use loadgen_engine::{run, LoadExecutionPlan, LoadSettings, UserOperation, WorkerConfiguration};
use rand::Rng;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let operation = UserOperation::new(|| async {
        let jitter_ms = rand::thread_rng().gen_range(1..=15);
        tokio::time::sleep(Duration::from_millis(jitter_ms)).await;
        true
    });

    let settings = LoadSettings::new(
        50,
        Duration::from_millis(50),
        Duration::from_secs(3),
    );
    let plan = LoadExecutionPlan::new("hybrid-demo", settings, operation);
    let config = WorkerConfiguration::hybrid().with_detailed_metrics(true);

    let result = run(plan, config).await.expect("demo run should not hit an engine error");
    println!("{}", serde_json::to_string_pretty(&result).unwrap());
}
