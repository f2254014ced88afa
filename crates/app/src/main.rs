//! Demo entry point.

use app::config::Config;
use app::demo::{Demo, Summary};
use app::error::AppError;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    app::init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 3. Seed the in-memory services
    let demo = Demo::new(config.executor.clone())?;
    let submissions = demo.seed(config.demo_orders);
    tracing::info!(orders = submissions.len(), "starting order fulfillment demo");

    // 4. Fulfill everything concurrently
    let outcomes = demo.run(&submissions).await?;
    for (label, outcome) in &outcomes {
        let json = serde_json::to_string(outcome)?;
        tracing::info!(order = %label, status = %outcome.status, outcome = %json, "order processed");
    }

    // 5. Report
    let summary = Summary::from_outcomes(outcomes.iter().map(|(_, o)| o));
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", metrics_handle.render());

    Ok(())
}
