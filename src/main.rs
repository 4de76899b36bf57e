use clap::Parser;

use alertea::{telemetry, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI args
    let args = alertea::config::Args::parse();

    // Load configuration (flags ⊕ optional YAML file ⊕ environment)
    let config = Config::load(&args)?;

    // Initialize tracing; the guards keep file logging alive until exit
    let _guards = telemetry::init_telemetry(&config.logging)?;

    tracing::debug!("{:?}", args);

    // Run the service
    alertea::run(config).await
}
