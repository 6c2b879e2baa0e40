//! ETL job entry point - builds the sinks from the environment and runs one batch

use anyhow::{Context, Result};
use multiformat_etl::config::EtlConfig;
use multiformat_etl::ingestion::load::PgLoader;
use multiformat_etl::ingestion::publish::S3Store;
use multiformat_etl::logging::{init_logging, start_run_log};
use multiformat_etl::pipeline::Orchestrator;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Logging is not up yet, so configuration errors go to stderr
    let config = match EtlConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = setup_logging(&config) {
        eprintln!("Failed to set up logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("ETL process failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn setup_logging(config: &EtlConfig) -> Result<()> {
    start_run_log(&config.log.path).context("Failed to open run log")?;
    init_logging(&config.log).context("Failed to initialize logging")?;
    Ok(())
}

async fn run(config: EtlConfig) -> Result<()> {
    info!("Configuration loaded: {:?}", config);

    let store = S3Store::new(&config.storage).await;
    let loader = PgLoader::new(&config.database);

    let orchestrator = Orchestrator::new(config, store, loader);
    let summary = orchestrator.run().await?;

    info!("✓ Run complete: {}", summary);

    Ok(())
}
