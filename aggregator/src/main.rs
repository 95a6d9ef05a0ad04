use aggregator::cli::{Cli, Commands, RunCmd};
use aggregator::core::config::Config;
use aggregator::service::AggregatorService;
use aggregator::utils::logging::init_logging;
use aggregator::AggregatorResult;
use clap::Parser as _;
use dotenvy::dotenv;
use tracing::{debug, error, info};

/// Start the aggregator
#[tokio::main]
async fn main() {
    dotenv().ok();
    init_logging();
    info!("Starting aggregator");
    let cli = Cli::parse();

    match &cli.command {
        Commands::Run { run_command } => match run_aggregator(run_command).await {
            Ok(_) => {
                info!("Aggregator service stopped cleanly");
            }
            Err(e) => {
                error!(
                    error = %e,
                    error_chain = ?e,
                    "Failed to run aggregator service"
                );
                panic!("Failed to run aggregator service: {}", e);
            }
        },
    }
}

async fn run_aggregator(run_cmd: &RunCmd) -> AggregatorResult<()> {
    let config = Config::from_run_cmd(run_cmd).await?;
    debug!("Configuration initialized");

    let service =
        AggregatorService::new(config.params().clone(), config.table().clone(), config.execution(), config.signer())
            .await?;
    service.start();
    info!(
        pending = service.pending_count().await?,
        database = %config.database().path.display(),
        "Aggregator service started"
    );

    tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");

    service.stop().await;
    info!("Aggregator service shutting down");
    Ok(())
}
