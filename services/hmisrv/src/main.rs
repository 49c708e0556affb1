//! HMI link service binary

use clap::Parser;
use tracing::info;

use hmisrv::bootstrap::{self, Args};
use hmisrv::config::HmiSrvConfig;
use hmisrv::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = HmiSrvConfig::load(args.config.as_deref())?;
    let _log_guard = bootstrap::initialize_logging(&args, &config)?;

    // Validation mode: validate and exit
    if args.validate {
        info!("Configuration is valid");
        return Ok(());
    }

    let engine = Engine::from_config(&config)?;

    let signal = common::shutdown::wait_for_shutdown().await;
    info!("Received {}, shutting down", signal);
    engine.shutdown().await;

    Ok(())
}
