//! Service bootstrap
//!
//! Command-line arguments and logging setup.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use crate::config::{HmiSrvConfig, SERVICE_NAME};
use crate::error::Result;

/// Command-line arguments for hmisrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "hmisrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "HMI link service: CAN telemetry, commands and MODBUS tunnel",
    long_about = None
)]
pub struct Args {
    /// Configuration file (defaults to config/hmisrv.yaml)
    #[arg(short = 'c', long, env = "HMISRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration without starting service
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    /// Normalized log level, falling back to the configured one
    pub fn effective_level(&self, config: &HmiSrvConfig) -> String {
        let level = self
            .log_level
            .as_deref()
            .unwrap_or(config.logging.level.as_str())
            .to_lowercase();
        match level.as_str() {
            "trace" | "debug" | "info" | "error" => level,
            "warn" | "warning" => "warn".to_string(),
            _ => "info".to_string(),
        }
    }
}

/// Initialize console and daily file logging
pub fn initialize_logging(args: &Args, config: &HmiSrvConfig) -> Result<common::logging::LogGuard> {
    let log_config = common::logging::LogConfig {
        service_name: SERVICE_NAME.to_string(),
        log_dir: config.logging.dir.clone(),
        level: args.effective_level(config),
        ansi: config.logging.ansi && !args.no_color,
    };
    let guard = common::logging::init_logging(&log_config)?;
    info!(
        "{} v{} starting (link: {:?}, executor: {})",
        SERVICE_NAME,
        env!("CARGO_PKG_VERSION"),
        config.can.link,
        if config.modbus.serial.is_some() { "rtu" } else { "simulator" }
    );
    Ok(guard)
}
