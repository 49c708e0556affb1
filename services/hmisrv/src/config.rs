//! Service configuration
//!
//! Layered by `common::config_loader`: built-in defaults, then
//! `config/hmisrv.yaml` (or `--config`), then `HMISRV_*` environment
//! variables with `__` between nested keys, e.g. `HMISRV_CAN__INTERFACE`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HmiSrvError, Result};

pub const SERVICE_NAME: &str = "hmisrv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Frames are logged and completed immediately
    Simulated,
    /// Linux SocketCAN interface
    Socketcan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CanConfig {
    pub link: LinkKind,
    pub interface: String,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            link: LinkKind::Simulated,
            interface: "can0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub path: String,
    pub baud_rate: u32,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: String,
    pub timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            path: "/dev/ttyUSB0".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: "none".to_string(),
            timeout_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModbusConfig {
    /// Serial port for the field bus; `None` runs the in-memory simulator
    pub serial: Option<SerialConfig>,
    /// Slave id answered by the simulator
    pub simulator_slave: u8,
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            serial: None,
            simulator_slave: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Durable parameter file
    pub config_file: PathBuf,
    /// Directory of the daily command logbook
    pub logbook_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            config_file: PathBuf::from("data/parameters.json"),
            logbook_dir: PathBuf::from("data/logbook"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub dir: PathBuf,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            dir: PathBuf::from("logs"),
            ansi: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Period of the full telemetry cycle; 0 disables it
    pub interval_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { interval_ms: 1000 }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HmiSrvConfig {
    pub can: CanConfig,
    pub modbus: ModbusConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub telemetry: TelemetryConfig,
}

impl HmiSrvConfig {
    /// Load layered configuration; `path` overrides the default file
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self = common::config_loader::load_config(SERVICE_NAME, path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.can.link == LinkKind::Socketcan && self.can.interface.trim().is_empty() {
            return Err(HmiSrvError::config("can.interface must be set for socketcan"));
        }
        if let Some(serial) = &self.modbus.serial {
            if serial.path.trim().is_empty() {
                return Err(HmiSrvError::config("modbus.serial.path is empty"));
            }
            if serial.baud_rate == 0 {
                return Err(HmiSrvError::config("modbus.serial.baud_rate must be > 0"));
            }
            if serial.timeout_ms == 0 {
                return Err(HmiSrvError::config("modbus.serial.timeout_ms must be > 0"));
            }
        }
        if self.storage.config_file.as_os_str().is_empty() {
            return Err(HmiSrvError::config("storage.config_file is empty"));
        }
        Ok(())
    }
}
