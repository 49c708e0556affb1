//! Daily command logbook
//!
//! Every received command and every configuration change or rejection is
//! appended as one timestamped text line to `{dir}/{YYYYMMDD}_commands.log`.

use std::io::Write;
use std::path::PathBuf;

use chrono::Local;
use common::logging::DailyRollingWriter;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::Result;
use crate::protocol::{CommandMessage, DeviceId};
use crate::settings::params::{ConfigValue, ParamSpec};
use crate::transport::link::hex_bytes;

/// Record sink for commands and configuration changes
pub trait LogSink: Send + Sync {
    fn command(&self, message: &CommandMessage);

    fn config_change(&self, param: &ParamSpec, previous: Option<&ConfigValue>, current: &ConfigValue);

    fn config_error(&self, parameter: u8, reason: &str);
}

pub struct DailyLogbook {
    writer: Mutex<DailyRollingWriter>,
}

impl DailyLogbook {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let writer = DailyRollingWriter::new("commands", dir)?;
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }

    pub fn current_path(&self) -> PathBuf {
        self.writer.lock().current_path()
    }

    fn append(&self, kind: &str, body: std::fmt::Arguments<'_>) {
        let stamp = Local::now().format("%H:%M:%S%.3f");
        let mut writer = self.writer.lock();
        if let Err(e) = writeln!(writer, "{} {} {}", stamp, kind, body) {
            warn!("Logbook write failed: {}", e);
        }
    }
}

fn device_label(raw: u8) -> String {
    match DeviceId::from_raw(raw) {
        Some(device) => device.to_string(),
        None => format!("unknown(0x{:02X})", raw),
    }
}

impl LogSink for DailyLogbook {
    fn command(&self, message: &CommandMessage) {
        self.append(
            "CMD",
            format_args!(
                "{} par=0x{:02X} sub=0x{:02X} len={} [{}]",
                device_label(message.device),
                message.parameter,
                message.subpacket,
                message.length,
                hex_bytes(message.data())
            ),
        );
    }

    fn config_change(&self, param: &ParamSpec, previous: Option<&ConfigValue>, current: &ConfigValue) {
        match previous {
            Some(old) => self.append(
                "CFG",
                format_args!("{} (#{}) new {} current {}", param.name, param.id, current, old),
            ),
            None => self.append(
                "CFG",
                format_args!("{} (#{}) new {}", param.name, param.id, current),
            ),
        }
    }

    fn config_error(&self, parameter: u8, reason: &str) {
        self.append("ERR", format_args!("param #{} rejected: {}", parameter, reason));
    }
}
