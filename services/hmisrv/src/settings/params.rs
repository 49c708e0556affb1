//! Configuration parameter table
//!
//! Parameters are addressed on the config device by their id in the
//! parameter field. Text parameters are FAT 8.3 file names sent as two
//! NUL-padded 8-byte halves; scalar parameters are little-endian integers in
//! the first `width` payload bytes.

use std::fmt;
use std::sync::OnceLock;

use bytes::BufMut;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::{CONFIG_STAGING_LEN, MAX_FRAME_DATA};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Text,
    Scalar {
        width: u8,
        signed: bool,
        min: i64,
        max: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDefault {
    Text(&'static str),
    Scalar(i64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Scalar(i64),
    Text(String),
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Scalar(v) => write!(f, "{}", v),
            ConfigValue::Text(s) => write!(f, "\"{}\"", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub id: u8,
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamDefault,
}

const fn scalar(width: u8, signed: bool, min: i64, max: i64) -> ParamKind {
    ParamKind::Scalar {
        width,
        signed,
        min,
        max,
    }
}

pub const PARAMS: [ParamSpec; 11] = [
    ParamSpec {
        id: 1,
        name: "log_file",
        kind: ParamKind::Text,
        default: ParamDefault::Text("HMI.LOG"),
    },
    ParamSpec {
        id: 2,
        name: "data_file",
        kind: ParamKind::Text,
        default: ParamDefault::Text("DATA.CSV"),
    },
    ParamSpec {
        id: 3,
        name: "battery_capacity_ah",
        kind: scalar(2, false, 1, 10_000),
        default: ParamDefault::Scalar(400),
    },
    ParamSpec {
        id: 4,
        name: "low_voltage_cutoff_cv",
        kind: scalar(2, false, 900, 6_000),
        default: ParamDefault::Scalar(2_300),
    },
    ParamSpec {
        id: 5,
        name: "generator_start_soc",
        kind: scalar(1, false, 5, 95),
        default: ParamDefault::Scalar(30),
    },
    ParamSpec {
        id: 6,
        name: "generator_stop_soc",
        kind: scalar(1, false, 10, 100),
        default: ParamDefault::Scalar(90),
    },
    ParamSpec {
        id: 7,
        name: "tracker_park_wind_kmh",
        kind: scalar(1, false, 10, 150),
        default: ParamDefault::Scalar(60),
    },
    ParamSpec {
        id: 8,
        name: "latitude_cdeg",
        kind: scalar(2, true, -9_000, 9_000),
        default: ParamDefault::Scalar(0),
    },
    ParamSpec {
        id: 9,
        name: "longitude_cdeg",
        kind: scalar(4, true, -18_000, 18_000),
        default: ParamDefault::Scalar(0),
    },
    ParamSpec {
        id: 10,
        name: "timezone_offset_min",
        kind: scalar(2, true, -720, 840),
        default: ParamDefault::Scalar(0),
    },
    ParamSpec {
        id: 11,
        name: "backlight_pct",
        kind: scalar(1, false, 0, 100),
        default: ParamDefault::Scalar(80),
    },
];

pub fn lookup(id: u8) -> Option<&'static ParamSpec> {
    PARAMS.iter().find(|p| p.id == id)
}

pub fn lookup_name(name: &str) -> Option<&'static ParamSpec> {
    PARAMS.iter().find(|p| p.name == name)
}

fn file_name_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-~]{1,8}(\.[A-Za-z0-9_\-~]{1,3})?$").ok())
        .as_ref()
}

impl ParamSpec {
    pub fn default_value(&self) -> ConfigValue {
        match self.default {
            ParamDefault::Text(s) => ConfigValue::Text(s.to_string()),
            ParamDefault::Scalar(v) => ConfigValue::Scalar(v),
        }
    }

    /// Check a typed value against this parameter's constraints
    pub fn check(&self, value: &ConfigValue) -> Result<(), String> {
        match (self.kind, value) {
            (ParamKind::Text, ConfigValue::Text(s)) => {
                if file_name_pattern().is_some_and(|re| re.is_match(s)) {
                    Ok(())
                } else {
                    Err(format!("\"{}\" is not an 8.3 file name", s.escape_default()))
                }
            },
            (ParamKind::Scalar { min, max, .. }, ConfigValue::Scalar(v)) => {
                if (min..=max).contains(v) {
                    Ok(())
                } else {
                    Err(format!("{} outside {}..={}", v, min, max))
                }
            },
            _ => Err("value kind does not match parameter".to_string()),
        }
    }

    /// Decode the 16-byte staging of a text parameter
    pub fn decode_text(&self, staging: &[u8; CONFIG_STAGING_LEN]) -> Result<ConfigValue, String> {
        let end = staging.iter().position(|b| *b == 0).unwrap_or(CONFIG_STAGING_LEN);
        if staging[end..].iter().any(|b| *b != 0) {
            return Err("embedded NUL in file name".to_string());
        }
        let text = std::str::from_utf8(&staging[..end])
            .map_err(|_| "file name is not ASCII".to_string())?;
        let value = ConfigValue::Text(text.to_string());
        self.check(&value)?;
        Ok(value)
    }

    /// Decode a scalar from the first `width` payload bytes
    pub fn decode_scalar(&self, data: &[u8]) -> Result<ConfigValue, String> {
        let ParamKind::Scalar { width, signed, .. } = self.kind else {
            return Err("not a scalar parameter".to_string());
        };
        let width = width as usize;
        if data.len() < width {
            return Err(format!("{} bytes, need {}", data.len(), width));
        }
        let mut raw = [0u8; 8];
        raw[..width].copy_from_slice(&data[..width]);
        let unsigned = u64::from_le_bytes(raw);
        let value = if signed {
            let shift = 64 - 8 * width as u32;
            ((unsigned << shift) as i64) >> shift
        } else {
            unsigned as i64
        };
        let value = ConfigValue::Scalar(value);
        self.check(&value)?;
        Ok(value)
    }

    /// Wire frames reporting `value`: one per scalar, two halves per text
    pub fn encode(&self, value: &ConfigValue) -> Vec<Vec<u8>> {
        match (self.kind, value) {
            (ParamKind::Scalar { width, .. }, ConfigValue::Scalar(v)) => {
                let mut out = Vec::with_capacity(width as usize);
                out.put_slice(&v.to_le_bytes()[..width as usize]);
                vec![out]
            },
            (ParamKind::Text, ConfigValue::Text(s)) => {
                let mut staging = [0u8; CONFIG_STAGING_LEN];
                let n = s.len().min(CONFIG_STAGING_LEN);
                staging[..n].copy_from_slice(&s.as_bytes()[..n]);
                staging
                    .chunks(MAX_FRAME_DATA)
                    .map(|half| half.to_vec())
                    .collect()
            },
            _ => Vec::new(),
        }
    }
}
