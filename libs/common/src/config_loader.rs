//! Configuration loading helpers
//!
//! Layering, lowest to highest priority:
//! 1. `T::default()`
//! 2. Configuration file (YAML, TOML or JSON, chosen by extension)
//! 3. Environment variables prefixed `{SERVICE}_`, nested keys split on `__`

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Default configuration path for a service: `config/{service}.yaml`
pub fn default_config_path(service_name: &str) -> PathBuf {
    PathBuf::from("config").join(format!("{}.yaml", service_name))
}

/// Load the service configuration.
///
/// A missing file is not an error: defaults and environment still apply.
pub fn load_config<T>(service_name: &str, path: Option<&Path>) -> Result<T>
where
    T: for<'de> Deserialize<'de> + Serialize + Default,
{
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_config_path(service_name));

    let mut figment = Figment::from(Serialized::defaults(T::default()));

    if path.exists() {
        info!("Loading configuration from {:?}", path);
        figment = merge_file(figment, &path)?;
    } else {
        debug!("Configuration file {:?} not found, using defaults", path);
    }

    let prefix = format!("{}_", service_name.to_uppercase());
    figment = figment.merge(Env::prefixed(&prefix).split("__"));

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    match extension {
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "toml" => Ok(figment.merge(Toml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        _ => Err(Error::Config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}
