//! Durable configuration store

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::params::{lookup, lookup_name, ConfigValue, ParamSpec, PARAMS};
use crate::error::{HmiSrvError, Result};

/// Live parameter values plus durable commit
pub trait ConfigStore: Send + Sync {
    fn get(&self, id: u8) -> Option<ConfigValue>;

    /// Replace the live value; returns the previous one
    fn apply(&self, id: u8, value: ConfigValue) -> Result<Option<ConfigValue>>;

    /// Persist every live value
    fn commit(&self) -> Result<()>;

    /// All values in parameter-table order
    fn values(&self) -> Vec<(&'static ParamSpec, ConfigValue)>;
}

/// JSON file store, written atomically (temp file + rename) on commit
pub struct FileConfigStore {
    path: PathBuf,
    values: RwLock<BTreeMap<u8, ConfigValue>>,
    commits: AtomicU64,
}

impl FileConfigStore {
    /// Load `path`; missing file or invalid entries fall back to defaults
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut values: BTreeMap<u8, ConfigValue> =
            PARAMS.iter().map(|p| (p.id, p.default_value())).collect();

        if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let stored: BTreeMap<String, ConfigValue> = serde_json::from_str(&raw)
                .map_err(|e| HmiSrvError::storage(format!("{}: {}", path.display(), e)))?;
            for (name, value) in stored {
                let Some(spec) = lookup_name(&name) else {
                    warn!("Unknown stored parameter '{}' ignored", name);
                    continue;
                };
                match spec.check(&value) {
                    Ok(()) => {
                        values.insert(spec.id, value);
                    },
                    Err(reason) => {
                        warn!(
                            "Stored parameter '{}' rejected ({}), using default",
                            name, reason
                        );
                    },
                }
            }
            info!("Configuration loaded from {}", path.display());
        } else {
            info!(
                "No configuration at {}, using defaults",
                path.display()
            );
        }

        Ok(Self {
            path,
            values: RwLock::new(values),
            commits: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Successful commits since load
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, id: u8) -> Option<ConfigValue> {
        self.values.read().get(&id).cloned()
    }

    fn apply(&self, id: u8, value: ConfigValue) -> Result<Option<ConfigValue>> {
        let spec = lookup(id)
            .ok_or_else(|| HmiSrvError::validation(format!("unknown parameter {}", id)))?;
        spec.check(&value).map_err(HmiSrvError::validation)?;
        Ok(self.values.write().insert(id, value))
    }

    fn commit(&self) -> Result<()> {
        let named: BTreeMap<&str, ConfigValue> = {
            let values = self.values.read();
            PARAMS
                .iter()
                .filter_map(|p| values.get(&p.id).map(|v| (p.name, v.clone())))
                .collect()
        };
        let json = serde_json::to_vec_pretty(&named)?;

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!("Configuration committed to {}", self.path.display());
        Ok(())
    }

    fn values(&self) -> Vec<(&'static ParamSpec, ConfigValue)> {
        let values = self.values.read();
        PARAMS
            .iter()
            .map(|p| {
                let value = values.get(&p.id).cloned().unwrap_or_else(|| p.default_value());
                (p, value)
            })
            .collect()
    }
}
