//! Configuration assembler
//!
//! Consumes config-device commands. Text parameters arrive in two halves:
//! sub-packet 0 is staged without checks, sub-packet 1 completes the value,
//! which is then validated once. Scalars are complete in sub-packet 0.
//! Sub-packet `0xFF` commits the whole configuration whatever the parameter
//! field says.

use std::sync::Arc;

use tracing::{debug, info, warn};

use super::params::{self, ConfigValue, ParamKind, ParamSpec};
use super::store::ConfigStore;
use crate::logbook::LogSink;
use crate::protocol::constants::{CONFIG_COMMIT_SUBPACKET, CONFIG_STAGING_LEN, MAX_FRAME_DATA};
use crate::protocol::CommandMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOutcome {
    /// First half of a text parameter held in staging
    Staged,
    Applied(ConfigValue),
    Rejected(String),
    Committed,
    CommitFailed(String),
    Ignored,
}

pub struct ConfigAssembler {
    staging: [u8; CONFIG_STAGING_LEN],
    staged_param: Option<u8>,
    validations: u64,
    store: Arc<dyn ConfigStore>,
    log: Arc<dyn LogSink>,
}

impl ConfigAssembler {
    pub fn new(store: Arc<dyn ConfigStore>, log: Arc<dyn LogSink>) -> Self {
        Self {
            staging: [0u8; CONFIG_STAGING_LEN],
            staged_param: None,
            validations: 0,
            store,
            log,
        }
    }

    /// Completed values checked so far
    pub fn validations(&self) -> u64 {
        self.validations
    }

    pub fn handle(&mut self, message: &CommandMessage) -> ConfigOutcome {
        if message.subpacket == CONFIG_COMMIT_SUBPACKET {
            return self.commit();
        }

        let Some(spec) = params::lookup(message.parameter) else {
            debug!("Unknown config parameter {} ignored", message.parameter);
            return ConfigOutcome::Ignored;
        };

        match (spec.kind, message.subpacket) {
            (ParamKind::Text, 0) => {
                self.staging = [0u8; CONFIG_STAGING_LEN];
                self.staging[..message.data().len()].copy_from_slice(message.data());
                self.staged_param = Some(spec.id);
                ConfigOutcome::Staged
            },
            (ParamKind::Text, 1) => {
                if self.staged_param != Some(spec.id) {
                    debug!(
                        "Second half of '{}' without its first half ignored",
                        spec.name
                    );
                    return ConfigOutcome::Ignored;
                }
                self.staged_param = None;
                let data = message.data();
                self.staging[MAX_FRAME_DATA..MAX_FRAME_DATA + data.len()].copy_from_slice(data);
                self.validations += 1;
                let decoded = spec.decode_text(&self.staging);
                self.settle(spec, decoded)
            },
            (ParamKind::Scalar { .. }, 0) if message.length > 0 => {
                self.validations += 1;
                let decoded = spec.decode_scalar(message.data());
                self.settle(spec, decoded)
            },
            _ => ConfigOutcome::Ignored,
        }
    }

    fn settle(&self, spec: &ParamSpec, decoded: Result<ConfigValue, String>) -> ConfigOutcome {
        let value = match decoded {
            Ok(value) => value,
            Err(reason) => return self.reject(spec, reason),
        };
        match self.store.apply(spec.id, value.clone()) {
            Ok(previous) => {
                info!(
                    "Config '{}' set to {} (was {})",
                    spec.name,
                    value,
                    previous
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "unset".to_string())
                );
                self.log.config_change(spec, previous.as_ref(), &value);
                ConfigOutcome::Applied(value)
            },
            Err(e) => self.reject(spec, e.to_string()),
        }
    }

    fn reject(&self, spec: &ParamSpec, reason: String) -> ConfigOutcome {
        warn!("Config '{}' rejected: {}", spec.name, reason);
        self.log.config_error(spec.id, &reason);
        ConfigOutcome::Rejected(reason)
    }

    fn commit(&self) -> ConfigOutcome {
        match self.store.commit() {
            Ok(()) => {
                info!("Configuration committed");
                ConfigOutcome::Committed
            },
            Err(e) => {
                warn!("Configuration commit failed: {}", e);
                ConfigOutcome::CommitFailed(e.to_string())
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::protocol::{WireAddress, CONFIG_ID};
    use parking_lot::Mutex;
    use std::collections::BTreeMap;

    #[derive(Default)]
    struct MemoryStore {
        values: Mutex<BTreeMap<u8, ConfigValue>>,
        applies: Mutex<usize>,
        commits: Mutex<usize>,
    }

    impl ConfigStore for MemoryStore {
        fn get(&self, id: u8) -> Option<ConfigValue> {
            self.values.lock().get(&id).cloned()
        }

        fn apply(&self, id: u8, value: ConfigValue) -> Result<Option<ConfigValue>> {
            *self.applies.lock() += 1;
            Ok(self.values.lock().insert(id, value))
        }

        fn commit(&self) -> Result<()> {
            *self.commits.lock() += 1;
            Ok(())
        }

        fn values(&self) -> Vec<(&'static ParamSpec, ConfigValue)> {
            Vec::new()
        }
    }

    #[derive(Default)]
    struct Records {
        changes: Mutex<Vec<String>>,
        errors: Mutex<Vec<u8>>,
    }

    impl LogSink for Records {
        fn command(&self, _message: &CommandMessage) {}

        fn config_change(&self, param: &ParamSpec, _previous: Option<&ConfigValue>, current: &ConfigValue) {
            self.changes.lock().push(format!("{}={}", param.name, current));
        }

        fn config_error(&self, parameter: u8, _reason: &str) {
            self.errors.lock().push(parameter);
        }
    }

    fn msg(parameter: u8, subpacket: u8, data: &[u8]) -> CommandMessage {
        let mut scratch = [0u8; 8];
        scratch[..data.len()].copy_from_slice(data);
        CommandMessage::from_parts(
            WireAddress::new(CONFIG_ID, parameter, subpacket),
            &scratch,
            data.len() as u8,
        )
    }

    fn setup() -> (ConfigAssembler, Arc<MemoryStore>, Arc<Records>) {
        let store = Arc::new(MemoryStore::default());
        let log = Arc::new(Records::default());
        (ConfigAssembler::new(store.clone(), log.clone()), store, log)
    }

    #[test]
    fn test_two_frame_text_validated_once() {
        let (mut asm, store, log) = setup();

        assert_eq!(asm.handle(&msg(1, 0, b"abcdefgh")), ConfigOutcome::Staged);
        assert_eq!(asm.validations(), 0);

        let outcome = asm.handle(&msg(1, 1, b"ijklmnop"));
        match outcome {
            ConfigOutcome::Rejected(reason) => assert!(reason.contains("abcdefghijklmnop")),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(asm.validations(), 1);
        assert_eq!(*store.applies.lock(), 0);
        assert_eq!(*log.errors.lock(), vec![1]);
    }

    #[test]
    fn test_two_frame_text_applied() {
        let (mut asm, store, log) = setup();
        asm.handle(&msg(2, 0, b"SOLAR01."));
        let outcome = asm.handle(&msg(2, 1, b"CSV"));
        assert_eq!(outcome, ConfigOutcome::Applied(ConfigValue::Text("SOLAR01.CSV".into())));
        assert_eq!(store.get(2), Some(ConfigValue::Text("SOLAR01.CSV".into())));
        assert_eq!(*log.changes.lock(), vec!["data_file=\"SOLAR01.CSV\"".to_string()]);
    }

    #[test]
    fn test_new_first_half_overwrites_staging() {
        let (mut asm, store, _) = setup();
        asm.handle(&msg(1, 0, b"OLDNAMEX"));
        asm.handle(&msg(1, 0, b"NEW.LOG"));
        asm.handle(&msg(1, 1, b""));
        assert_eq!(store.get(1), Some(ConfigValue::Text("NEW.LOG".into())));
    }

    #[test]
    fn test_second_half_for_other_parameter_ignored() {
        let (mut asm, _, _) = setup();
        asm.handle(&msg(1, 0, b"A.LOG"));
        assert_eq!(asm.handle(&msg(2, 1, b"")), ConfigOutcome::Ignored);
        assert_eq!(asm.validations(), 0);
    }

    #[test]
    fn test_scalar_rejection_logged_not_applied() {
        let (mut asm, store, log) = setup();
        let outcome = asm.handle(&msg(11, 0, &[150]));
        assert!(matches!(outcome, ConfigOutcome::Rejected(_)));
        assert_eq!(store.get(11), None);
        assert_eq!(*log.errors.lock(), vec![11]);
    }

    #[test]
    fn test_scalar_needs_payload() {
        let (mut asm, _, _) = setup();
        assert_eq!(asm.handle(&msg(11, 0, &[])), ConfigOutcome::Ignored);
        assert_eq!(asm.validations(), 0);
    }

    #[test]
    fn test_commit_subpacket_any_parameter() {
        let (mut asm, store, _) = setup();
        assert_eq!(asm.handle(&msg(0x77, 0xFF, &[])), ConfigOutcome::Committed);
        assert_eq!(*store.commits.lock(), 1);
    }

    #[test]
    fn test_unknown_parameter_ignored() {
        let (mut asm, store, log) = setup();
        assert_eq!(asm.handle(&msg(0x42, 0, &[1])), ConfigOutcome::Ignored);
        assert_eq!(*store.applies.lock(), 0);
        assert!(log.errors.lock().is_empty());
    }
}
