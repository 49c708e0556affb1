//! Configuration parameters: metadata, two-frame assembly, durable store

pub mod assembler;
pub mod params;
pub mod store;

pub use assembler::{ConfigAssembler, ConfigOutcome};
pub use params::{ConfigValue, ParamKind, ParamSpec, PARAMS};
pub use store::{ConfigStore, FileConfigStore};
