//! Shared plumbing for the station services
//!
//! - logging bootstrap and the daily rolling file writer
//! - layered configuration loading
//! - shutdown signal handling

pub mod config_loader;
pub mod error;
pub mod logging;
pub mod shutdown;

pub use error::{Error, Result};
