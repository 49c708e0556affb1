//! Error handling for the HMI link service
//!
//! Inside the engine nothing is fatal: link, validation and MODBUS failures
//! are logged and counted by the component that observes them. These errors
//! surface from construction, storage and driver calls.

use thiserror::Error;

/// HMI link service error type
#[derive(Error, Debug, Clone)]
pub enum HmiSrvError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// CAN link driver errors
    #[error("Link error: {0}")]
    LinkError(String),

    /// Wire protocol errors (malformed headers, oversized payloads)
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Durable storage errors
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Value rejected by parameter validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Operation timeout errors
    #[error("Timeout error: {0}")]
    TimeoutError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the HMI link service
pub type Result<T> = std::result::Result<T, HmiSrvError>;

impl HmiSrvError {
    pub fn config(msg: impl Into<String>) -> Self {
        HmiSrvError::ConfigError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        HmiSrvError::IoError(msg.into())
    }

    pub fn link(msg: impl Into<String>) -> Self {
        HmiSrvError::LinkError(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        HmiSrvError::ProtocolError(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        HmiSrvError::StorageError(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        HmiSrvError::ValidationError(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        HmiSrvError::TimeoutError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        HmiSrvError::InternalError(msg.into())
    }
}

impl From<std::io::Error> for HmiSrvError {
    fn from(err: std::io::Error) -> Self {
        HmiSrvError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for HmiSrvError {
    fn from(err: serde_json::Error) -> Self {
        HmiSrvError::StorageError(format!("Serialization: {}", err))
    }
}

impl From<common::Error> for HmiSrvError {
    fn from(err: common::Error) -> Self {
        match err {
            common::Error::Config(msg) => HmiSrvError::ConfigError(msg),
            common::Error::Io(e) => HmiSrvError::IoError(e.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            HmiSrvError::validation("out of range").to_string(),
            "Validation error: out of range"
        );
    }

    #[test]
    fn test_io_conversion() {
        let err: HmiSrvError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, HmiSrvError::IoError(ref m) if m.contains("disk gone")));
    }

    #[test]
    fn test_common_conversion() {
        let err: HmiSrvError = common::Error::Config("bad yaml".to_string()).into();
        assert!(matches!(err, HmiSrvError::ConfigError(ref m) if m == "bad yaml"));
    }
}
