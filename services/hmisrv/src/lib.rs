//! HMI link service
//!
//! Bridges the station firmware and the HMI panel over a CAN bus: periodic
//! telemetry out, device commands in, a fragmented MODBUS tunnel to the
//! field bus, and a parameter store edited over the wire.

pub mod bootstrap;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod logbook;
pub mod modbus;
pub mod protocol;
pub mod queue;
pub mod router;
pub mod settings;
pub mod telemetry;
pub mod transport;

pub use engine::{Engine, EngineParts};
pub use error::{HmiSrvError, Result};
