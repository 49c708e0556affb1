//! HMI link wire protocol: addresses, devices, frames

pub mod address;
pub mod constants;
pub mod device;
pub mod frame;

pub use address::{decode, encode, Addressed, EventAddress, WireAddress};
pub use device::{DeviceId, CONFIG_ID, LOG_ID};
pub use frame::{CanFrame, CommandMessage, HexId, Trigger};
