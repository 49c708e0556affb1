//! Link drivers and transmit flow control

pub mod flow;
pub mod link;

#[cfg(all(target_os = "linux", feature = "can-linux"))]
pub mod socketcan;

pub use flow::{TxCompletion, TxFlowControl, TxStats};
pub use link::{CanLink, SimulatedLink};
