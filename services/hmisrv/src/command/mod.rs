//! Inbound command handling

pub mod control;
pub mod dispatch;
pub mod processor;

pub use control::SnapshotControl;
pub use dispatch::{DeviceAction, DeviceControl};
pub use processor::{CommandProcessor, ProcessorStats};
