//! Station telemetry: live snapshot, frame catalog and trigger publisher

pub mod catalog;
pub mod publisher;
pub mod snapshot;

pub use catalog::{CatalogEntry, Producer, TelemetryCatalog};
pub use publisher::TelemetryPublisher;
pub use snapshot::{SharedSnapshot, StationSnapshot};
