//! Pull-request producer handle
//!
//! Device drivers and the periodic scheduler push triggers through this
//! handle; the outbound dispatcher does the actual sending.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::protocol::{DeviceId, Trigger};
use crate::queue::QueueSender;

#[derive(Clone)]
pub struct TelemetryPublisher {
    triggers: QueueSender<Trigger>,
}

impl TelemetryPublisher {
    pub fn new(triggers: QueueSender<Trigger>) -> Self {
        Self { triggers }
    }

    /// Request a send of every catalog entry of `device`
    pub fn publish(&self, device: DeviceId) -> bool {
        self.triggers.push(Trigger::Device(device))
    }

    /// Request an event notification with `code`
    pub fn event(&self, code: u8) -> bool {
        self.triggers.push(Trigger::Event(code))
    }

    /// Request the configuration dump
    pub fn config(&self) -> bool {
        self.triggers.push(Trigger::Config)
    }

    /// Publish `devices` in order every `period`
    pub fn spawn_periodic(&self, devices: Vec<DeviceId>, period: Duration) -> JoinHandle<()> {
        let publisher = self.clone();
        tokio::spawn(async move {
            info!(
                "Telemetry publisher started: {} devices every {}ms",
                devices.len(),
                period.as_millis()
            );
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let queued = devices.iter().filter(|d| publisher.publish(**d)).count();
                if queued < devices.len() {
                    debug!(
                        "Telemetry cycle: {} of {} triggers queued",
                        queued,
                        devices.len()
                    );
                }
            }
        })
    }
}
