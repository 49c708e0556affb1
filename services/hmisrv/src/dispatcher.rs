//! Outbound dispatcher task
//!
//! Sole transmitter on the link. Drains the trigger queue and turns each
//! trigger into frames: catalog telemetry, the configuration dump, event
//! notifications, or a fragmented MODBUS answer. Frames of one trigger go
//! out back to back in order.

use std::sync::Arc;

use tracing::{debug, info};

use crate::modbus::{ModbusStatus, TunnelAnswer};
use crate::protocol::constants::MAX_FRAME_DATA;
use crate::protocol::{encode, DeviceId, EventAddress, Trigger, CONFIG_ID};
use crate::queue::QueueReceiver;
use crate::settings::ConfigStore;
use crate::telemetry::{SharedSnapshot, TelemetryCatalog};
use crate::transport::TxFlowControl;

pub struct OutboundDispatcher {
    triggers: QueueReceiver<Trigger>,
    flow: TxFlowControl,
    catalog: TelemetryCatalog,
    snapshot: SharedSnapshot,
    config: Arc<dyn ConfigStore>,
}

impl OutboundDispatcher {
    pub fn new(
        triggers: QueueReceiver<Trigger>,
        flow: TxFlowControl,
        catalog: TelemetryCatalog,
        snapshot: SharedSnapshot,
        config: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            triggers,
            flow,
            catalog,
            snapshot,
            config,
        }
    }

    pub async fn run(mut self) {
        info!(
            "Outbound dispatcher started ({} catalog entries)",
            self.catalog.len()
        );
        while let Some(trigger) = self.triggers.pop().await {
            self.handle(trigger).await;
        }
        info!("Queue '{}' closed, dispatcher stopped", self.triggers.name());
    }

    pub async fn handle(&mut self, trigger: Trigger) {
        match trigger {
            Trigger::Device(device) => self.send_device_data(device).await,
            Trigger::Config => self.send_config().await,
            Trigger::Event(code) => self.send_event(code).await,
            Trigger::ModbusAnswer(answer) => self.send_answer(&answer).await,
        }
    }

    /// Refresh every catalog entry of `device` and emit them in table order
    pub async fn send_device_data(&mut self, device: DeviceId) {
        {
            let snapshot = self.snapshot.read();
            for entry in self.catalog.entries_mut(device) {
                if let Some(producer) = entry.producer {
                    producer.refresh(&snapshot, &mut entry.buffer);
                }
            }
        }

        let mut frames = 0usize;
        for entry in self.catalog.entries().iter().filter(|e| e.device == device) {
            self.flow
                .send(encode(device.raw(), 0, entry.subpacket), entry.payload())
                .await;
            frames += 1;
        }
        if frames == 0 {
            debug!("No catalog entries for {}", device);
        }
    }

    async fn send_config(&self) {
        let values = self.config.values();
        for (spec, value) in &values {
            for (sub, chunk) in spec.encode(value).iter().enumerate() {
                self.flow.send(encode(CONFIG_ID, spec.id, sub as u8), chunk).await;
            }
        }
        debug!("Configuration dump sent: {} parameters", values.len());
    }

    async fn send_event(&self, code: u8) {
        self.flow.send(EventAddress::for_code(code).to_id(), &[]).await;
    }

    async fn send_answer(&self, answer: &TunnelAnswer) {
        let answer_device = DeviceId::ModbusAnswer.raw();

        if answer.status() != ModbusStatus::Ok {
            self.flow.send(encode(answer_device, 0, 0), answer.header()).await;
            debug!(status = %answer.status(), "MODBUS error answer sent");
            return;
        }

        let mut remaining = answer.bytes();
        let mut subpacket: u8 = 0;
        while !remaining.is_empty() {
            let take = remaining.len().min(MAX_FRAME_DATA);
            let (chunk, rest) = remaining.split_at(take);
            self.flow.send(encode(answer_device, 0, subpacket), chunk).await;
            remaining = rest;
            subpacket = subpacket.wrapping_add(1);
        }
        debug!("MODBUS answer sent: {} bytes", answer.len());
    }
}
