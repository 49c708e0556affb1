//! Command processor task
//!
//! Sole consumer of the command queue. Per message, in this order:
//! 1. parameter 0: direct device command via the route table
//! 2. MODBUS request device: tunnel reassembly, execution, answer trigger
//! 3. command logbook record (every message)
//! 4. config device: configuration assembler
//!
//! Being the only consumer serializes all tunnel and staging state.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::dispatch::{self, DeviceControl};
use crate::logbook::LogSink;
use crate::modbus::{
    execute_with_retry, AnswerEcho, ModbusExecutor, ModbusStatus, TunnelAnswer, TunnelProgress,
    TunnelState,
};
use crate::protocol::constants::CNT_REPEAT_REQST;
use crate::protocol::{CommandMessage, DeviceId, Trigger, CONFIG_ID};
use crate::queue::{QueueReceiver, QueueSender};
use crate::settings::ConfigAssembler;

#[derive(Debug, Default)]
pub struct ProcessorStats {
    pub processed: AtomicU64,
    pub actions: AtomicU64,
    pub action_failures: AtomicU64,
    pub tunnel_requests: AtomicU64,
    pub tunnel_failures: AtomicU64,
}

pub struct CommandProcessor {
    commands: QueueReceiver<CommandMessage>,
    triggers: QueueSender<Trigger>,
    control: Arc<dyn DeviceControl>,
    executor: Box<dyn ModbusExecutor>,
    tunnel: TunnelState,
    assembler: ConfigAssembler,
    log: Arc<dyn LogSink>,
    stats: Arc<ProcessorStats>,
}

impl CommandProcessor {
    pub fn new(
        commands: QueueReceiver<CommandMessage>,
        triggers: QueueSender<Trigger>,
        control: Arc<dyn DeviceControl>,
        executor: Box<dyn ModbusExecutor>,
        assembler: ConfigAssembler,
        log: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            commands,
            triggers,
            control,
            executor,
            tunnel: TunnelState::new(),
            assembler,
            log,
            stats: Arc::new(ProcessorStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    pub async fn run(mut self) {
        info!(
            "Command processor started (executor: {})",
            self.executor.name()
        );
        while let Some(message) = self.commands.pop().await {
            self.process(message).await;
        }
        info!("Queue '{}' closed, processor stopped", self.commands.name());
    }

    pub async fn process(&mut self, message: CommandMessage) {
        if message.parameter == 0 {
            self.dispatch(&message);
        }
        if message.device == DeviceId::ModbusRequest.raw() {
            self.tunnel(&message).await;
        }
        self.log.command(&message);
        if message.device == CONFIG_ID {
            let outcome = self.assembler.handle(&message);
            debug!(
                param = message.parameter,
                sub = message.subpacket,
                "Config frame: {:?}",
                outcome
            );
        }
        self.stats.processed.fetch_add(1, Ordering::Relaxed);
    }

    fn dispatch(&self, message: &CommandMessage) {
        let Some((device, action)) = dispatch::lookup(message) else {
            return;
        };
        let args = message.data().get(1..).unwrap_or_default();
        match self.control.perform(device, action, args) {
            Ok(()) => {
                self.stats.actions.fetch_add(1, Ordering::Relaxed);
                // report the new state without waiting for the next cycle
                self.triggers.push(Trigger::Device(device));
            },
            Err(e) => {
                self.stats.action_failures.fetch_add(1, Ordering::Relaxed);
                warn!("{}: {:?} failed: {}", device, action, e);
            },
        }
    }

    async fn tunnel(&mut self, message: &CommandMessage) {
        match self.tunnel.accept(message.subpacket, message.data()) {
            TunnelProgress::Ignored => {
                debug!(sub = message.subpacket, "Tunnel frame without request start");
                return;
            },
            TunnelProgress::Accumulating { remaining } => {
                debug!(sub = message.subpacket, remaining, "Tunnel request accumulating");
                return;
            },
            TunnelProgress::Ready => {},
        }

        self.stats.tunnel_requests.fetch_add(1, Ordering::Relaxed);
        let answer = match self.tunnel.take_request() {
            Ok(request) => {
                let (reply, attempts) =
                    execute_with_retry(self.executor.as_mut(), &request, CNT_REPEAT_REQST).await;
                debug!(
                    slave = request.slave,
                    status = %reply.status,
                    attempts,
                    "Tunnel request executed"
                );
                TunnelAnswer::from_reply(AnswerEcho::from(&request), &reply)
            },
            Err(echo) => {
                warn!(slave = echo.slave, "Malformed tunnel request rejected");
                TunnelAnswer::error(echo, ModbusStatus::InvalidRequest)
            },
        };

        if answer.status() != ModbusStatus::Ok {
            self.stats.tunnel_failures.fetch_add(1, Ordering::Relaxed);
        }
        self.triggers.push(Trigger::ModbusAnswer(Box::new(answer)));
    }
}
