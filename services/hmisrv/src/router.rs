//! Inbound frame router
//!
//! Runs in the receive-interrupt context of the link driver: fixed-size
//! copies and non-blocking queue pushes only. Overflowing queues drop the
//! item; the sender is never told.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use crate::protocol::constants::{EXTENDED_ID_MASK, MAX_FRAME_DATA};
use crate::protocol::{Addressed, CanFrame, CommandMessage, HexId, Trigger, CONFIG_ID};
use crate::queue::QueueSender;
use crate::transport::TxCompletion;

/// Router counters, readable from any context
#[derive(Debug, Default)]
pub struct RouterStats {
    pub received: AtomicU64,
    pub events: AtomicU64,
    pub config_requests: AtomicU64,
    pub commands: AtomicU64,
    pub ignored: AtomicU64,
}

pub struct InboundRouter {
    triggers: QueueSender<Trigger>,
    commands: QueueSender<CommandMessage>,
    completion: TxCompletion,
    stats: RouterStats,
}

impl InboundRouter {
    pub fn new(
        triggers: QueueSender<Trigger>,
        commands: QueueSender<CommandMessage>,
        completion: TxCompletion,
    ) -> Self {
        Self {
            triggers,
            commands,
            completion,
            stats: RouterStats::default(),
        }
    }

    /// Frame-received event
    pub fn on_frame_received(&self, frame: &CanFrame) {
        self.stats.received.fetch_add(1, Ordering::Relaxed);

        let mut scratch = [0u8; MAX_FRAME_DATA];
        let len = (frame.len as usize).min(MAX_FRAME_DATA);
        scratch[..len].copy_from_slice(&frame.data[..len]);

        match Addressed::classify(frame.id & EXTENDED_ID_MASK) {
            Addressed::Event(event) => {
                self.stats.events.fetch_add(1, Ordering::Relaxed);
                self.triggers.push(Trigger::Event(event.code));
            },
            Addressed::Data(address) => {
                if address.device == CONFIG_ID && frame.remote {
                    self.stats.config_requests.fetch_add(1, Ordering::Relaxed);
                    self.triggers.push(Trigger::Config);
                    return;
                }
                if address.device == 0 {
                    self.stats.ignored.fetch_add(1, Ordering::Relaxed);
                    trace!(id = %HexId(frame.id), "Frame without device ignored");
                    return;
                }
                self.stats.commands.fetch_add(1, Ordering::Relaxed);
                self.commands
                    .push(CommandMessage::from_parts(address, &scratch, len as u8));
            },
        }
    }

    /// Frame-send-complete event
    pub fn on_transmit_complete(&self) {
        self.completion.release();
    }

    /// Completion handle for drivers that finish transmits themselves
    pub fn completion(&self) -> TxCompletion {
        self.completion.clone()
    }

    pub fn stats(&self) -> &RouterStats {
        &self.stats
    }

    /// Items lost to full queues: `(triggers, commands)`
    pub fn dropped(&self) -> (u64, u64) {
        (self.triggers.dropped(), self.commands.dropped())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::protocol::{encode, DeviceId, LOG_ID};
    use crate::queue::{bounded, QueueReceiver};

    fn router_with_queues(
        trigger_cap: usize,
        command_cap: usize,
    ) -> (
        InboundRouter,
        QueueReceiver<Trigger>,
        QueueReceiver<CommandMessage>,
    ) {
        let (ttx, trx) = bounded("triggers", trigger_cap);
        let (ctx, crx) = bounded("commands", command_cap);
        (InboundRouter::new(ttx, ctx, TxCompletion::new()), trx, crx)
    }

    #[test]
    fn test_config_remote_request_becomes_trigger() {
        let (router, mut triggers, mut commands) = router_with_queues(4, 4);
        router.on_frame_received(&CanFrame::remote(encode(CONFIG_ID, 0, 0)));

        assert!(matches!(triggers.try_pop(), Some(Trigger::Config)));
        assert!(commands.try_pop().is_none());
    }

    #[test]
    fn test_config_data_frame_becomes_command() {
        let (router, mut triggers, mut commands) = router_with_queues(4, 4);
        router.on_frame_received(&CanFrame::new(encode(CONFIG_ID, 5, 0), &[42]));

        let cmd = commands.try_pop().unwrap();
        assert_eq!((cmd.device, cmd.parameter, cmd.subpacket), (CONFIG_ID, 5, 0));
        assert_eq!(cmd.data(), &[42]);
        assert!(triggers.try_pop().is_none());
    }

    #[test]
    fn test_log_frame_extracts_event_code() {
        let (router, mut triggers, mut commands) = router_with_queues(4, 4);
        router.on_frame_received(&CanFrame::new(encode(LOG_ID, 0, 0x2A), &[]));

        assert!(matches!(triggers.try_pop(), Some(Trigger::Event(0x2A))));
        assert!(commands.try_pop().is_none());
    }

    #[test]
    fn test_device_zero_ignored() {
        let (router, mut triggers, mut commands) = router_with_queues(4, 4);
        router.on_frame_received(&CanFrame::new(encode(0, 1, 2), &[1, 2, 3]));

        assert!(triggers.try_pop().is_none());
        assert!(commands.try_pop().is_none());
        assert_eq!(router.stats().ignored.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_command_payload_copied() {
        let (router, _triggers, mut commands) = router_with_queues(4, 4);
        let id = encode(DeviceId::Generator.raw(), 0, 0);
        router.on_frame_received(&CanFrame::new(id, &[0x01, 0x02, 0x03, 0x04, 0x05]));

        let cmd = commands.try_pop().unwrap();
        assert_eq!(cmd.length, 5);
        assert_eq!(cmd.payload, [1, 2, 3, 4, 5, 0, 0, 0]);
    }

    #[test]
    fn test_full_command_queue_drops_silently() {
        let (router, _triggers, mut commands) = router_with_queues(4, 2);
        let id = encode(DeviceId::Relays.raw(), 0, 0);
        for i in 0..5u8 {
            router.on_frame_received(&CanFrame::new(id, &[i]));
        }

        assert_eq!(router.dropped(), (0, 3));
        assert_eq!(commands.try_pop().unwrap().data(), &[0]);
        assert_eq!(commands.try_pop().unwrap().data(), &[1]);
        assert!(commands.try_pop().is_none());
    }

    #[test]
    fn test_reserved_id_bits_masked() {
        let (router, _triggers, mut commands) = router_with_queues(4, 4);
        router.on_frame_received(&CanFrame::new(0xE000_0000 | encode(0x06, 0, 0), &[1]));
        assert_eq!(commands.try_pop().unwrap().device, 0x06);
    }
}
