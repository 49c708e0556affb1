//! CAN link driver interface

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::trace;

use super::flow::TxCompletion;
use crate::error::Result;
use crate::protocol::{CanFrame, HexId};

/// Link driver consumed by the transmit flow controller.
///
/// `transmit` starts sending one frame and returns without waiting for the
/// bus. The driver reports completion through the router (or directly
/// through a [`TxCompletion`]) once the frame has left the controller.
pub trait CanLink: Send + Sync {
    fn transmit(&self, frame: &CanFrame) -> Result<()>;
}

/// Link without hardware: logs each frame and completes it immediately
pub struct SimulatedLink {
    completion: TxCompletion,
    frames: AtomicU64,
}

impl SimulatedLink {
    pub fn new(completion: TxCompletion) -> Self {
        Self {
            completion,
            frames: AtomicU64::new(0),
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl CanLink for SimulatedLink {
    fn transmit(&self, frame: &CanFrame) -> Result<()> {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(
            "SIM TX #{} id={} data={}",
            n,
            HexId(frame.id),
            hex_bytes(frame.payload())
        );
        self.completion.release();
        Ok(())
    }
}

/// Uppercase space-separated hex, e.g. `01 A0 FF`
pub fn hex_bytes(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::transport::flow::TxFlowControl;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_simulated_link_completes_immediately() {
        let completion = TxCompletion::new();
        let link = Arc::new(SimulatedLink::new(completion.clone()));
        let flow = TxFlowControl::new(link.clone(), &completion);

        flow.send(0x0001_0000, &[1, 2, 3]).await;
        flow.send(0x0001_0001, &[4]).await;

        assert_eq!(link.frames(), 2);
        assert_eq!(flow.stats().errors(), 0);
    }

    #[test]
    fn test_hex_bytes() {
        assert_eq!(hex_bytes(&[0x01, 0xA0, 0xFF]), "01 A0 FF");
        assert_eq!(hex_bytes(&[]), "");
    }
}
