//! Transmit flow control
//!
//! At most one frame is in flight on the link. A single-count permit is
//! released by the driver's completion event and consumed by
//! [`TxFlowControl::send_frame`], so frame N+1 starts only after the
//! hardware confirmed frame N.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{trace, warn};

use super::link::CanLink;
use crate::protocol::{CanFrame, HexId};

/// Completion side of the permit, handed to the link driver / router.
///
/// Never blocks; safe to call from interrupt context.
#[derive(Clone)]
pub struct TxCompletion {
    permit: Arc<Semaphore>,
}

impl TxCompletion {
    pub fn new() -> Self {
        Self {
            permit: Arc::new(Semaphore::new(0)),
        }
    }

    /// Grant the permit back after a frame left the controller
    pub fn release(&self) {
        // binary permit: repeated completions do not accumulate
        if self.permit.available_permits() == 0 {
            self.permit.add_permits(1);
        }
    }
}

impl Default for TxCompletion {
    fn default() -> Self {
        Self::new()
    }
}

/// Transmit counters
#[derive(Debug, Default)]
pub struct TxStats {
    sent: AtomicU64,
    errors: AtomicU64,
}

impl TxStats {
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Serializes frame emission onto one link
pub struct TxFlowControl {
    link: Arc<dyn CanLink>,
    permit: Arc<Semaphore>,
    stats: Arc<TxStats>,
}

impl TxFlowControl {
    pub fn new(link: Arc<dyn CanLink>, completion: &TxCompletion) -> Self {
        Self {
            link,
            permit: Arc::clone(&completion.permit),
            stats: Arc::new(TxStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<TxStats> {
        Arc::clone(&self.stats)
    }

    /// Emit one data frame and wait for its completion
    pub async fn send(&self, id: u32, data: &[u8]) {
        self.send_frame(&CanFrame::new(id, data)).await;
    }

    /// Emit one frame and wait for its completion.
    ///
    /// An immediate driver failure is counted and returns without waiting:
    /// nothing is in flight, so no completion will follow.
    pub async fn send_frame(&self, frame: &CanFrame) {
        // discard a stale completion left over from an earlier frame
        while let Ok(permit) = self.permit.try_acquire() {
            permit.forget();
        }

        let sent = self.stats.sent.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(id = %HexId(frame.id), len = frame.len, sent, "TX");

        if let Err(e) = self.link.transmit(frame) {
            let errors = self.stats.errors.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                id = %HexId(frame.id),
                errors, "Frame transmit failed: {}", e
            );
            return;
        }

        if let Ok(permit) = self.permit.acquire().await {
            permit.forget();
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::error::{HmiSrvError, Result};
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    /// Completes each frame from another task after a delay and records
    /// whether a transmit ever started while one was still in flight
    struct DelayedLink {
        completion: TxCompletion,
        in_flight: Arc<AtomicBool>,
        overlapped: Arc<AtomicBool>,
        sent: Mutex<Vec<u32>>,
    }

    impl CanLink for DelayedLink {
        fn transmit(&self, frame: &CanFrame) -> Result<()> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            self.sent.lock().push(frame.id);
            let completion = self.completion.clone();
            let in_flight = Arc::clone(&self.in_flight);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.store(false, Ordering::SeqCst);
                completion.release();
            });
            Ok(())
        }
    }

    struct FailingLink;

    impl CanLink for FailingLink {
        fn transmit(&self, _frame: &CanFrame) -> Result<()> {
            Err(HmiSrvError::link("bus off"))
        }
    }

    #[tokio::test]
    async fn test_frames_never_overlap() {
        let completion = TxCompletion::new();
        let link = Arc::new(DelayedLink {
            completion: completion.clone(),
            in_flight: Arc::new(AtomicBool::new(false)),
            overlapped: Arc::new(AtomicBool::new(false)),
            sent: Mutex::new(Vec::new()),
        });
        let flow = TxFlowControl::new(link.clone(), &completion);

        for id in 0..5u32 {
            flow.send(id, &[id as u8]).await;
            // send returned, so the hardware acknowledged this frame
            assert!(!link.in_flight.load(Ordering::SeqCst));
        }

        assert!(!link.overlapped.load(Ordering::SeqCst));
        assert_eq!(*link.sent.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(flow.stats().sent(), 5);
        assert_eq!(flow.stats().errors(), 0);
    }

    #[tokio::test]
    async fn test_stale_completion_is_discarded() {
        let completion = TxCompletion::new();
        let link = Arc::new(DelayedLink {
            completion: completion.clone(),
            in_flight: Arc::new(AtomicBool::new(false)),
            overlapped: Arc::new(AtomicBool::new(false)),
            sent: Mutex::new(Vec::new()),
        });
        let flow = TxFlowControl::new(link.clone(), &completion);

        // spurious completion before anything was sent
        completion.release();
        completion.release();

        flow.send(7, &[]).await;
        assert!(!link.in_flight.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_driver_failure_counted() {
        let completion = TxCompletion::new();
        let flow = TxFlowControl::new(Arc::new(FailingLink), &completion);

        tokio::time::timeout(Duration::from_secs(1), flow.send(1, &[0xAA]))
            .await
            .unwrap();
        flow.send(2, &[0xBB]).await;

        assert_eq!(flow.stats().sent(), 2);
        assert_eq!(flow.stats().errors(), 2);
    }
}
