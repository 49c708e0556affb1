//! Bounded FIFO queues between the router and the two engine tasks
//!
//! Pushing never blocks and is safe from interrupt context: a full queue
//! drops the item and bumps a counter. Popping suspends the consuming task
//! until an item arrives.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Create a queue holding at most `capacity` items
pub fn bounded<T>(name: &'static str, capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    (
        QueueSender {
            name,
            tx,
            dropped: Arc::clone(&dropped),
        },
        QueueReceiver { name, rx, dropped },
    )
}

/// Producer side; cheap to clone, one per producing context
pub struct QueueSender<T> {
    name: &'static str,
    tx: mpsc::Sender<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<T> QueueSender<T> {
    /// Non-blocking push. Returns `false` when the item was dropped.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(queue = self.name, total, "Queue full, item dropped");
                false
            },
            Err(TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            },
        }
    }

    /// Items dropped since creation, over all producers
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Consumer side, owned by exactly one task
pub struct QueueReceiver<T> {
    name: &'static str,
    rx: mpsc::Receiver<T>,
    dropped: Arc<AtomicU64>,
}

impl<T> QueueReceiver<T> {
    /// Wait for the next item. `None` once every sender is gone.
    pub async fn pop(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// Next item if one is already queued
    pub fn try_pop(&mut self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut rx) = bounded("test", 4);
        for i in 0..3 {
            assert!(tx.push(i));
        }
        assert_eq!(rx.pop().await, Some(0));
        assert_eq!(rx.pop().await, Some(1));
        assert_eq!(rx.pop().await, Some(2));
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let (tx, mut rx) = bounded("test", 2);
        assert!(tx.push(1));
        assert!(tx.push(2));
        assert!(!tx.push(3));
        assert_eq!(tx.dropped(), 1);
        assert_eq!(rx.dropped(), 1);

        assert_eq!(rx.pop().await, Some(1));
        assert_eq!(rx.pop().await, Some(2));
        assert_eq!(rx.try_pop(), None);
    }

    #[tokio::test]
    async fn test_push_from_plain_thread() {
        let (tx, mut rx) = bounded("test", 8);
        let producer = tx.clone();
        std::thread::spawn(move || {
            assert!(producer.push(42u32));
        })
        .join()
        .unwrap();
        assert_eq!(rx.pop().await, Some(42));
    }

    #[tokio::test]
    async fn test_pop_ends_when_senders_gone() {
        let (tx, mut rx) = bounded::<u8>("test", 1);
        drop(tx);
        assert_eq!(rx.pop().await, None);
    }
}
