//! Bounded, lossy hand-off between pipeline stages.
//!
//! Producers never block: when the queue is full the *new* item is dropped
//! and counted. Consumers block until an item arrives or every producer is
//! gone.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use anyhow::{Result, bail};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// Result of a non-blocking push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queue was full; the item was discarded.
    Dropped,
    /// The consumer is gone; the item was discarded.
    Closed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pushed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    pushed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> QueueStats {
        QueueStats {
            pushed: self.pushed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct QueueSender<T> {
    tx: Sender<T>,
    name: &'static str,
    counters: Arc<Counters>,
}

pub struct QueueReceiver<T> {
    rx: Receiver<T>,
    name: &'static str,
    counters: Arc<Counters>,
}

/// Create a named queue holding at most `capacity` items.
pub fn bounded_queue<T>(
    name: &'static str,
    capacity: usize,
) -> Result<(QueueSender<T>, QueueReceiver<T>)> {
    if capacity == 0 {
        bail!("queue {name} needs a capacity of at least 1");
    }
    let (tx, rx) = bounded(capacity);
    let counters = Arc::new(Counters::default());
    Ok((
        QueueSender {
            tx,
            name,
            counters: counters.clone(),
        },
        QueueReceiver { rx, name, counters },
    ))
}

impl<T> QueueSender<T> {
    pub fn push(&self, item: T) -> PushOutcome {
        let outcome = match self.tx.try_send(item) {
            Ok(()) => {
                self.counters.pushed.fetch_add(1, Ordering::Relaxed);
                PushOutcome::Queued
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("facecast_queue_dropped_total", "queue" => self.name)
                    .increment(1);
                PushOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => PushOutcome::Closed,
        };
        metrics::gauge!("facecast_queue_depth", "queue" => self.name).set(self.tx.len() as f64);
        outcome
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

impl<T> Clone for QueueSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
            counters: self.counters.clone(),
        }
    }
}

impl<T> QueueReceiver<T> {
    /// Block until an item is available; `None` once all senders are dropped
    /// and the queue is drained.
    pub fn pop(&self) -> Option<T> {
        let item = self.rx.recv().ok();
        metrics::gauge!("facecast_queue_depth", "queue" => self.name).set(self.rx.len() as f64);
        item
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(bounded_queue::<u32>("empty", 0).is_err());
    }

    #[test]
    fn full_queue_drops_newest_and_keeps_order() {
        let (tx, rx) = bounded_queue("frames", 4).unwrap();
        let outcomes: Vec<_> = (1..=5).map(|i| tx.push(i)).collect();
        assert_eq!(&outcomes[..4], &[PushOutcome::Queued; 4]);
        assert_eq!(outcomes[4], PushOutcome::Dropped);
        assert_eq!(tx.len(), 4);
        assert_eq!(
            tx.stats(),
            QueueStats {
                pushed: 4,
                dropped: 1
            }
        );

        drop(tx);
        let drained: Vec<_> = std::iter::from_fn(|| rx.pop()).collect();
        assert_eq!(drained, vec![1, 2, 3, 4]);
        assert_eq!(rx.pop(), None);
    }

    #[test]
    fn push_after_consumer_dropped_reports_closed() {
        let (tx, rx) = bounded_queue("output", 2).unwrap();
        drop(rx);
        assert_eq!(tx.push("late"), PushOutcome::Closed);
        assert_eq!(tx.stats().dropped, 0);
    }

    #[test]
    fn pop_blocks_until_item_arrives() {
        let (tx, rx) = bounded_queue("frames", 1).unwrap();
        let consumer = std::thread::spawn(move || rx.pop());
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert_eq!(tx.push(7u8), PushOutcome::Queued);
        assert_eq!(consumer.join().unwrap(), Some(7));
    }
}
