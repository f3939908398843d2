//! Bounded queue between the tree walker and the ingestion consumer.
//!
//! A thin wrapper over `tokio::sync::mpsc` with explicit close semantics:
//!
//! - [`QueueSender::send`] suspends while the queue is full (backpressure);
//! - [`QueueSender::close`] (or dropping the sender) closes the queue;
//! - [`QueueReceiver::recv`] yields items in arrival order and returns
//!   `None` once the queue is closed **and** drained.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

/// Default number of in-flight entries.
pub const DEFAULT_CAPACITY: usize = 100;

/// The receiving side went away; the item was not delivered.
#[derive(Debug, Error)]
#[error("queue receiver dropped")]
pub struct QueueClosed;

/// Create a bounded queue holding at most `capacity` items (minimum 1).
pub fn bounded<T>(capacity: usize) -> (QueueSender<T>, QueueReceiver<T>) {
    let capacity = capacity.max(1);
    let (tx, rx) = mpsc::channel(capacity);
    let closed = Arc::new(AtomicBool::new(false));
    (
        QueueSender {
            tx,
            closed: closed.clone(),
        },
        QueueReceiver {
            rx,
            closed,
            capacity,
        },
    )
}

/// Producer handle. Closing happens on [`close`](Self::close) or drop.
#[derive(Debug)]
pub struct QueueSender<T> {
    tx: mpsc::Sender<T>,
    closed: Arc<AtomicBool>,
}

impl<T> QueueSender<T> {
    /// Enqueue `item`, waiting while the queue is full.
    pub async fn send(&self, item: T) -> Result<(), QueueClosed> {
        self.tx.send(item).await.map_err(|_| QueueClosed)
    }

    /// Close the queue. Items already enqueued are still delivered.
    pub fn close(self) {
        drop(self);
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Consumer handle.
#[derive(Debug)]
pub struct QueueReceiver<T> {
    rx: mpsc::Receiver<T>,
    closed: Arc<AtomicBool>,
    capacity: usize,
}

impl<T> QueueReceiver<T> {
    /// Next item in arrival order, or `None` once closed and empty.
    pub async fn recv(&mut self) -> Option<T> {
        self.rx.recv().await
    }

    /// True once the producer has closed the queue (items may remain).
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
