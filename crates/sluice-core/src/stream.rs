//! Typed streams connecting pipeline components.
//!
//! A stream has exactly one owning producer ([`StreamTx`]); dropping it closes
//! the stream. Consumers never close what they read. Every handoff races the
//! run's [`Shutdown`] so a blocked producer or consumer can always be woken.

use crate::cancel::Shutdown;

/// Capacity of a synchronous stream: each send waits for a receiver.
pub const RENDEZVOUS: usize = 0;

/// Outcome of a cancellable send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handoff {
    /// The consumer accepted the item.
    Delivered,
    /// Cancellation was observed first; the item was dropped.
    Cancelled,
    /// Every consumer is gone; the item was dropped.
    Disconnected,
}

impl Handoff {
    pub fn is_delivered(self) -> bool {
        matches!(self, Handoff::Delivered)
    }
}

/// Create a stream with the given buffer capacity (`0` = rendezvous).
pub fn channel<T>(capacity: usize) -> (StreamTx<T>, StreamRx<T>) {
    let (tx, rx) = flume::bounded(capacity);
    (StreamTx { inner: tx }, StreamRx { inner: rx })
}

/// Producer side of a stream. Dropping it closes the stream.
#[derive(Debug)]
pub struct StreamTx<T> {
    inner: flume::Sender<T>,
}

impl<T> StreamTx<T> {
    /// Hand `item` to the consumer unless cancellation is observed first.
    ///
    /// Cancellation is checked before delivery, so nothing is written once
    /// the signal is set.
    pub async fn send(&self, item: T, shutdown: &Shutdown) -> Handoff {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => Handoff::Cancelled,

            result = self.inner.send_async(item) => match result {
                Ok(()) => Handoff::Delivered,
                Err(_) => Handoff::Disconnected,
            },
        }
    }

    /// Close the stream. Equivalent to dropping the sender.
    pub fn close(self) {}

    /// Extra producer handle used by merge relays writing on the supervisor's behalf.
    pub(crate) fn relay_handle(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Consumer side of a stream.
#[derive(Debug)]
pub struct StreamRx<T> {
    inner: flume::Receiver<T>,
}

impl<T> StreamRx<T> {
    /// Receive the next item, or `None` once the stream is closed and drained
    /// or cancellation is observed.
    pub async fn recv(&self, shutdown: &Shutdown) -> Option<T> {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => None,

            result = self.inner.recv_async() => result.ok(),
        }
    }

    /// Receive the next item without racing cancellation.
    ///
    /// Returns `None` immediately once the stream is closed and drained.
    pub async fn recv_any(&self) -> Option<T> {
        self.inner.recv_async().await.ok()
    }

    /// True when the producer is gone and nothing is buffered.
    pub fn is_closed(&self) -> bool {
        self.inner.is_disconnected() && self.inner.is_empty()
    }

    /// Drain every remaining item until the stream closes.
    pub async fn collect(self) -> Vec<T> {
        let mut items = Vec::new();
        while let Some(item) = self.recv_any().await {
            items.push(item);
        }
        items
    }

    /// Additional consumer on the same stream, for fan-out workers.
    ///
    /// Each item is still delivered to exactly one consumer.
    pub(crate) fn share(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}
