//! Pipeline sources.
//!
//! A source turns a finite sequence into the first stream of a run. It checks
//! cancellation before every emission and always closes its stream, whether it
//! ran out of items or was cancelled.

use tracing::debug;

use crate::cancel::Shutdown;
use crate::emit;
use crate::metrics::events::ItemsProduced;
use crate::scope::RunScope;
use crate::stream::{Handoff, StreamRx, StreamTx, channel};

/// Something that can feed a pipeline run.
pub trait Source: Send + 'static {
    /// Item type emitted onto the stream.
    type Item: Send + 'static;

    /// Spawn the producer into `scope` and return its stream.
    fn produce(self, scope: &mut RunScope) -> StreamRx<Self::Item>;
}

/// Source backed by any finite iterator, emitted in iteration order.
#[derive(Debug, Clone)]
pub struct IterSource<I> {
    items: I,
}

impl<I> IterSource<I> {
    pub fn new(items: I) -> Self {
        Self { items }
    }
}

impl<I> Source for IterSource<I>
where
    I: IntoIterator + Send + 'static,
    I::IntoIter: Send,
    I::Item: Send + 'static,
{
    type Item = I::Item;

    fn produce(self, scope: &mut RunScope) -> StreamRx<Self::Item> {
        let (tx, rx) = channel(scope.capacity());
        let shutdown = scope.shutdown().clone();
        scope.spawn("source", emit_all(self.items.into_iter(), tx, shutdown));
        rx
    }
}

impl<T: Send + 'static> From<Vec<T>> for IterSource<Vec<T>> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

async fn emit_all<It>(items: It, tx: StreamTx<It::Item>, shutdown: Shutdown)
where
    It: Iterator,
{
    let mut produced: u64 = 0;

    for item in items {
        if shutdown.is_cancelled() {
            debug!(produced, "Source stopping: cancelled");
            break;
        }
        match tx.send(item, &shutdown).await {
            Handoff::Delivered => produced += 1,
            Handoff::Cancelled => {
                debug!(produced, "Source stopping: cancelled during handoff");
                break;
            }
            Handoff::Disconnected => {
                debug!(produced, "Source stopping: downstream closed");
                break;
            }
        }
    }

    emit!(ItemsProduced { count: produced });
    debug!(produced, "Source finished");
    tx.close();
}
