//! Fan-in: combine many streams of one type into one.
//!
//! Each input gets its own relay task. A supervisor owns the relays and the
//! output; it closes the output only after joining every relay, so the output
//! is never closed while a relay could still write to it.

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::cancel::Shutdown;
use crate::emit;
use crate::metrics::events::ItemsMerged;
use crate::scope::RunScope;
use crate::stream::{Handoff, StreamRx, StreamTx, channel};

/// Merge `inputs` into a single stream. Order across inputs is unspecified.
///
/// The returned stream closes once every input has closed, or after
/// cancellation once the relays have stopped.
pub fn merge<X>(inputs: Vec<StreamRx<X>>, name: &str, scope: &mut RunScope) -> StreamRx<X>
where
    X: Send + 'static,
{
    let (tx, rx) = channel(scope.capacity());
    let shutdown = scope.shutdown().clone();
    scope.spawn(
        format!("{name}/merge"),
        supervise(inputs, tx, shutdown, name.to_string()),
    );
    rx
}

async fn supervise<X>(inputs: Vec<StreamRx<X>>, output: StreamTx<X>, shutdown: Shutdown, name: String)
where
    X: Send + 'static,
{
    let mut relays = JoinSet::new();
    let input_count = inputs.len();

    for (index, input) in inputs.into_iter().enumerate() {
        relays.spawn(relay(input, output.relay_handle(), shutdown.clone(), index));
    }

    let mut forwarded: u64 = 0;
    while let Some(result) = relays.join_next().await {
        match result {
            Ok(count) => forwarded += count,
            Err(e) => warn!(merge = %name, error = %e, "Merge relay failed"),
        }
    }

    emit!(ItemsMerged {
        count: forwarded,
        merge: name.clone(),
    });
    debug!(merge = %name, inputs = input_count, forwarded, "Merge complete, closing output");
    output.close();
}

async fn relay<X>(input: StreamRx<X>, output: StreamTx<X>, shutdown: Shutdown, index: usize) -> u64 {
    let mut forwarded: u64 = 0;

    while let Some(item) = input.recv(&shutdown).await {
        match output.send(item, &shutdown).await {
            Handoff::Delivered => forwarded += 1,
            Handoff::Cancelled | Handoff::Disconnected => {
                debug!(relay = index, forwarded, "Relay stopping early");
                break;
            }
        }
    }

    forwarded
}
