use airweave_entities::Entity;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::error::SourceError;

use super::RunningSource;

/// Wraps a source's raw entity stream in a bounded `mpsc` channel so a slow
/// consumer (the worker pool under backpressure) naturally stalls the
/// source's own polling loop instead of buffering unboundedly in memory —
/// the same `ReceiverStream`/bounded-channel shape the teacher's
/// `refresh_job.rs` pipeline uses for HTTP refresh jobs, generalized here
/// from "jobs" to "arbitrary source entities."
pub struct SourceStream {
    receiver: ReceiverStream<Result<Entity, SourceError>>,
    forwarder: tokio::task::JoinHandle<()>,
}

impl SourceStream {
    /// Spawns a forwarding task that drains `source.generate_entities()`
    /// into the channel, closing it on exhaustion. The forwarding task's
    /// own lifetime is tied to `SourceStream`'s, so dropping the stream
    /// (e.g. on cancellation) stops the forwarder via the receiver side
    /// closing, not an explicit abort.
    pub fn spawn(source: Box<dyn RunningSource>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));

        let forwarder = tokio::spawn(async move {
            let mut entities = source.generate_entities();
            while let Some(item) = entities.next().await {
                let is_err = item.is_err();
                if tx.send(item).await.is_err() {
                    // Receiver dropped (cancellation); stop polling the source.
                    break;
                }
                if is_err {
                    // A terminal source error still closes the stream after
                    // being delivered to the last reader.
                    break;
                }
            }
        });

        Self { receiver: ReceiverStream::new(rx), forwarder }
    }

    pub fn into_stream(self) -> BoxStream<'static, Result<Entity, SourceError>> {
        // `SourceStream` has a custom `Drop` impl, so its fields can't be
        // moved out of `self` directly. Take them via `ManuallyDrop` instead
        // of running that `Drop` impl (which would wrongly abort the
        // still-wanted forwarder task).
        let mut this = std::mem::ManuallyDrop::new(self);
        let receiver = unsafe { std::ptr::read(&this.receiver) };
        unsafe { std::ptr::drop_in_place(&mut this.forwarder) };
        Box::pin(receiver)
    }
}

impl Drop for SourceStream {
    fn drop(&mut self) {
        if !self.forwarder.is_finished() {
            self.forwarder.abort();
            warn!("source stream dropped with forwarder still running; aborted");
        }
    }
}
