//! Event sources and the sequential drain loop

use crate::error::EventSourceError;
use crate::model::FileArrivalEvent;
use crate::pipeline::Pipeline;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Supplier of file-arrival notifications.
///
/// `next` must be cancel-safe: dropping its future must not lose an event.
#[async_trait]
pub trait EventSource: Send {
    /// Next arrival. `Ok(None)` means the source has ended cleanly; an
    /// error is terminal.
    async fn next(&mut self) -> Result<Option<FileArrivalEvent>, EventSourceError>;
}

/// Event source fed through a channel. Ends when every sender is dropped.
pub struct ChannelSource {
    rx: mpsc::Receiver<FileArrivalEvent>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<FileArrivalEvent>) -> Self {
        Self { rx }
    }

    /// Create a source together with its sending half
    pub fn channel(capacity: usize) -> (mpsc::Sender<FileArrivalEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next(&mut self) -> Result<Option<FileArrivalEvent>, EventSourceError> {
        Ok(self.rx.recv().await)
    }
}

/// Drain `source`, processing one file at a time in arrival order.
///
/// Returns `Ok(())` when `cancel` fires or the source ends, and the source's
/// error otherwise. Per-file failures never end the loop. A run interrupted
/// by cancellation releases its intermediate artifacts but leaves the
/// incoming file in place.
pub async fn run<S>(
    source: &mut S,
    pipeline: &Pipeline,
    cancel: &CancellationToken,
) -> Result<(), EventSourceError>
where
    S: EventSource + ?Sized,
{
    let mut processed: u64 = 0;

    loop {
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("Shutdown requested, stopping after {} file(s)", processed);
                return Ok(());
            }
            next = source.next() => next?,
        };

        let Some(event) = next else {
            info!("Event source ended after {} file(s)", processed);
            return Ok(());
        };

        let path = event.path.clone();
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!(
                    "Shutdown requested while processing {}; it will be left in place",
                    path.display()
                );
                return Ok(());
            }
            _report = pipeline.process(event) => {
                processed += 1;
            }
        }
    }
}
