//! Live fan-out to transient subscribers
//!
//! Subscribers receive entries appended after they subscribed, through a
//! bounded broadcast channel. Delivery is best-effort: a subscriber that falls
//! more than `live_capacity` entries behind skips the overflow, and nothing is
//! replayed after a disconnect.

use futures::Stream;
use strata_core::{observe, Entry};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// A live view of one log
pub struct LiveSubscription {
    log: String,
    rx: broadcast::Receiver<Entry>,
    cancel: CancellationToken,
}

impl LiveSubscription {
    pub(crate) fn new(log: &str, rx: broadcast::Receiver<Entry>, cancel: CancellationToken) -> Self {
        Self {
            log: log.to_string(),
            rx,
            cancel,
        }
    }

    pub fn log(&self) -> &str {
        &self.log
    }

    /// Token that ends this subscription when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the next entry. Returns `None` once the subscription is
    /// cancelled or the engine is closed.
    pub async fn next(&mut self) -> Option<Entry> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                received = self.rx.recv() => match received {
                    Ok(entry) => return Some(entry),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(log = %self.log, skipped, "Live subscriber fell behind, entries skipped");
                        observe::record_live_skipped(skipped);
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Adapt into a `futures::Stream`
    pub fn into_stream(self) -> impl Stream<Item = Entry> + Send + 'static {
        futures::stream::unfold(self, |mut sub| async move {
            let entry = sub.next().await?;
            Some((entry, sub))
        })
    }

    /// End the subscription and release its channel slot
    pub fn unsubscribe(self) {
        self.cancel.cancel();
    }
}
