//! Consumer-side helpers for a run's progress stream.
//!
//! The controller has no internal deadline beyond per-call timeouts; it is
//! the consumer that watches for stalls. [`RunStream`] wraps the event
//! receiver with an inactivity window, and [`reconcile_library_growth`]
//! resolves the dropped-stream case: a stream that closed without a terminal
//! marker is a late success if the library actually grew by the last
//! reported `items_added`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use threadmine_core::{
    Error, ErrorCategory, ItemType, LibraryStore, Result, RunEvent, RunStats,
};

use crate::run::RunHandle;

/// How a drained run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunResolution {
    /// Terminal `complete` with final statistics.
    Completed(RunStats),
    /// Terminal `error`.
    Failed {
        message: String,
        category: ErrorCategory,
        /// Items applied before the failure, if any were reported.
        last_items_added: Option<u64>,
    },
    /// Terminal `phase{stopped}` after cancellation.
    Stopped,
    /// Channel closed without a terminal event (producer crashed or the
    /// transport dropped). Candidate for reconciliation.
    Disconnected { last_items_added: Option<u64> },
}

/// Event stream wrapper enforcing the consumer-side inactivity window.
pub struct RunStream {
    receiver: mpsc::UnboundedReceiver<RunEvent>,
    inactivity_timeout: Duration,
}

impl RunStream {
    pub fn new(receiver: mpsc::UnboundedReceiver<RunEvent>, inactivity_timeout: Duration) -> Self {
        Self {
            receiver,
            inactivity_timeout,
        }
    }

    /// Wrap a run handle with the default inactivity window.
    pub fn from_handle(handle: RunHandle) -> Self {
        Self::new(
            handle.events,
            Duration::from_secs(threadmine_core::defaults::STREAM_INACTIVITY_TIMEOUT_SECS),
        )
    }

    /// Next event, `Ok(None)` when the stream closed, or a timeout error if
    /// nothing arrived within the inactivity window.
    pub async fn next_event(&mut self) -> Result<Option<RunEvent>> {
        match tokio::time::timeout(self.inactivity_timeout, self.receiver.recv()).await {
            Ok(event) => Ok(event),
            Err(_) => Err(Error::Timeout(format!(
                "No run event within the {}s inactivity window",
                self.inactivity_timeout.as_secs()
            ))),
        }
    }

    /// Drain events until a terminal one (or closure), tracking the last
    /// reported `items_added` for reconciliation.
    pub async fn resolve(mut self) -> Result<RunResolution> {
        let mut last_items_added: Option<u64> = None;

        loop {
            match self.next_event().await? {
                Some(RunEvent::Stat { key, value }) if key == "items_added" => {
                    last_items_added = value.as_u64();
                    debug!(items_added = ?last_items_added, "Observed items_added stat");
                }
                Some(RunEvent::Complete { stats }) => {
                    return Ok(RunResolution::Completed(stats));
                }
                Some(RunEvent::Error { message, category }) => {
                    return Ok(RunResolution::Failed {
                        message,
                        category,
                        last_items_added,
                    });
                }
                Some(event) if event.is_terminal() => {
                    // phase{stopped}
                    return Ok(RunResolution::Stopped);
                }
                Some(_) => {}
                None => {
                    warn!("Run stream closed without a terminal event");
                    return Ok(RunResolution::Disconnected { last_items_added });
                }
            }
        }
    }
}

/// The required dropped-stream recovery check.
///
/// Compares the library's current size against its size before the run. If
/// it grew by at least the last reported `items_added`, the run persisted
/// its work and must be treated as a late success, not a failure. A larger
/// increase (another concurrent run also added items) still counts.
pub async fn reconcile_library_growth(
    store: &Arc<dyn LibraryStore>,
    item_type: ItemType,
    baseline_size: i64,
    last_items_added: Option<u64>,
) -> Result<bool> {
    let Some(expected) = last_items_added else {
        // Nothing was reported before the drop; there is no growth claim to
        // verify
        return Ok(false);
    };

    let current = store.count(item_type).await?;
    let grew = current - baseline_size >= expected as i64;
    info!(
        baseline_size,
        current,
        expected,
        late_success = grew,
        "Reconciliation check"
    );
    Ok(grew)
}

#[cfg(test)]
mod tests {
    use super::*;
    use threadmine_core::{events, RunPhase};

    fn stream_with(
        timeout: Duration,
    ) -> (threadmine_core::EventSender, RunStream) {
        let (tx, rx) = events::channel();
        (tx, RunStream::new(rx, timeout))
    }

    #[tokio::test]
    async fn test_resolve_completed() {
        let (tx, stream) = stream_with(Duration::from_secs(5));
        tx.phase(RunPhase::Confirming);
        tx.stat("items_added", 3);
        let mut stats = RunStats::default();
        stats.items_added = 3;
        tx.complete(stats.clone());

        let resolution = stream.resolve().await.unwrap();
        assert_eq!(resolution, RunResolution::Completed(stats));
    }

    #[tokio::test]
    async fn test_resolve_failed_carries_category_and_progress() {
        let (tx, stream) = stream_with(Duration::from_secs(5));
        tx.stat("items_added", 2);
        tx.error(&Error::RateLimited("slow down".to_string()));

        let resolution = stream.resolve().await.unwrap();
        match resolution {
            RunResolution::Failed {
                category,
                last_items_added,
                ..
            } => {
                assert_eq!(category, ErrorCategory::RateLimit);
                assert_eq!(last_items_added, Some(2));
            }
            other => panic!("Expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolve_stopped() {
        let (tx, stream) = stream_with(Duration::from_secs(5));
        tx.phase(RunPhase::Searching);
        tx.phase(RunPhase::Stopped);

        let resolution = stream.resolve().await.unwrap();
        assert_eq!(resolution, RunResolution::Stopped);
    }

    #[tokio::test]
    async fn test_resolve_disconnected_tracks_last_stat() {
        let (tx, stream) = stream_with(Duration::from_secs(5));
        tx.phase(RunPhase::Integrating);
        tx.stat("items_added", 3);
        drop(tx); // producer dies before a terminal event

        let resolution = stream.resolve().await.unwrap();
        assert_eq!(
            resolution,
            RunResolution::Disconnected {
                last_items_added: Some(3)
            }
        );
    }

    #[tokio::test]
    async fn test_inactivity_timeout_surfaces_as_error() {
        let (tx, mut stream) = stream_with(Duration::from_millis(20));
        // Keep the sender alive but silent
        let result = stream.next_event().await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        drop(tx);
    }

    #[tokio::test]
    async fn test_non_terminal_events_do_not_resolve() {
        let (tx, stream) = stream_with(Duration::from_secs(5));
        tx.phase(RunPhase::Searching);
        tx.warning("seed failed");
        tx.cost(100, 20, 0.0);
        tx.complete(RunStats::default());

        let resolution = stream.resolve().await.unwrap();
        assert!(matches!(resolution, RunResolution::Completed(_)));
    }
}
