//! Consumer wiring: fans a single broadcast of edit events out to six
//! independent handlers, each implementing the same `EditHandler` contract.
//! Mirrors the teacher's pattern of implementing one small async trait per
//! independent concern rather than one monolithic dispatcher.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};
use wikisurge_core::editwar::EditWarDetector;
use wikisurge_core::hotpage::HotPageTracker;
use wikisurge_core::metrics;
use wikisurge_core::spike::SpikeDetector;
use wikisurge_core::stats::StatsRecorder;
use wikisurge_core::store::Store;
use wikisurge_core::trending::TrendingScorer;
use wikisurge_core::{EditEvent, Result};

/// `Process(ctx, edit) -> Result<()>` from the external-interfaces contract.
/// A non-`Ok` return signals the bus the event may be retried or
/// dead-lettered, at the bus's discretion; handlers do not decide that
/// themselves.
#[async_trait]
pub trait EditHandler: Send + Sync {
    async fn process(&self, cancel: &CancellationToken, edit: &EditEvent) -> Result<()>;
}

pub struct HotPageHandler {
    pub tracker: Arc<HotPageTracker>,
}

#[async_trait]
impl EditHandler for HotPageHandler {
    async fn process(&self, _cancel: &CancellationToken, edit: &EditEvent) -> Result<()> {
        self.tracker.observe(edit).await
    }
}

pub struct TrendingHandler {
    pub scorer: Arc<TrendingScorer>,
}

#[async_trait]
impl EditHandler for TrendingHandler {
    async fn process(&self, _cancel: &CancellationToken, edit: &EditEvent) -> Result<()> {
        let is_new_page = edit.old_revision_id.is_none();
        self.scorer.record(edit, is_new_page).await
    }
}

pub struct SpikeHandler {
    pub detector: Arc<SpikeDetector>,
}

#[async_trait]
impl EditHandler for SpikeHandler {
    async fn process(&self, _cancel: &CancellationToken, edit: &EditEvent) -> Result<()> {
        if self.detector.observe(edit).await?.is_some() {
            metrics::registry().record_spike_emitted();
        }
        Ok(())
    }
}

pub struct EditWarHandler {
    pub detector: Arc<EditWarDetector>,
}

#[async_trait]
impl EditHandler for EditWarHandler {
    async fn process(&self, _cancel: &CancellationToken, edit: &EditEvent) -> Result<()> {
        if self.detector.observe(edit).await?.is_some() {
            metrics::registry().record_war_emitted();
        }
        Ok(())
    }
}

pub struct StatsHandler {
    pub recorder: Arc<StatsRecorder>,
}

#[async_trait]
impl EditHandler for StatsHandler {
    async fn process(&self, _cancel: &CancellationToken, edit: &EditEvent) -> Result<()> {
        self.recorder.record(edit).await
    }
}

/// Publishes every processed edit on `wikisurge:edits:live` and invokes a
/// local broadcaster so same-process WebSocket clients don't round-trip
/// through Redis pub/sub for their own traffic.
pub trait BroadcastEditFiltered: Send + Sync {
    fn broadcast(&self, edit: &EditEvent);
}

pub struct LiveFeedHandler {
    pub store: Store,
    pub local: Arc<dyn BroadcastEditFiltered>,
}

const LIVE_FEED_CHANNEL: &str = "wikisurge:edits:live";

#[async_trait]
impl EditHandler for LiveFeedHandler {
    async fn process(&self, _cancel: &CancellationToken, edit: &EditEvent) -> Result<()> {
        let payload = serde_json::to_string(edit)?;
        self.store.publish(LIVE_FEED_CHANNEL, &payload).await?;
        self.local.broadcast(edit);
        Ok(())
    }
}

/// Runs all registered handlers concurrently against one edit, logging (but not
/// propagating) individual handler failures so one handler's transient
/// error never blocks the others or halts the consumer loop.
pub async fn fan_out(handlers: &[Arc<dyn EditHandler>], cancel: &CancellationToken, edit: &EditEvent) {
    let futures = handlers.iter().map(|handler| {
        let cancel = cancel.clone();
        async move {
            if let Err(err) = handler.process(&cancel, edit).await {
                warn!(error = %err, page = %edit.title, "edit handler failed");
            }
        }
    });
    futures::future::join_all(futures).await;
    metrics::registry().record_edit_processed();
}

/// Consumer loop: pulls edits off the broadcast channel and fans each one
/// out to every registered handler until the channel closes or
/// cancellation fires.
pub async fn run_consumer(
    mut rx: broadcast::Receiver<EditEvent>,
    handlers: Vec<Arc<dyn EditHandler>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = rx.recv() => {
                match received {
                    Ok(edit) => fan_out(&handlers, &cancel, &edit).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "edit consumer lagged behind the broadcast channel");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        error!("edit broadcast channel closed, stopping consumer");
                        break;
                    }
                }
            }
        }
    }
}
