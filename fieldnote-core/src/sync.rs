//! Offline sync engine
//!
//! Watches connectivity and re-drives the processing pipeline over notes
//! stuck in `Recorded`. Triggers: the connectivity-regained edge, a
//! periodic timer while online, and startup when already online.
//!
//! Only one sync pass runs at a time; a trigger arriving mid-pass is
//! dropped, not queued. A pass works on the snapshot of pending notes
//! taken at its start (notes recorded during the pass wait for the next
//! trigger) and re-checks each note's status immediately before acting so
//! concurrent changes are never clobbered.

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

use fieldnote_common::{time, AppEvent, EventBus, NoteStatus, Result};

use crate::pipeline::{Pipeline, PipelineError};
use crate::store::notes;

/// Default periodic trigger interval
const SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Notes in the pass snapshot
    pub scanned: usize,
    /// Notes that completed transcribe + match
    pub processed: usize,
    /// Notes additionally filed as issues
    pub submitted: usize,
    /// Notes whose stage failed (eligible again next pass)
    pub failed: usize,
}

/// Replays the processing pipeline whenever connectivity returns
pub struct SyncEngine {
    pool: SqlitePool,
    pipeline: Arc<Pipeline>,
    events: EventBus,
    online_rx: watch::Receiver<bool>,
    pass_guard: Mutex<()>,
    interval: Duration,
}

impl SyncEngine {
    pub fn new(
        pool: SqlitePool,
        pipeline: Arc<Pipeline>,
        events: EventBus,
        online_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            pool,
            pipeline,
            events,
            online_rx,
            pass_guard: Mutex::new(()),
            interval: SYNC_INTERVAL,
        }
    }

    /// Override the periodic interval (tests use short intervals)
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn is_online(&self) -> bool {
        *self.online_rx.borrow()
    }

    /// Run the trigger loop: startup pass, connectivity edges, periodic
    /// timer. Intended for `tokio::spawn`.
    pub async fn run(self: Arc<Self>) {
        if self.is_online() {
            self.trigger("startup").await;
        }

        let mut rx = self.online_rx.clone();
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick fires immediately; consume it so the timer waits a
        // full interval after the startup pass
        ticker.tick().await;

        loop {
            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        // Connectivity source dropped; nothing left to watch
                        return;
                    }
                    let online = *rx.borrow_and_update();
                    self.events.emit_lossy(AppEvent::ConnectivityChanged {
                        online,
                        timestamp: time::now(),
                    });
                    if online {
                        info!("Connectivity regained, starting sync pass");
                        self.trigger("connectivity-regained").await;
                    } else {
                        info!("Connectivity lost");
                    }
                }
                _ = ticker.tick() => {
                    if self.is_online() {
                        self.trigger("periodic").await;
                    }
                }
            }
        }
    }

    async fn trigger(&self, source: &str) {
        match self.sync_pending_notes().await {
            Ok(Some(summary)) if summary.scanned > 0 => {
                info!(
                    "Sync pass ({source}): {}/{} processed, {} submitted, {} failed",
                    summary.processed, summary.scanned, summary.submitted, summary.failed
                );
            }
            Ok(_) => {}
            Err(e) => warn!("Sync pass ({source}) aborted: {e}"),
        }
    }

    /// Execute one sync pass
    ///
    /// Returns `Ok(None)` when the trigger was dropped: another pass is
    /// in flight or the engine is offline.
    pub async fn sync_pending_notes(&self) -> Result<Option<PassSummary>> {
        // Single-in-flight guard: concurrent triggers are dropped
        let Ok(_guard) = self.pass_guard.try_lock() else {
            return Ok(None);
        };

        if !self.is_online() {
            return Ok(None);
        }

        let pending = notes::by_status(&self.pool, NoteStatus::Recorded).await?;
        let mut summary = PassSummary {
            scanned: pending.len(),
            ..Default::default()
        };
        if pending.is_empty() {
            return Ok(Some(summary));
        }

        self.events.emit_lossy(AppEvent::SyncPassStarted {
            pending: pending.len(),
            timestamp: time::now(),
        });

        for note in &pending {
            // Re-check immediately before acting: the user (or a previous
            // iteration) may have advanced or deleted this note
            let current = notes::get(&self.pool, &note.id).await?;
            let Some(current) = current else {
                continue;
            };
            if current.status != NoteStatus::Recorded {
                continue;
            }

            match self.pipeline.run_full_pipeline(&note.id).await {
                Ok(()) => summary.processed += 1,
                Err(PipelineError::Auth(e)) => {
                    // Without tokens every remaining note fails the same
                    // way; abandon the pass and wait for re-auth
                    warn!("Sync pass stopped, session cannot provide tokens: {e}");
                    summary.failed += pending.len() - summary.processed - summary.failed;
                    break;
                }
                Err(e) => {
                    warn!("Sync: note {} failed: {e}", note.id);
                    summary.failed += 1;
                    continue;
                }
            }

            // A note that came out of the pipeline fully processed with a
            // confirmed company also gets submitted
            if let Some(updated) = notes::get(&self.pool, &note.id).await? {
                if updated.status == NoteStatus::Processed && updated.selected_company_id.is_some()
                {
                    match self.pipeline.submit(&note.id).await {
                        Ok(_) => summary.submitted += 1,
                        Err(e) => warn!("Sync: submit of note {} failed: {e}", note.id),
                    }
                }
            }
        }

        self.events.emit_lossy(AppEvent::SyncPassFinished {
            processed: summary.processed,
            submitted: summary.submitted,
            failed: summary.failed,
            timestamp: time::now(),
        });

        Ok(Some(summary))
    }
}

/// Create a connectivity channel
///
/// The application layer owns the sender and flips it on observed
/// online/offline transitions; the engine holds the receiver.
pub fn connectivity_channel(initially_online: bool) -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(initially_online)
}
