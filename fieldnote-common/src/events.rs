//! Event types for the Fieldnote event system
//!
//! Provides the shared `AppEvent` enum and the `EventBus`. Components that
//! need to react to state changes subscribe explicitly instead of relying on
//! implicit reactivity: the session manager, pipeline, and sync engine emit,
//! and interested consumers (UI layer, logging, tests) register a receiver.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Processing state of a voice note
///
/// A note walks `Recorded → Transcribing → Transcribed → Processing →
/// Processed → Sending → Sent`. `Error` is reachable from any in-flight
/// state and keeps the fields written by completed stages so a manual retry
/// can resume instead of starting over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NoteStatus {
    /// Audio captured, nothing processed yet
    Recorded,
    /// Transcription request in flight
    Transcribing,
    /// Transcription text stored
    Transcribed,
    /// Text enhancement request in flight
    Processing,
    /// Enhanced text + conversation date stored
    Processed,
    /// Issue submission in flight
    Sending,
    /// Issue filed; terminal
    Sent,
    /// A stage failed; `error_message` carries the reason
    Error,
}

impl NoteStatus {
    /// Stable string form used in the `voice_notes.status` column
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteStatus::Recorded => "recorded",
            NoteStatus::Transcribing => "transcribing",
            NoteStatus::Transcribed => "transcribed",
            NoteStatus::Processing => "processing",
            NoteStatus::Processed => "processed",
            NoteStatus::Sending => "sending",
            NoteStatus::Sent => "sent",
            NoteStatus::Error => "error",
        }
    }

    /// Parse the column form back into a status
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "recorded" => Some(NoteStatus::Recorded),
            "transcribing" => Some(NoteStatus::Transcribing),
            "transcribed" => Some(NoteStatus::Transcribed),
            "processing" => Some(NoteStatus::Processing),
            "processed" => Some(NoteStatus::Processed),
            "sending" => Some(NoteStatus::Sending),
            "sent" => Some(NoteStatus::Sent),
            "error" => Some(NoteStatus::Error),
            _ => None,
        }
    }

    /// True for states with a network request in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            NoteStatus::Transcribing | NoteStatus::Processing | NoteStatus::Sending
        )
    }

    /// True once a note can no longer advance
    pub fn is_terminal(&self) -> bool {
        matches!(self, NoteStatus::Sent)
    }

    /// Whether a direct transition to `next` follows the documented graph
    ///
    /// `Error` may re-enter any in-flight state: retries resume from the
    /// last successful stage, whose outputs decide which stage that is.
    pub fn can_advance_to(&self, next: NoteStatus) -> bool {
        use NoteStatus::*;
        match (self, next) {
            (Recorded, Transcribing) => true,
            (Transcribing, Transcribed) => true,
            (Transcribed, Processing) => true,
            (Processing, Processed) => true,
            (Processed, Sending) => true,
            (Sending, Sent) => true,
            // Any non-terminal state may fail (validation rejects a stage
            // before it starts, so failure is not limited to in-flight)
            (from, Error) if !from.is_terminal() => true,
            // Manual retry re-enters the stage matching the note's data
            (Error, Transcribing) | (Error, Processing) | (Error, Sending) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fieldnote application events
///
/// Shared by the session manager, processing pipeline, and sync engine.
/// Events can be serialized for transport to a UI layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AppEvent {
    /// A login or full unlock succeeded
    SessionAuthenticated {
        user_name: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Session ended by explicit logout or failed restoration
    SessionLoggedOut {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Auto-lock fired after the configured idle period
    SessionLocked {
        idle_minutes: i64,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A persisted snapshot was restored on startup or via quick-unlock
    ///
    /// `secrets_locked` is true when only identity was restored and token
    /// reads will fail until the password is re-entered.
    SessionRestored {
        user_name: String,
        secrets_locked: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A note moved through its state machine
    NoteStatusChanged {
        note_id: String,
        old_status: NoteStatus,
        new_status: NoteStatus,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sync pass started over the pending-note snapshot
    SyncPassStarted {
        pending: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A sync pass finished
    SyncPassFinished {
        processed: usize,
        submitted: usize,
        failed: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Connectivity state flipped
    ConnectivityChanged {
        online: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The cached company directory was replaced from the repository
    CompaniesRefreshed {
        count: usize,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl AppEvent {
    /// Event type name for logging and UI dispatch
    pub fn event_type(&self) -> &'static str {
        match self {
            AppEvent::SessionAuthenticated { .. } => "SessionAuthenticated",
            AppEvent::SessionLoggedOut { .. } => "SessionLoggedOut",
            AppEvent::SessionLocked { .. } => "SessionLocked",
            AppEvent::SessionRestored { .. } => "SessionRestored",
            AppEvent::NoteStatusChanged { .. } => "NoteStatusChanged",
            AppEvent::SyncPassStarted { .. } => "SyncPassStarted",
            AppEvent::SyncPassFinished { .. } => "SyncPassFinished",
            AppEvent::ConnectivityChanged { .. } => "ConnectivityChanged",
            AppEvent::CompaniesRefreshed { .. } => "CompaniesRefreshed",
        }
    }
}

/// Broadcast bus for [`AppEvent`]
///
/// Cheap to clone; all clones share the same channel. Subscribers receive
/// events emitted after they subscribe; slow subscribers drop the oldest
/// buffered events.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AppEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a new bus with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Ok(subscriber_count)`; `Err` means nobody is listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: AppEvent) -> Result<usize, broadcast::error::SendError<AppEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: AppEvent) {
        let _ = self.tx.send(event);
    }

    /// Current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
