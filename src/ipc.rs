//! Status channel between the controller and the rendering layer.
//! Remote failures are reported here instead of being returned as errors.

use serde::Serialize;
use tokio::sync::watch;

/// Last known state of the remote document, as shown to the user
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Nothing attempted yet in this process
    Idle,
    Synced,
    /// Change reached the store inside a newer snapshot; a failed write is never reported this way
    Superseded,
    /// No credential cached: prompt to connect
    NeedsLogin,
    /// Credential rejected: prompt to log in again
    NeedsReauth,
    /// Cached document id is stale; it was cleared and the user must reconnect
    DocumentMissing,
    /// Transport failure or timeout; local state kept
    Offline(String),
    /// Document loaded, some fields fell back to defaults
    Recovered(Vec<String>),
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncStatus::Idle => write!(f, "not synced yet"),
            SyncStatus::Synced => write!(f, "synced"),
            SyncStatus::Superseded => write!(f, "synced (coalesced with a newer change)"),
            SyncStatus::NeedsLogin => write!(f, "not connected, run `login`"),
            SyncStatus::NeedsReauth => write!(f, "credential rejected, run `login` again"),
            SyncStatus::DocumentMissing => {
                write!(f, "remote document not found, run `login` to reconnect")
            }
            SyncStatus::Offline(reason) => write!(f, "offline ({}), changes kept locally", reason),
            SyncStatus::Recovered(warnings) => {
                write!(f, "synced with {} field(s) reset to defaults", warnings.len())
            }
        }
    }
}

impl SyncStatus {
    /// Status that asks the user to (re)connect
    pub fn needs_login(&self) -> bool {
        matches!(
            self,
            SyncStatus::NeedsLogin | SyncStatus::NeedsReauth | SyncStatus::DocumentMissing
        )
    }
}

/// Sender side kept by the controller; any number of receivers may watch it
pub struct StatusChannel {
    tx: watch::Sender<SyncStatus>,
}

impl Default for StatusChannel {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(SyncStatus::Idle);
        Self { tx }
    }
}

impl StatusChannel {
    pub fn publish(&self, status: SyncStatus) {
        self.tx.send_replace(status);
    }

    pub fn current(&self) -> SyncStatus {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}
