//! The external tile engine seam.
//!
//! Tile fetching and storage belong to the map engine; this crate only needs
//! a handful of operations on *packs* (the engine's handle for one region
//! download) plus the engine's process-wide event stream.
//!
//! # Design Principles
//!
//! - **Opaque context**: the engine stores a byte blob per pack and hands it
//!   back on every event; it never interprets it
//! - **Broadcast events**: progress, error and limit events for *all* packs
//!   go to *all* subscribers, so receivers must filter by identity
//! - **Dyn-compatible**: uses boxed futures so callers hold `Arc<dyn TileEngine>`
//!
//! [`LocalEngine`] is the in-process implementation used by the CLI and the
//! tests.

mod local;
mod store;

pub use local::{
    LocalEngine, LocalEngineConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_TICK_INTERVAL,
    DEFAULT_TILES_PER_TICK,
};
pub use store::{PackStore, StoredPack};

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

use crate::region::RegionDefinition;

/// Engine-internal pack identifier.
pub type PackId = u64;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors reported by a tile engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine refused to create a pack for the definition.
    #[error("Pack rejected: {0}")]
    Rejected(String),

    #[error("Pack not found: {0}")]
    PackNotFound(PackId),

    /// The pack store could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine is shutting down")]
    ShuttingDown,
}

/// A pack as seen by this crate: engine id plus the context blob attached
/// at creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackHandle {
    pub id: PackId,
    pub context: Vec<u8>,
}

/// Resource counters of a pack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackProgress {
    pub completed: u64,
    pub expected: u64,
}

impl PackProgress {
    pub fn new(completed: u64, expected: u64) -> Self {
        Self {
            completed,
            expected,
        }
    }

    /// Completion percentage in `0.0..=100.0`; `0.0` when nothing is expected.
    pub fn percent(&self) -> f64 {
        if self.expected == 0 {
            return 0.0;
        }
        (100.0 * self.completed as f64 / self.expected as f64).min(100.0)
    }

    /// All expected resources are present.
    pub fn is_complete(&self) -> bool {
        self.expected > 0 && self.completed >= self.expected
    }
}

/// Download state of a pack inside the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackState {
    #[default]
    Inactive,
    Active,
    Complete,
}

/// Everything the engine knows about a persisted pack.
#[derive(Debug, Clone, PartialEq)]
pub struct PackInfo {
    pub handle: PackHandle,
    pub definition: RegionDefinition,
    pub progress: PackProgress,
    pub state: PackState,
}

/// Notification broadcast by the engine for any pack.
#[derive(Debug, Clone, PartialEq)]
pub enum PackEvent {
    Progress {
        pack: PackHandle,
        progress: PackProgress,
        state: PackState,
    },
    Error {
        pack: PackHandle,
        message: String,
    },
    TileCountLimitExceeded {
        pack: PackHandle,
        maximum: u64,
    },
}

impl PackEvent {
    /// The pack this event concerns.
    pub fn pack(&self) -> &PackHandle {
        match self {
            PackEvent::Progress { pack, .. } => pack,
            PackEvent::Error { pack, .. } => pack,
            PackEvent::TileCountLimitExceeded { pack, .. } => pack,
        }
    }
}

/// Operations this crate needs from the map engine.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the manager shares one engine
/// between its dispatcher and every downloader task.
pub trait TileEngine: Send + Sync {
    /// Create and persist a pack for `definition` carrying `context`.
    ///
    /// The pack starts inactive.
    fn create_pack(
        &self,
        definition: RegionDefinition,
        context: Vec<u8>,
    ) -> BoxFuture<'_, Result<PackHandle, EngineError>>;

    /// Start or continue downloading a pack.
    fn resume_pack(&self, pack: PackId) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Stop network work for a pack, keeping its persisted state.
    fn suspend_pack(&self, pack: PackId) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Remove a pack and its resources from the store.
    fn remove_pack(&self, pack: PackId) -> BoxFuture<'_, Result<(), EngineError>>;

    /// Enumerate every persisted pack.
    fn list_packs(&self) -> BoxFuture<'_, Result<Vec<PackInfo>, EngineError>>;

    /// Replace the context blob of a pack.
    fn update_pack_context(
        &self,
        pack: PackId,
        context: Vec<u8>,
    ) -> BoxFuture<'_, Result<PackHandle, EngineError>>;

    /// Import every pack of another pack store.
    fn merge_packs(&self, path: PathBuf) -> BoxFuture<'_, Result<Vec<PackInfo>, EngineError>>;

    /// Replace the whole pack store with a prebuilt one and reload it.
    ///
    /// Every existing pack is dropped. Returns the installed packs.
    fn install_pack_store(
        &self,
        path: PathBuf,
    ) -> BoxFuture<'_, Result<Vec<PackInfo>, EngineError>>;

    /// Cap the number of tiles a single pack may download. `0` = unlimited.
    fn set_tile_count_limit(&self, limit: u64);

    /// Subscribe to the engine's event stream.
    fn subscribe(&self) -> broadcast::Receiver<PackEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_of_empty_pack_is_zero() {
        let progress = PackProgress::new(0, 0);
        assert_eq!(progress.percent(), 0.0);
        assert!(!progress.is_complete());
    }

    #[test]
    fn test_percent() {
        assert_eq!(PackProgress::new(5, 10).percent(), 50.0);
        assert_eq!(PackProgress::new(10, 10).percent(), 100.0);
        assert!(PackProgress::new(10, 10).is_complete());
    }

    #[test]
    fn test_percent_is_capped() {
        assert_eq!(PackProgress::new(12, 10).percent(), 100.0);
    }

    #[test]
    fn test_event_pack_accessor() {
        let pack = PackHandle {
            id: 3,
            context: b"{}".to_vec(),
        };
        let event = PackEvent::TileCountLimitExceeded {
            pack: pack.clone(),
            maximum: 6000,
        };
        assert_eq!(event.pack(), &pack);
    }

    #[test]
    fn test_engine_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EngineError = io_err.into();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
