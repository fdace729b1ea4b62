//! Errors of the offline download subsystem.

use thiserror::Error;

use crate::engine::EngineError;
use crate::region::{DefinitionError, RecordError, RegionId};

/// Failure of an [`OfflineManager`](super::OfflineManager) operation or of a
/// download it started.
#[derive(Debug, Error)]
pub enum OfflineError {
    /// The definition failed validation; nothing was sent to the engine.
    #[error("Invalid region definition: {0}")]
    InvalidDefinition(#[from] DefinitionError),

    /// The engine refused to create a pack for the definition.
    #[error("Engine rejected region definition: {0}")]
    InvalidRegionDefinition(#[source] EngineError),

    /// The engine reported a failure mid-download.
    #[error("Download failed: {0}")]
    DownloadError(String),

    #[error("Tile count limit of {maximum} exceeded")]
    TileCountLimitExceeded { maximum: u64 },

    #[error("There is no region with given id: {0}")]
    NotFound(RegionId),

    #[error("Failed to delete region: {0}")]
    DeleteRegion(#[source] EngineError),

    /// The engine's store could not be read at all.
    #[error("Failed to list regions: {0}")]
    List(#[source] EngineError),

    #[error("Failed to update region metadata: {0}")]
    UpdateMetadata(#[source] EngineError),

    #[error("Failed to merge regions: {0}")]
    MergeRegions(#[source] EngineError),

    /// A prebuilt pack store could not be installed.
    #[error("Failed to install offline tiles: {0}")]
    InstallPackStore(#[source] EngineError),

    #[error("Region {0} is already downloading")]
    AlreadyDownloading(RegionId),

    /// The downloader was released before the download finished.
    #[error("Downloader for region {0} was released")]
    Released(RegionId),

    #[error("Offline manager is shut down")]
    ShutDown,

    #[error("Invalid region record: {0}")]
    InvalidRecord(#[from] RecordError),
}

impl OfflineError {
    /// Stable code reported in `{"status": "error", "code": ...}` events.
    pub fn code(&self) -> &'static str {
        match self {
            OfflineError::InvalidDefinition(_) => "InvalidDefinition",
            OfflineError::InvalidRegionDefinition(_) => "InvalidRegionDefinition",
            OfflineError::DownloadError(_) => "DownloadError",
            OfflineError::TileCountLimitExceeded { .. } => "TileCountLimitExceeded",
            OfflineError::NotFound(_) => "NotFound",
            OfflineError::DeleteRegion(_) => "DeleteRegionError",
            OfflineError::List(_) => "RegionListError",
            OfflineError::UpdateMetadata(_) => "UpdateMetadataError",
            OfflineError::MergeRegions(_) => "MergeRegionsError",
            OfflineError::InstallPackStore(_) => "InstallOfflineTilesError",
            OfflineError::AlreadyDownloading(_) => "AlreadyDownloading",
            OfflineError::Released(_) => "DownloaderReleased",
            OfflineError::ShutDown => "ShutDown",
            OfflineError::InvalidRecord(_) => "InvalidRecord",
        }
    }
}
