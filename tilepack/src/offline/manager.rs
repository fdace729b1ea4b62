//! The offline manager: entry point for region downloads.
//!
//! [`OfflineManager`] validates definitions, creates packs through the
//! [`TileEngine`], and owns the registry of live [`Downloader`]s. It
//! subscribes once to the engine's broadcast and fans events out by region
//! id, so each downloader only sees events routed to it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                        OfflineManager                          │
//! │                                                                │
//! │  download() ──► validate ──► create_pack ──► register ──► resume│
//! │                                                  │             │
//! │  TileEngine broadcast ──► dispatcher ──► DownloaderRegistry    │
//! │                          (id from context)       │             │
//! │                                                  ▼             │
//! │                                   Downloader task (per region) │
//! │                                      │                         │
//! │                                      ├──► ProgressStream       │
//! │                                      └──► DownloadCompletion   │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use tilepack::engine::LocalEngine;
//! use tilepack::offline::{OfflineManager, OfflineManagerConfig};
//!
//! let engine = Arc::new(LocalEngine::in_memory());
//! let manager = OfflineManager::start(engine, OfflineManagerConfig::default());
//!
//! let mut download = manager.download(definition, metadata).await?;
//! while let Some(event) = download.progress.recv().await {
//!     println!("{}", event.to_json());
//! }
//! download.completion.wait().await?;
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::channel::{channel_name, ProgressChannel, ProgressStream};
use super::downloader::{DownloadResult, Downloader};
use super::error::OfflineError;
use super::ids::IdAllocator;
use super::registry::DownloaderRegistry;
use crate::engine::{EngineError, PackEvent, PackHandle, PackInfo, TileEngine};
use crate::region::{Metadata, RegionDefinition, RegionId, RegionRecord};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the offline manager.
#[derive(Clone, Debug, Default)]
pub struct OfflineManagerConfig {
    /// Tile count limit forwarded to the engine at start. `None` leaves the
    /// engine's current limit untouched.
    pub tile_count_limit: Option<u64>,
}

// =============================================================================
// Download handles
// =============================================================================

/// Resolves once with the terminal result of a download.
#[derive(Debug)]
pub struct DownloadCompletion {
    rx: oneshot::Receiver<DownloadResult>,
}

impl DownloadCompletion {
    /// Wait for the download to finish.
    pub async fn wait(self) -> Result<(), OfflineError> {
        self.rx.await.unwrap_or(Err(OfflineError::ShutDown))
    }
}

/// A started download: the record (with its generated id), the progress
/// stream and the one-shot completion.
#[derive(Debug)]
pub struct RegionDownload {
    pub record: RegionRecord,
    pub progress: ProgressStream,
    pub completion: DownloadCompletion,
}

// =============================================================================
// Shared state
// =============================================================================

/// State shared by the manager, its dispatcher and every downloader task.
pub(crate) struct ManagerShared {
    engine: Arc<dyn TileEngine>,
    registry: DownloaderRegistry,
    ids: IdAllocator,
    shutdown: CancellationToken,
}

impl ManagerShared {
    pub(crate) fn new(engine: Arc<dyn TileEngine>) -> Self {
        Self {
            engine,
            registry: DownloaderRegistry::new(),
            ids: IdAllocator::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn registry(&self) -> &DownloaderRegistry {
        &self.registry
    }

    fn ensure_running(&self) -> Result<(), OfflineError> {
        if self.shutdown.is_cancelled() {
            return Err(OfflineError::ShutDown);
        }
        Ok(())
    }

    /// Route one engine event to the downloader named in its context.
    fn route(&self, event: PackEvent) {
        let Some(region) = RegionRecord::id_from_context(&event.pack().context) else {
            trace!(pack_id = event.pack().id, "Event for pack without region id");
            return;
        };
        if !self.registry.dispatch(region, event) {
            trace!(region_id = region, "No live downloader for event");
        }
    }

    async fn find_pack(&self, region: RegionId) -> Result<Option<PackInfo>, EngineError> {
        let packs = self.engine.list_packs().await?;
        Ok(packs
            .into_iter()
            .find(|p| RegionRecord::id_from_context(&p.handle.context) == Some(region)))
    }

    /// Suspend then remove a pack.
    async fn remove_pack(&self, pack: &PackHandle) -> Result<(), EngineError> {
        self.engine.suspend_pack(pack.id).await?;
        self.engine.remove_pack(pack.id).await
    }

    /// Suspend and remove the pack of `region`, leaving the registry alone.
    pub(crate) async fn discard_region(&self, region: RegionId) -> Result<(), OfflineError> {
        let info = self
            .find_pack(region)
            .await
            .map_err(OfflineError::DeleteRegion)?
            .ok_or(OfflineError::NotFound(region))?;

        self.remove_pack(&info.handle)
            .await
            .map_err(OfflineError::DeleteRegion)?;

        info!(region_id = region, pack_id = info.handle.id, "Region deleted");
        Ok(())
    }

    async fn delete_region(&self, region: RegionId) -> Result<(), OfflineError> {
        self.discard_region(region).await?;
        self.registry.release(region);
        Ok(())
    }

    /// Register a downloader for `record`, resume its pack and spawn the
    /// downloader task.
    ///
    /// `fresh` packs were created by this call and are removed again if they
    /// cannot be resumed.
    async fn launch(
        self: &Arc<Self>,
        record: RegionRecord,
        pack: PackHandle,
        fresh: bool,
    ) -> Result<RegionDownload, OfflineError> {
        let id = record.id();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let ticket = self
            .registry
            .insert(id, events_tx)
            .ok_or(OfflineError::AlreadyDownloading(id))?;

        if let Err(e) = self.engine.resume_pack(pack.id).await {
            warn!(region_id = id, error = %e, "Failed to resume pack");
            self.registry.release_ticket(id, ticket);
            if fresh {
                if let Err(cleanup) = self.remove_pack(&pack).await {
                    debug!(region_id = id, error = %cleanup, "Cleanup of unresumable pack failed");
                }
            }
            return Err(OfflineError::DownloadError(e.to_string()));
        }

        let (channel, progress) = ProgressChannel::open(channel_name(id));
        let (result_tx, result_rx) = oneshot::channel();
        let downloader = Downloader::new(record.clone(), pack, channel, ticket, result_tx);

        // Start precedes any progress: events queue until the task runs
        downloader.start();
        tokio::spawn(downloader.run(
            events_rx,
            Arc::clone(self),
            self.shutdown.child_token(),
        ));

        Ok(RegionDownload {
            record,
            progress,
            completion: DownloadCompletion { rx: result_rx },
        })
    }
}

fn records_from_packs(packs: Vec<PackInfo>) -> Vec<RegionRecord> {
    packs
        .into_iter()
        .filter_map(
            |p| match RegionRecord::from_context(&p.handle.context, p.definition) {
                Ok(record) => Some(record),
                Err(e) => {
                    debug!(pack_id = p.handle.id, error = %e, "Skipping pack with unreadable context");
                    None
                }
            },
        )
        .collect()
}

async fn dispatch_events(
    shared: Arc<ManagerShared>,
    mut events: broadcast::Receiver<PackEvent>,
    shutdown: CancellationToken,
) {
    info!("Offline event dispatcher started");

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => break,

            received = events.recv() => match received {
                Ok(event) => shared.route(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event dispatcher lagged behind engine");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Engine event stream closed");
                    break;
                }
            }
        }
    }

    info!("Offline event dispatcher stopped");
}

// =============================================================================
// Offline Manager
// =============================================================================

/// Orchestrates region downloads against a [`TileEngine`].
pub struct OfflineManager {
    shared: Arc<ManagerShared>,
}

impl OfflineManager {
    /// Subscribe to `engine` and spawn the event dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(engine: Arc<dyn TileEngine>, config: OfflineManagerConfig) -> Self {
        if let Some(limit) = config.tile_count_limit {
            engine.set_tile_count_limit(limit);
        }

        let events = engine.subscribe();
        let shared = Arc::new(ManagerShared::new(engine));
        tokio::spawn(dispatch_events(
            Arc::clone(&shared),
            events,
            shared.shutdown.clone(),
        ));

        Self { shared }
    }

    /// Start downloading a region.
    ///
    /// Returns as soon as the pack is created and resumed; progress and the
    /// terminal result arrive through the returned [`RegionDownload`].
    pub async fn download(
        &self,
        definition: RegionDefinition,
        metadata: Metadata,
    ) -> Result<RegionDownload, OfflineError> {
        definition.validate()?;
        self.shared.ensure_running()?;

        let id = self.shared.ids.next(self.shared.engine.as_ref()).await;
        let record = RegionRecord::new(id, metadata, definition);

        let pack = self
            .shared
            .engine
            .create_pack(record.definition().clone(), record.to_context())
            .await
            .map_err(|e| {
                warn!(region_id = id, error = %e, "Engine rejected region");
                OfflineError::InvalidRegionDefinition(e)
            })?;

        info!(region_id = id, pack_id = pack.id, "Region download requested");
        self.shared.launch(record, pack, true).await
    }

    /// Every persisted region. Packs with an unreadable context are skipped.
    pub async fn list_regions(&self) -> Result<Vec<RegionRecord>, OfflineError> {
        let packs = self
            .shared
            .engine
            .list_packs()
            .await
            .map_err(OfflineError::List)?;
        Ok(records_from_packs(packs))
    }

    /// Suspend and remove a region's pack, then release its downloader.
    pub async fn delete_region(&self, region: RegionId) -> Result<(), OfflineError> {
        self.shared.delete_region(region).await
    }

    /// Forward a tile count limit to the engine. `0` = unlimited.
    pub fn set_tile_count_limit(&self, limit: u64) {
        self.shared.engine.set_tile_count_limit(limit);
    }

    /// Drop the downloader of `region` without touching persisted state.
    pub fn release_downloader(&self, region: RegionId) -> bool {
        self.shared.registry.release(region)
    }

    /// Pause a region's download, keeping the record and any live downloader.
    pub async fn suspend_region(&self, region: RegionId) -> Result<(), OfflineError> {
        let info = self
            .shared
            .find_pack(region)
            .await
            .map_err(|e| OfflineError::DownloadError(e.to_string()))?
            .ok_or(OfflineError::NotFound(region))?;

        self.shared
            .engine
            .suspend_pack(info.handle.id)
            .await
            .map_err(|e| OfflineError::DownloadError(e.to_string()))?;
        info!(region_id = region, "Region suspended");
        Ok(())
    }

    /// Continue downloading a persisted region with a fresh downloader.
    pub async fn resume_region(&self, region: RegionId) -> Result<RegionDownload, OfflineError> {
        self.shared.ensure_running()?;
        if self.shared.registry.contains(region) {
            return Err(OfflineError::AlreadyDownloading(region));
        }

        let info = self
            .shared
            .find_pack(region)
            .await
            .map_err(|e| OfflineError::DownloadError(e.to_string()))?
            .ok_or(OfflineError::NotFound(region))?;
        let record = RegionRecord::from_context(&info.handle.context, info.definition)?;

        info!(region_id = region, pack_id = info.handle.id, "Region download resumed");
        self.shared.launch(record, info.handle, false).await
    }

    /// Replace a region's metadata.
    pub async fn update_region_metadata(
        &self,
        region: RegionId,
        metadata: Metadata,
    ) -> Result<RegionRecord, OfflineError> {
        // A live downloader filters on the old context
        if self.shared.registry.contains(region) {
            return Err(OfflineError::AlreadyDownloading(region));
        }

        let info = self
            .shared
            .find_pack(region)
            .await
            .map_err(OfflineError::UpdateMetadata)?
            .ok_or(OfflineError::NotFound(region))?;

        let record = RegionRecord::from_context(&info.handle.context, info.definition)?
            .with_metadata(metadata);
        self.shared
            .engine
            .update_pack_context(info.handle.id, record.to_context())
            .await
            .map_err(OfflineError::UpdateMetadata)?;

        info!(region_id = region, "Region metadata updated");
        Ok(record)
    }

    /// Import every region of another pack store.
    pub async fn merge_regions(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<Vec<RegionRecord>, OfflineError> {
        let packs = self
            .shared
            .engine
            .merge_packs(path.into())
            .await
            .map_err(OfflineError::MergeRegions)?;

        let records = records_from_packs(packs);
        if let Some(max) = records.iter().map(RegionRecord::id).max() {
            self.shared.ids.observe(max);
        }
        info!(count = records.len(), "Regions merged");
        Ok(records)
    }

    /// Replace the engine's whole pack store with the prebuilt store at
    /// `path`, dropping every existing region.
    ///
    /// Refused while any download is live.
    pub async fn install_pack_store(
        &self,
        path: impl Into<PathBuf>,
    ) -> Result<Vec<RegionRecord>, OfflineError> {
        self.shared.ensure_running()?;
        if let Some(&active) = self.shared.registry.ids().first() {
            return Err(OfflineError::AlreadyDownloading(active));
        }

        let packs = self
            .shared
            .engine
            .install_pack_store(path.into())
            .await
            .map_err(OfflineError::InstallPackStore)?;

        let records = records_from_packs(packs);
        if let Some(max) = records.iter().map(RegionRecord::id).max() {
            self.shared.ids.observe(max);
        }
        info!(count = records.len(), "Offline tiles installed");
        Ok(records)
    }

    /// Region ids with a live downloader, ascending.
    pub fn active_downloads(&self) -> Vec<RegionId> {
        self.shared.registry.ids()
    }

    pub fn is_downloading(&self, region: RegionId) -> bool {
        self.shared.registry.contains(region)
    }

    /// Stop the dispatcher and every downloader, and empty the registry.
    ///
    /// Pending completions resolve with [`OfflineError::ShutDown`].
    pub fn shutdown(&self) {
        if self.shared.shutdown.is_cancelled() {
            return;
        }
        info!(
            active = self.shared.registry.len(),
            "Shutting down offline manager"
        );
        self.shared.shutdown.cancel();
        self.shared.registry.clear();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}

impl Drop for OfflineManager {
    fn drop(&mut self) {
        self.shared.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::LocalEngine;
    use crate::offline::ProgressEvent;
    use crate::region::LatLngBounds;
    use serde_json::json;
    use std::time::Duration;

    fn definition(min_zoom: f64, max_zoom: f64) -> RegionDefinition {
        RegionDefinition::new(
            LatLngBounds::from([[10.0, 10.0], [20.0, 20.0]]),
            "style://x",
            min_zoom,
            max_zoom,
        )
    }

    fn metadata() -> Metadata {
        json!({"label": "Area1"}).as_object().cloned().unwrap()
    }

    fn setup() -> (Arc<LocalEngine>, OfflineManager) {
        let engine = Arc::new(LocalEngine::in_memory());
        let manager = OfflineManager::start(engine.clone(), OfflineManagerConfig::default());
        (engine, manager)
    }

    async fn next_event(download: &mut RegionDownload) -> Option<ProgressEvent> {
        tokio::time::timeout(Duration::from_secs(2), download.progress.recv())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_download_registers_and_starts() {
        let (_engine, manager) = setup();

        let mut download = manager.download(definition(0.0, 10.0), metadata()).await.unwrap();

        assert_eq!(download.record.metadata(), &metadata());
        assert_eq!(manager.active_downloads(), vec![download.record.id()]);
        assert_eq!(
            download.progress.name(),
            format!("downloadOfflineRegion_{}", download.record.id())
        );
        assert_eq!(next_event(&mut download).await, Some(ProgressEvent::Start));
    }

    #[tokio::test]
    async fn test_invalid_definition_has_no_side_effects() {
        let (_engine, manager) = setup();

        let result = manager.download(definition(15.0, 5.0), metadata()).await;

        assert!(matches!(result, Err(OfflineError::InvalidDefinition(_))));
        assert!(manager.list_regions().await.unwrap().is_empty());
        assert!(manager.active_downloads().is_empty());
    }

    #[tokio::test]
    async fn test_engine_rejection() {
        let (_engine, manager) = setup();
        let definition = RegionDefinition::new(
            LatLngBounds::from([[10.0, 10.0], [20.0, 20.0]]),
            "no-scheme",
            0.0,
            1.0,
        );

        let result = manager.download(definition, Metadata::new()).await;

        assert!(matches!(
            result,
            Err(OfflineError::InvalidRegionDefinition(_))
        ));
        assert!(manager.active_downloads().is_empty());
    }

    #[tokio::test]
    async fn test_complete_download_releases_downloader() {
        let (engine, manager) = setup();
        let mut download = manager.download(definition(0.0, 1.0), metadata()).await.unwrap();
        let id = download.record.id();
        let pack = engine.pack_for_region(id).unwrap().unwrap();

        engine.report_progress(pack, 5, 10).unwrap();
        engine.report_progress(pack, 10, 10).unwrap();

        assert_eq!(next_event(&mut download).await, Some(ProgressEvent::Start));
        assert_eq!(
            next_event(&mut download).await,
            Some(ProgressEvent::Progress { progress: 50.0 })
        );
        assert_eq!(
            next_event(&mut download).await,
            Some(ProgressEvent::Progress { progress: 100.0 })
        );
        assert_eq!(next_event(&mut download).await, Some(ProgressEvent::Success));
        assert_eq!(next_event(&mut download).await, None);

        download.completion.wait().await.unwrap();
        assert!(!manager.is_downloading(id));
    }

    #[tokio::test]
    async fn test_second_registration_is_rejected() {
        let (_engine, manager) = setup();
        let download = manager.download(definition(0.0, 1.0), metadata()).await.unwrap();

        let result = manager.resume_region(download.record.id()).await;
        assert!(matches!(result, Err(OfflineError::AlreadyDownloading(_))));
    }

    #[tokio::test]
    async fn test_release_downloader_resolves_completion() {
        let (_engine, manager) = setup();
        let download = manager.download(definition(0.0, 1.0), metadata()).await.unwrap();
        let id = download.record.id();

        assert!(manager.release_downloader(id));
        assert!(!manager.release_downloader(id));

        let result = download.completion.wait().await;
        assert!(matches!(result, Err(OfflineError::Released(r)) if r == id));
        // Persisted state is untouched
        assert_eq!(manager.list_regions().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_resolves_pending_downloads() {
        let (_engine, manager) = setup();
        let download = manager.download(definition(0.0, 1.0), metadata()).await.unwrap();

        manager.shutdown();

        assert!(manager.is_shut_down());
        assert!(manager.active_downloads().is_empty());
        assert!(matches!(
            download.completion.wait().await,
            Err(OfflineError::ShutDown)
        ));
        assert!(matches!(
            manager.download(definition(0.0, 1.0), metadata()).await,
            Err(OfflineError::ShutDown)
        ));
    }

    #[tokio::test]
    async fn test_config_limit_is_forwarded() {
        let engine = Arc::new(LocalEngine::in_memory());
        let _manager = OfflineManager::start(
            engine.clone(),
            OfflineManagerConfig {
                tile_count_limit: Some(6000),
            },
        );
        assert_eq!(engine.tile_count_limit(), 6000);
    }

    #[tokio::test]
    async fn test_update_metadata() {
        let (_engine, manager) = setup();
        let download = manager.download(definition(0.0, 1.0), metadata()).await.unwrap();
        let id = download.record.id();

        // Rejected while downloading
        assert!(matches!(
            manager.update_region_metadata(id, Metadata::new()).await,
            Err(OfflineError::AlreadyDownloading(_))
        ));

        manager.release_downloader(id);
        let updated = json!({"label": "Renamed", "id": 1}).as_object().cloned().unwrap();
        let record = manager.update_region_metadata(id, updated).await.unwrap();

        assert_eq!(record.id(), id);
        assert_eq!(record.metadata().get("label"), Some(&json!("Renamed")));
        assert!(record.metadata().get("id").is_none());

        let listed = manager.list_regions().await.unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[tokio::test]
    async fn test_unknown_region_operations() {
        let (_engine, manager) = setup();

        assert!(matches!(
            manager.delete_region(404).await,
            Err(OfflineError::NotFound(404))
        ));
        assert!(matches!(
            manager.suspend_region(404).await,
            Err(OfflineError::NotFound(404))
        ));
        assert!(matches!(
            manager.resume_region(404).await,
            Err(OfflineError::NotFound(404))
        ));
        assert!(matches!(
            manager.update_region_metadata(404, Metadata::new()).await,
            Err(OfflineError::NotFound(404))
        ));
    }
}
