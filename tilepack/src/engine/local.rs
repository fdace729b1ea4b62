//! In-process tile engine.
//!
//! `LocalEngine` keeps a pack table (optionally persisted as JSON), sizes
//! each pack with Web Mercator tile math, and broadcasts pack events. It
//! either simulates downloads on a timer or lets the owner drive events
//! through [`LocalEngine::report_progress`] and friends.
//!
//! Mutations edit a copy of the pack table, persist it, and only then swap
//! it in, so a failed write changes nothing. The async [`TileEngine`]
//! methods do their store I/O on the blocking pool; the `report_*` methods
//! write on the calling thread.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      LocalEngine                          │
//! │                                                           │
//! │  create/resume/suspend/remove ──► PackTable ──► PackStore │
//! │                                      │          (JSON)    │
//! │  simulator task (per active pack) ───┤                    │
//! │  report_* (external driver) ─────────┤                    │
//! │                                      ▼                    │
//! │                          broadcast::Sender<PackEvent>     │
//! └──────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{
    BoxFuture, EngineError, PackEvent, PackHandle, PackId, PackInfo, PackProgress, PackState,
    PackStore, StoredPack, TileEngine,
};
use crate::coord;
use crate::region::{RegionDefinition, RegionId, RegionRecord};

/// Default interval between simulated download steps.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of tiles a simulated step completes.
pub const DEFAULT_TILES_PER_TICK: u64 = 50;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Configuration for [`LocalEngine`].
#[derive(Clone, Debug)]
pub struct LocalEngineConfig {
    /// Pack table file. `None` keeps packs in memory.
    pub store_path: Option<PathBuf>,

    /// Advance resumed packs automatically.
    pub simulate: bool,

    /// Interval between simulated steps.
    pub tick_interval: Duration,

    /// Tiles completed per simulated step.
    pub tiles_per_tick: u64,

    /// Broadcast channel capacity. Slow subscribers lag beyond this.
    pub event_capacity: usize,
}

impl Default for LocalEngineConfig {
    fn default() -> Self {
        Self {
            store_path: None,
            simulate: false,
            tick_interval: DEFAULT_TICK_INTERVAL,
            tiles_per_tick: DEFAULT_TILES_PER_TICK,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl LocalEngineConfig {
    /// Persist packs to `path`.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = Some(path.into());
        self
    }

    /// Simulate downloads with the given step size and interval.
    pub fn with_simulation(mut self, tick_interval: Duration, tiles_per_tick: u64) -> Self {
        self.simulate = true;
        self.tick_interval = tick_interval;
        self.tiles_per_tick = tiles_per_tick.max(1);
        self
    }
}

#[derive(Debug, Default, Clone)]
struct PackTable {
    packs: BTreeMap<PackId, StoredPack>,
    next_id: PackId,
}

impl PackTable {
    fn new(packs: Vec<StoredPack>) -> Self {
        let next_id = packs.iter().map(|p| p.id).max().map_or(1, |max| max + 1);
        Self {
            packs: packs.into_iter().map(|p| (p.id, p)).collect(),
            next_id,
        }
    }

    fn allocate_id(&mut self) -> PackId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn get_mut(&mut self, pack: PackId) -> Result<&mut StoredPack, EngineError> {
        self.packs
            .get_mut(&pack)
            .ok_or(EngineError::PackNotFound(pack))
    }
}

struct Inner {
    config: LocalEngineConfig,
    store: PackStore,
    /// Loaded on first access so that an unreadable store surfaces as an
    /// error from the operation that needed it. Only held for in-memory
    /// work, never across store I/O.
    table: Mutex<Option<PackTable>>,
    /// Serializes mutations: each one edits and persists a copy of the
    /// table, then swaps it in.
    writer: Mutex<()>,
    tile_count_limit: AtomicU64,
    events: broadcast::Sender<PackEvent>,
    workers: Mutex<HashMap<PackId, CancellationToken>>,
    shutdown: CancellationToken,
}

impl Inner {
    fn read<R>(&self, f: impl FnOnce(&PackTable) -> R) -> Result<R, EngineError> {
        if let Some(table) = &*self.table.lock() {
            return Ok(f(table));
        }

        let loaded = PackTable::new(self.store.load()?);
        let mut guard = self.table.lock();
        Ok(f(guard.get_or_insert(loaded)))
    }

    /// Copy of the live table, loading it on first access.
    fn snapshot(&self) -> Result<PackTable, EngineError> {
        self.read(PackTable::clone)
    }

    /// Apply `f` to a copy of the table and persist the copy. The live table
    /// only changes once the save succeeded.
    fn mutate<R>(
        &self,
        f: impl FnOnce(&mut PackTable) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let _writer = self.writer.lock();
        let mut next = self.snapshot()?;
        let result = f(&mut next)?;
        self.store.save(next.packs.values())?;
        *self.table.lock() = Some(next);
        Ok(result)
    }

    /// Replace the whole table with `packs`, persisting it first.
    fn replace(&self, packs: Vec<StoredPack>) -> Result<(), EngineError> {
        let _writer = self.writer.lock();
        let next = PackTable::new(packs);
        self.store.save(next.packs.values())?;
        *self.table.lock() = Some(next);
        Ok(())
    }

    /// Run a blocking table operation off the async runtime.
    async fn blocking<R, F>(self: &Arc<Self>, f: F) -> Result<R, EngineError>
    where
        R: Send + 'static,
        F: FnOnce(&Inner) -> Result<R, EngineError> + Send + 'static,
    {
        let inner = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&*inner))
            .await
            .map_err(|e| EngineError::Storage(format!("store task failed: {}", e)))?
    }

    fn emit(&self, event: PackEvent) {
        trace!(pack_id = event.pack().id, event = ?event, "Broadcasting pack event");
        // No subscribers is not an error
        let _ = self.events.send(event);
    }

    fn cancel_worker(&self, pack: PackId) {
        if let Some(token) = self.workers.lock().remove(&pack) {
            token.cancel();
        }
    }

    fn spawn_worker(self: &Arc<Self>, pack: PackId) {
        let token = self.shutdown.child_token();
        {
            let mut workers = self.workers.lock();
            if let Some(previous) = workers.insert(pack, token.clone()) {
                previous.cancel();
            }
        }

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.simulate(pack, token).await;
        });
    }

    async fn simulate(self: Arc<Self>, pack: PackId, token: CancellationToken) {
        debug!(pack_id = pack, "Simulated download started");
        let mut ticker = tokio::time::interval(self.config.tick_interval);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.blocking(move |inner| inner.advance(pack)).await {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    warn!(pack_id = pack, error = %e, "Simulated download stopped");
                    break;
                }
            }
        }

        let mut workers = self.workers.lock();
        if !token.is_cancelled() {
            workers.remove(&pack);
        }
        debug!(pack_id = pack, "Simulated download finished");
    }

    /// One simulated step. Returns whether the pack needs more steps.
    fn advance(&self, pack: PackId) -> Result<bool, EngineError> {
        let limit = self.tile_count_limit.load(Ordering::SeqCst);
        let step = self.config.tiles_per_tick.max(1);
        let mut keep_going = false;

        let event = self.mutate(|table| {
            let stored = table.get_mut(pack)?;
            if stored.state != PackState::Active {
                return Ok(None);
            }

            if limit > 0 && stored.progress.expected > limit {
                stored.state = PackState::Inactive;
                return Ok(Some(PackEvent::TileCountLimitExceeded {
                    pack: stored.handle(),
                    maximum: limit,
                }));
            }

            let progress = &mut stored.progress;
            progress.completed = progress.completed.saturating_add(step).min(progress.expected);
            if progress.is_complete() || progress.expected == 0 {
                stored.state = PackState::Complete;
            } else {
                keep_going = true;
            }

            Ok(Some(PackEvent::Progress {
                pack: stored.handle(),
                progress: stored.progress,
                state: stored.state,
            }))
        })?;

        if let Some(event) = event {
            self.emit(event);
        }
        Ok(keep_going)
    }
}

/// In-process [`TileEngine`] implementation.
pub struct LocalEngine {
    inner: Arc<Inner>,
}

impl LocalEngine {
    /// Create an engine. Simulation tasks are spawned on the current Tokio
    /// runtime when packs are resumed.
    pub fn new(config: LocalEngineConfig) -> Self {
        let store = config
            .store_path
            .clone()
            .map(PackStore::at)
            .unwrap_or_default();
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                table: Mutex::new(None),
                writer: Mutex::new(()),
                tile_count_limit: AtomicU64::new(0),
                events,
                workers: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// In-memory engine without simulation.
    pub fn in_memory() -> Self {
        Self::new(LocalEngineConfig::default())
    }

    pub fn config(&self) -> &LocalEngineConfig {
        &self.inner.config
    }

    /// Current tile count limit (`0` = unlimited).
    pub fn tile_count_limit(&self) -> u64 {
        self.inner.tile_count_limit.load(Ordering::SeqCst)
    }

    /// Engine pack carrying the context of region `region`, if any.
    pub fn pack_for_region(&self, region: RegionId) -> Result<Option<PackId>, EngineError> {
        self.inner.read(|table| {
            table
                .packs
                .values()
                .find(|p| RegionRecord::id_from_context(&p.context) == Some(region))
                .map(|p| p.id)
        })
    }

    /// Record download progress for a pack and broadcast it.
    pub fn report_progress(
        &self,
        pack: PackId,
        completed: u64,
        expected: u64,
    ) -> Result<(), EngineError> {
        let event = self.inner.mutate(|table| {
            let stored = table.get_mut(pack)?;
            stored.progress = PackProgress::new(completed, expected);
            stored.state = if stored.progress.is_complete() {
                PackState::Complete
            } else {
                PackState::Active
            };
            Ok(PackEvent::Progress {
                pack: stored.handle(),
                progress: stored.progress,
                state: stored.state,
            })
        })?;
        self.inner.emit(event);
        Ok(())
    }

    /// Broadcast a download failure for a pack.
    pub fn report_error(&self, pack: PackId, message: impl Into<String>) -> Result<(), EngineError> {
        self.inner.cancel_worker(pack);
        let message = message.into();
        let event = self.inner.mutate(|table| {
            let stored = table.get_mut(pack)?;
            stored.state = PackState::Inactive;
            Ok(PackEvent::Error {
                pack: stored.handle(),
                message,
            })
        })?;
        self.inner.emit(event);
        Ok(())
    }

    /// Broadcast that a pack hit the tile count limit.
    pub fn report_tile_limit(&self, pack: PackId, maximum: u64) -> Result<(), EngineError> {
        self.inner.cancel_worker(pack);
        let event = self.inner.mutate(|table| {
            let stored = table.get_mut(pack)?;
            stored.state = PackState::Inactive;
            Ok(PackEvent::TileCountLimitExceeded {
                pack: stored.handle(),
                maximum,
            })
        })?;
        self.inner.emit(event);
        Ok(())
    }

    /// Stop every simulation task.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.workers.lock().clear();
    }
}

impl Drop for LocalEngine {
    fn drop(&mut self) {
        self.inner.shutdown.cancel();
    }
}

impl TileEngine for LocalEngine {
    fn create_pack(
        &self,
        definition: RegionDefinition,
        context: Vec<u8>,
    ) -> BoxFuture<'_, Result<PackHandle, EngineError>> {
        Box::pin(async move {
            let style = definition.style_reference();
            if !style.contains("://") {
                return Err(EngineError::Rejected(format!("unreachable style: {}", style)));
            }

            let expected = coord::tile_count(
                definition.bounds(),
                definition.min_zoom(),
                definition.max_zoom(),
            )
            .map_err(|e| EngineError::Rejected(e.to_string()))?;

            let handle = self
                .inner
                .blocking(move |inner| {
                    inner.mutate(|table| {
                        let stored = StoredPack {
                            id: table.allocate_id(),
                            definition,
                            context,
                            progress: PackProgress::new(0, expected),
                            state: PackState::Inactive,
                        };
                        let handle = stored.handle();
                        table.packs.insert(stored.id, stored);
                        Ok(handle)
                    })
                })
                .await?;

            info!(pack_id = handle.id, expected, "Pack created");
            Ok(handle)
        })
    }

    fn resume_pack(&self, pack: PackId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            if self.inner.shutdown.is_cancelled() {
                return Err(EngineError::ShuttingDown);
            }

            // A finished pack re-announces completion instead of restarting
            let completed = self
                .inner
                .blocking(move |inner| {
                    inner.mutate(|table| {
                        let stored = table.get_mut(pack)?;
                        if stored.state == PackState::Complete {
                            return Ok(Some(PackEvent::Progress {
                                pack: stored.handle(),
                                progress: stored.progress,
                                state: stored.state,
                            }));
                        }
                        stored.state = PackState::Active;
                        Ok(None)
                    })
                })
                .await?;

            debug!(pack_id = pack, "Pack resumed");
            match completed {
                Some(event) => self.inner.emit(event),
                None if self.inner.config.simulate => self.inner.spawn_worker(pack),
                None => {}
            }
            Ok(())
        })
    }

    fn suspend_pack(&self, pack: PackId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            self.inner.cancel_worker(pack);
            self.inner
                .blocking(move |inner| {
                    inner.mutate(|table| {
                        let stored = table.get_mut(pack)?;
                        if stored.state == PackState::Active {
                            stored.state = PackState::Inactive;
                        }
                        Ok(())
                    })
                })
                .await?;
            debug!(pack_id = pack, "Pack suspended");
            Ok(())
        })
    }

    fn remove_pack(&self, pack: PackId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            self.inner.cancel_worker(pack);
            self.inner
                .blocking(move |inner| {
                    inner.mutate(|table| {
                        table
                            .packs
                            .remove(&pack)
                            .map(|_| ())
                            .ok_or(EngineError::PackNotFound(pack))
                    })
                })
                .await?;
            info!(pack_id = pack, "Pack removed");
            Ok(())
        })
    }

    fn list_packs(&self) -> BoxFuture<'_, Result<Vec<PackInfo>, EngineError>> {
        Box::pin(async move {
            self.inner
                .blocking(|inner| {
                    inner.read(|table| table.packs.values().map(StoredPack::info).collect())
                })
                .await
        })
    }

    fn update_pack_context(
        &self,
        pack: PackId,
        context: Vec<u8>,
    ) -> BoxFuture<'_, Result<PackHandle, EngineError>> {
        Box::pin(async move {
            self.inner
                .blocking(move |inner| {
                    inner.mutate(|table| {
                        let stored = table.get_mut(pack)?;
                        stored.context = context;
                        Ok(stored.handle())
                    })
                })
                .await
        })
    }

    fn merge_packs(&self, path: PathBuf) -> BoxFuture<'_, Result<Vec<PackInfo>, EngineError>> {
        Box::pin(async move {
            let source = path.clone();
            let merged = self
                .inner
                .blocking(move |inner| {
                    let incoming = PackStore::read_file(&source)?;
                    inner.mutate(|table| {
                        let mut merged = Vec::with_capacity(incoming.len());
                        for mut stored in incoming {
                            stored.id = table.allocate_id();
                            if stored.state == PackState::Active {
                                stored.state = PackState::Inactive;
                            }
                            merged.push(stored.info());
                            table.packs.insert(stored.id, stored);
                        }
                        Ok(merged)
                    })
                })
                .await?;

            info!(path = %path.display(), count = merged.len(), "Packs merged");
            Ok(merged)
        })
    }

    fn install_pack_store(
        &self,
        path: PathBuf,
    ) -> BoxFuture<'_, Result<Vec<PackInfo>, EngineError>> {
        Box::pin(async move {
            let source = path.clone();
            let incoming = self
                .inner
                .blocking(move |_| PackStore::read_file(&source))
                .await?;

            // Installed packs have no simulation task behind them
            let previous: Vec<PackId> = self.inner.workers.lock().keys().copied().collect();
            for pack in previous {
                self.inner.cancel_worker(pack);
            }

            let installed = self
                .inner
                .blocking(move |inner| {
                    let packs: Vec<StoredPack> = incoming
                        .into_iter()
                        .map(|mut stored| {
                            if stored.state == PackState::Active {
                                stored.state = PackState::Inactive;
                            }
                            stored
                        })
                        .collect();
                    let installed: Vec<_> = packs.iter().map(StoredPack::info).collect();
                    inner.replace(packs)?;
                    Ok(installed)
                })
                .await?;

            info!(path = %path.display(), count = installed.len(), "Pack store installed");
            Ok(installed)
        })
    }

    fn set_tile_count_limit(&self, limit: u64) {
        info!(limit, "Tile count limit set");
        self.inner.tile_count_limit.store(limit, Ordering::SeqCst);
    }

    fn subscribe(&self) -> broadcast::Receiver<PackEvent> {
        self.inner.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{LatLngBounds, Metadata};
    use tempfile::TempDir;

    fn definition(style: &str) -> RegionDefinition {
        RegionDefinition::new(
            LatLngBounds::from([[10.0, 10.0], [20.0, 20.0]]),
            style,
            0.0,
            2.0,
        )
    }

    fn context(region: RegionId) -> Vec<u8> {
        RegionRecord::new(region, Metadata::new(), definition("style://x")).to_context()
    }

    #[tokio::test]
    async fn test_create_list_remove() {
        let engine = LocalEngine::in_memory();

        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();
        let packs = engine.list_packs().await.unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].handle, handle);
        assert_eq!(packs[0].state, PackState::Inactive);
        assert!(packs[0].progress.expected > 0);

        engine.remove_pack(handle.id).await.unwrap();
        assert!(engine.list_packs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unreachable_style() {
        let engine = LocalEngine::in_memory();
        let result = engine.create_pack(definition("not-a-style"), context(1)).await;
        assert!(matches!(result, Err(EngineError::Rejected(_))));
        assert!(engine.list_packs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_pack_operations_fail() {
        let engine = LocalEngine::in_memory();
        assert!(matches!(
            engine.resume_pack(99).await,
            Err(EngineError::PackNotFound(99))
        ));
        assert!(matches!(
            engine.remove_pack(99).await,
            Err(EngineError::PackNotFound(99))
        ));
        assert!(matches!(
            engine.report_progress(99, 1, 2),
            Err(EngineError::PackNotFound(99))
        ));
    }

    #[tokio::test]
    async fn test_pack_for_region() {
        let engine = LocalEngine::in_memory();
        let handle = engine
            .create_pack(definition("style://x"), context(77))
            .await
            .unwrap();

        assert_eq!(engine.pack_for_region(77).unwrap(), Some(handle.id));
        assert_eq!(engine.pack_for_region(78).unwrap(), None);
    }

    #[tokio::test]
    async fn test_report_progress_is_broadcast() {
        let engine = LocalEngine::in_memory();
        let mut events = engine.subscribe();
        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();

        engine.report_progress(handle.id, 5, 10).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            PackEvent::Progress {
                pack: handle,
                progress: PackProgress::new(5, 10),
                state: PackState::Active,
            }
        );
    }

    #[tokio::test]
    async fn test_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let config = LocalEngineConfig::default().with_store_path(dir.path().join("packs.json"));

        let handle = {
            let engine = LocalEngine::new(config.clone());
            engine
                .create_pack(definition("style://x"), context(5))
                .await
                .unwrap()
        };

        let engine = LocalEngine::new(config);
        let packs = engine.list_packs().await.unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].handle, handle);

        // New ids continue after the persisted ones
        let second = engine
            .create_pack(definition("style://x"), context(6))
            .await
            .unwrap();
        assert!(second.id > handle.id);
    }

    #[tokio::test]
    async fn test_unreadable_store_fails_listing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packs.json");
        std::fs::write(&path, "{ broken").unwrap();

        let engine = LocalEngine::new(LocalEngineConfig::default().with_store_path(&path));
        assert!(matches!(
            engine.list_packs().await,
            Err(EngineError::Storage(_))
        ));
    }

    #[tokio::test]
    async fn test_merge_imports_packs_with_new_ids() {
        let dir = TempDir::new().unwrap();
        let other_path = dir.path().join("other.json");
        {
            let other =
                LocalEngine::new(LocalEngineConfig::default().with_store_path(&other_path));
            other
                .create_pack(definition("style://x"), context(10))
                .await
                .unwrap();
            other
                .create_pack(definition("style://y"), context(11))
                .await
                .unwrap();
        }

        let engine = LocalEngine::in_memory();
        let existing = engine
            .create_pack(definition("style://z"), context(12))
            .await
            .unwrap();

        let merged = engine.merge_packs(other_path).await.unwrap();
        assert_eq!(merged.len(), 2);
        assert!(merged.iter().all(|p| p.handle.id != existing.id));
        assert_eq!(engine.list_packs().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_simulation_runs_to_completion() {
        let engine = LocalEngine::new(
            LocalEngineConfig::default().with_simulation(Duration::from_millis(1), 1_000_000),
        );
        let mut events = engine.subscribe();
        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();

        engine.resume_pack(handle.id).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            PackEvent::Progress {
                progress, state, ..
            } => {
                assert_eq!(state, PackState::Complete);
                assert!(progress.is_complete());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_simulation_enforces_tile_limit() {
        let engine = LocalEngine::new(
            LocalEngineConfig::default().with_simulation(Duration::from_millis(1), 1),
        );
        engine.set_tile_count_limit(1);
        assert_eq!(engine.tile_count_limit(), 1);

        let mut events = engine.subscribe();
        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();
        engine.resume_pack(handle.id).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            PackEvent::TileCountLimitExceeded {
                pack: handle,
                maximum: 1
            }
        );
    }

    #[tokio::test]
    async fn test_suspend_deactivates_pack() {
        let engine = LocalEngine::in_memory();
        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();

        engine.resume_pack(handle.id).await.unwrap();
        assert_eq!(engine.list_packs().await.unwrap()[0].state, PackState::Active);

        engine.suspend_pack(handle.id).await.unwrap();
        assert_eq!(
            engine.list_packs().await.unwrap()[0].state,
            PackState::Inactive
        );
    }

    #[tokio::test]
    async fn test_resuming_complete_pack_reannounces_completion() {
        let engine = LocalEngine::in_memory();
        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();
        engine.report_progress(handle.id, 4, 4).unwrap();

        let mut events = engine.subscribe();
        engine.resume_pack(handle.id).await.unwrap();

        match events.recv().await.unwrap() {
            PackEvent::Progress { state, .. } => assert_eq!(state, PackState::Complete),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_save_keeps_live_table_in_sync() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("packs.json");
        let engine = LocalEngine::new(LocalEngineConfig::default().with_store_path(&path));
        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();
        engine.suspend_pack(handle.id).await.unwrap();

        // A directory where the temp file goes makes every save fail
        let blocker = dir.path().join("packs.json.tmp");
        std::fs::create_dir(&blocker).unwrap();

        assert!(engine.remove_pack(handle.id).await.is_err());
        assert_eq!(engine.list_packs().await.unwrap().len(), 1);
        assert_eq!(PackStore::read_file(&path).unwrap().len(), 1);

        assert!(engine
            .create_pack(definition("style://y"), context(2))
            .await
            .is_err());
        assert!(engine.update_pack_context(handle.id, context(3)).await.is_err());
        let packs = engine.list_packs().await.unwrap();
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0].handle, handle);

        // Retrying once the store is writable again succeeds
        std::fs::remove_dir(&blocker).unwrap();
        engine.remove_pack(handle.id).await.unwrap();
        assert!(engine.list_packs().await.unwrap().is_empty());
        assert!(PackStore::read_file(&path).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_install_replaces_every_pack() {
        let dir = TempDir::new().unwrap();
        let prebuilt = dir.path().join("prebuilt.json");
        let installed_handle = {
            let other = LocalEngine::new(LocalEngineConfig::default().with_store_path(&prebuilt));
            let handle = other
                .create_pack(definition("style://x"), context(40))
                .await
                .unwrap();
            other.resume_pack(handle.id).await.unwrap();
            handle
        };

        let path = dir.path().join("packs.json");
        let engine = LocalEngine::new(LocalEngineConfig::default().with_store_path(&path));
        engine
            .create_pack(definition("style://y"), context(1))
            .await
            .unwrap();

        let installed = engine.install_pack_store(prebuilt).await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].handle, installed_handle);
        assert_eq!(installed[0].state, PackState::Inactive);

        assert_eq!(engine.list_packs().await.unwrap(), installed);
        assert_eq!(engine.pack_for_region(1).unwrap(), None);
        assert_eq!(PackStore::read_file(&path).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_install_of_unreadable_store_changes_nothing() {
        let dir = TempDir::new().unwrap();
        let broken = dir.path().join("broken.json");
        std::fs::write(&broken, "not a store").unwrap();

        let engine = LocalEngine::in_memory();
        let handle = engine
            .create_pack(definition("style://x"), context(1))
            .await
            .unwrap();

        assert!(matches!(
            engine.install_pack_store(broken).await,
            Err(EngineError::Storage(_))
        ));
        assert!(matches!(
            engine.install_pack_store(dir.path().join("missing.json")).await,
            Err(EngineError::Io(_))
        ));
        assert_eq!(engine.list_packs().await.unwrap()[0].handle, handle);
    }
}
