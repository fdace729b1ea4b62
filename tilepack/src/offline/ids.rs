//! Region id allocation.
//!
//! Ids are seeded once from the engine's persisted packs and the wall
//! clock, then handed out from an atomic counter. An id is never reused
//! while a pack carrying it exists.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::engine::TileEngine;
use crate::region::{RegionId, RegionRecord};

#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: AtomicI64,
    seeded: OnceCell<()>,
}

impl IdAllocator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Next fresh id.
    pub(crate) async fn next(&self, engine: &dyn TileEngine) -> RegionId {
        self.seeded
            .get_or_init(|| async {
                let persisted = match engine.list_packs().await {
                    Ok(packs) => packs
                        .iter()
                        .filter_map(|p| RegionRecord::id_from_context(&p.handle.context))
                        .max(),
                    Err(e) => {
                        warn!(error = %e, "Cannot read pack store, seeding region ids from clock");
                        None
                    }
                };
                let seed = Utc::now()
                    .timestamp_millis()
                    .max(persisted.map_or(0, |id| id.saturating_add(1)));
                debug!(seed, "Region id allocator seeded");
                self.next.fetch_max(seed, Ordering::SeqCst);
            })
            .await;

        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Make sure future ids are greater than `id`.
    pub(crate) fn observe(&self, id: RegionId) {
        self.next.fetch_max(id.saturating_add(1), Ordering::SeqCst);
    }
}
