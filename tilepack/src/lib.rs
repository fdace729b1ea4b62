//! Tilepack - offline map region downloads.
//!
//! Request that a bounded geographic area (bounds, style reference, zoom
//! range) be fetched in bulk by a tile engine, follow its progress, then
//! list, update, merge and delete the persisted regions.
//!
//! # Modules
//!
//! - [`region`] - region definitions and records
//! - [`engine`] - the tile engine seam and the in-process [`engine::LocalEngine`]
//! - [`offline`] - the download manager, downloaders and progress channels
//! - [`coord`] - Web Mercator tile math used to size packs
//! - [`config`] - `~/.tilepack/config.ini`
//! - [`logging`] - tracing subscriber setup
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tilepack::engine::LocalEngine;
//! use tilepack::offline::{OfflineManager, OfflineManagerConfig};
//! use tilepack::region::{LatLngBounds, Metadata, RegionDefinition};
//!
//! let engine = Arc::new(LocalEngine::in_memory());
//! let manager = OfflineManager::start(engine, OfflineManagerConfig::default());
//!
//! let definition = RegionDefinition::new(
//!     LatLngBounds::from([[10.0, 10.0], [20.0, 20.0]]),
//!     "mapbox://styles/mapbox/streets-v11",
//!     0.0,
//!     10.0,
//! );
//! let download = manager.download(definition, Metadata::new()).await?;
//! println!("region {}", download.record.id());
//! ```

pub mod config;
pub mod coord;
pub mod engine;
pub mod logging;
pub mod offline;
pub mod region;
