//! Offline region downloads.
//!
//! This module turns the engine's process-wide pack events into one ordered
//! progress stream per requested region:
//!
//! - [`OfflineManager`] - download, list, delete, suspend/resume, metadata
//!   updates, merging, tile count limit
//! - [`Downloader`] - per-region state machine with identity filtering and a
//!   single terminal transition
//! - [`DownloaderRegistry`] - live downloaders keyed by region id
//! - [`ProgressChannel`] / [`ProgressStream`] - `start`, `progress`,
//!   `success`, `error` events
//!
//! # Guarantees
//!
//! - `Start` precedes every `Progress` of the same region
//! - at most one terminal event (`Success` or `Error`) per download, and the
//!   completion resolves exactly once
//! - deleting a region always suspends its pack before removing it

mod channel;
mod downloader;
mod error;
mod ids;
mod manager;
mod registry;

pub use channel::{
    channel_name, ProgressChannel, ProgressEvent, ProgressStream, DOWNLOAD_CHANNEL_PREFIX,
};
pub use downloader::{DownloadState, Downloader};
pub use error::OfflineError;
pub use manager::{DownloadCompletion, OfflineManager, OfflineManagerConfig, RegionDownload};
pub use registry::{DownloaderRegistry, Ticket};
