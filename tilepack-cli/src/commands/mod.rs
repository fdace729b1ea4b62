//! CLI command implementations.
//!
//! - [`download`] - download a new region, or resume a persisted one
//! - [`regions`] - list, delete, suspend, update metadata, merge, install, limit

pub mod common;
pub mod download;
pub mod regions;
