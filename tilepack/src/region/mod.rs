//! Region values: what to download and how a persisted download is identified.
//!
//! - [`RegionDefinition`] - immutable bounds + style + zoom range
//! - [`RegionRecord`] - generated id + caller metadata + definition
//!
//! A record is attached to its engine pack through the *context blob*:
//! `{"id": <id>, ...metadata}` serialized as JSON bytes. The blob is the only
//! durable state this crate owns; everything else is read back from the
//! engine's pack objects.

mod definition;
mod record;

pub use definition::{DefinitionError, LatLng, LatLngBounds, RegionDefinition, MAX_ZOOM};
pub use record::{Metadata, RecordError, RegionId, RegionRecord, RESERVED_ID_KEY};
