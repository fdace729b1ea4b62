//! Region records and the context blob that ties them to engine packs.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::RegionDefinition;

/// Process-unique region identifier, generated by the manager.
pub type RegionId = i64;

/// Opaque caller metadata, round-tripped verbatim.
pub type Metadata = serde_json::Map<String, Value>;

/// Metadata key reserved for the region id inside the context blob.
pub const RESERVED_ID_KEY: &str = "id";

/// A context blob could not be turned back into a record.
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("context is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("context is not a JSON object")]
    NotAnObject,

    #[error("context has no integer \"id\" key")]
    MissingId,
}

/// Persisted identity + metadata + definition of one offline region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRecord {
    id: RegionId,
    metadata: Metadata,
    definition: RegionDefinition,
}

impl RegionRecord {
    /// Create a record. A caller-supplied `id` key in `metadata` is dropped.
    pub fn new(id: RegionId, mut metadata: Metadata, definition: RegionDefinition) -> Self {
        metadata.remove(RESERVED_ID_KEY);
        Self {
            id,
            metadata,
            definition,
        }
    }

    pub fn id(&self) -> RegionId {
        self.id
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn definition(&self) -> &RegionDefinition {
        &self.definition
    }

    /// Same region with its metadata replaced.
    pub fn with_metadata(&self, metadata: Metadata) -> Self {
        Self::new(self.id, metadata, self.definition.clone())
    }

    /// Merge the metadata with the reserved id key into the blob the engine
    /// stores alongside the pack.
    pub fn to_context(&self) -> Vec<u8> {
        let mut context = self.metadata.clone();
        context.insert(RESERVED_ID_KEY.to_string(), Value::from(self.id));
        Value::Object(context).to_string().into_bytes()
    }

    /// Rebuild a record from a pack's context blob and definition.
    pub fn from_context(
        context: &[u8],
        definition: RegionDefinition,
    ) -> Result<Self, RecordError> {
        let (id, metadata) = parse_context(context)?;
        Ok(Self::new(id, metadata, definition))
    }

    /// The region id stored in a context blob, if it has one.
    pub fn id_from_context(context: &[u8]) -> Option<RegionId> {
        parse_context(context).ok().map(|(id, _)| id)
    }

    /// Stable JSON form: `{"id": .., "metadata": {..}, "definition": {..}}`.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }

    pub fn from_json(json: &str) -> Result<Self, RecordError> {
        let record: RegionRecord = serde_json::from_str(json)?;
        Ok(Self::new(record.id, record.metadata, record.definition))
    }
}

fn parse_context(context: &[u8]) -> Result<(RegionId, Metadata), RecordError> {
    let value: Value = serde_json::from_slice(context)?;
    let Value::Object(mut metadata) = value else {
        return Err(RecordError::NotAnObject);
    };

    let id = metadata
        .remove(RESERVED_ID_KEY)
        .as_ref()
        .and_then(context_id)
        .ok_or(RecordError::MissingId)?;

    Ok((id, metadata))
}

fn context_id(value: &Value) -> Option<RegionId> {
    // Some writers encode every number as a double
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < 9.0e15)
            .map(|f| f as RegionId)
    })
}
