//! JSON file persistence for the local engine's pack table.
//!
//! The whole table is rewritten on every mutation: write to a sibling
//! `.tmp` file, then rename over the original.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{EngineError, PackHandle, PackId, PackInfo, PackProgress, PackState};
use crate::region::RegionDefinition;

const STORE_VERSION: u32 = 1;

/// One pack as persisted by [`PackStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPack {
    pub id: PackId,
    pub definition: RegionDefinition,
    pub context: Vec<u8>,
    #[serde(default)]
    pub progress: PackProgress,
    #[serde(default)]
    pub state: PackState,
}

impl StoredPack {
    pub fn handle(&self) -> PackHandle {
        PackHandle {
            id: self.id,
            context: self.context.clone(),
        }
    }

    pub fn info(&self) -> PackInfo {
        PackInfo {
            handle: self.handle(),
            definition: self.definition.clone(),
            progress: self.progress,
            state: self.state,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    packs: Vec<StoredPack>,
}

/// Where the pack table lives. `None` keeps it in memory only.
#[derive(Debug, Clone, Default)]
pub struct PackStore {
    path: Option<PathBuf>,
}

impl PackStore {
    /// A store that never touches the filesystem.
    pub fn memory() -> Self {
        Self { path: None }
    }

    /// A store backed by the JSON file at `path`.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Load all packs. A missing file is an empty store.
    pub fn load(&self) -> Result<Vec<StoredPack>, EngineError> {
        match &self.path {
            Some(path) if path.exists() => Self::read_file(path),
            _ => Ok(Vec::new()),
        }
    }

    /// Read the packs of any store file (used for merging).
    pub fn read_file(path: &Path) -> Result<Vec<StoredPack>, EngineError> {
        let bytes = fs::read(path)?;
        let file: StoreFile = serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::Storage(format!("cannot parse {}: {}", path.display(), e))
        })?;
        Ok(file.packs)
    }

    /// Persist the full pack table.
    pub fn save<'a>(&self, packs: impl Iterator<Item = &'a StoredPack>) -> Result<(), EngineError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = StoreFile {
            version: STORE_VERSION,
            packs: packs.cloned().collect(),
        };
        let json = serde_json::to_vec_pretty(&file)
            .map_err(|e| EngineError::Storage(format!("cannot encode pack table: {}", e)))?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            EngineError::Io(io::Error::new(
                e.kind(),
                format!("cannot replace {}: {}", path.display(), e),
            ))
        })
    }
}
