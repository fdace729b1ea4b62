//! Settings structs, one per `[section]` of the config file.

use std::path::PathBuf;
use std::time::Duration;

use super::file::config_directory;
use crate::engine::{
    LocalEngineConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_TICK_INTERVAL, DEFAULT_TILES_PER_TICK,
};
use crate::offline::OfflineManagerConfig;

/// Default pack store file name inside the config directory.
pub const DEFAULT_STORE_FILE: &str = "packs.json";

/// Default log file name.
pub const DEFAULT_LOG_FILE: &str = "tilepack.log";

/// Complete configuration loaded from config.ini.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub store: StoreSettings,
    pub download: DownloadSettings,
    pub engine: EngineSettings,
    pub logging: LoggingSettings,
}

/// `[store]`
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSettings {
    /// Pack store JSON file
    pub path: PathBuf,
}

/// `[download]`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DownloadSettings {
    /// Per-pack tile cap (0 = unlimited)
    pub tile_count_limit: u64,
}

/// `[engine]`
#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    /// Advance resumed packs on a timer
    pub simulate: bool,
    pub tick_interval_ms: u64,
    pub tiles_per_tick: u64,
    pub event_capacity: usize,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub directory: PathBuf,
    pub file: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let dir = config_directory();
        Self {
            store: StoreSettings {
                path: dir.join(DEFAULT_STORE_FILE),
            },
            download: DownloadSettings::default(),
            engine: EngineSettings {
                simulate: true,
                tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
                tiles_per_tick: DEFAULT_TILES_PER_TICK,
                event_capacity: DEFAULT_EVENT_CAPACITY,
            },
            logging: LoggingSettings {
                directory: dir.join("logs"),
                file: DEFAULT_LOG_FILE.to_string(),
            },
        }
    }
}

impl ConfigFile {
    /// Local engine configuration backed by the configured store.
    pub fn engine_config(&self) -> LocalEngineConfig {
        LocalEngineConfig {
            store_path: Some(self.store.path.clone()),
            simulate: self.engine.simulate,
            tick_interval: Duration::from_millis(self.engine.tick_interval_ms),
            tiles_per_tick: self.engine.tiles_per_tick,
            event_capacity: self.engine.event_capacity,
        }
    }

    pub fn manager_config(&self) -> OfflineManagerConfig {
        OfflineManagerConfig {
            tile_count_limit: Some(self.download.tile_count_limit),
        }
    }
}
