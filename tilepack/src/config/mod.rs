//! User configuration in `~/.tilepack/config.ini`.
//!
//! ```ini
//! [store]
//! path = ~/.tilepack/packs.json
//!
//! [download]
//! tile_count_limit = 6000
//!
//! [engine]
//! simulate = true
//! tick_interval_ms = 200
//! tiles_per_tick = 50
//! event_capacity = 1024
//!
//! [logging]
//! directory = ~/.tilepack/logs
//! file = tilepack.log
//! ```
//!
//! A missing file yields defaults; missing keys keep their default value.

mod file;
mod settings;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{
    ConfigFile, DownloadSettings, EngineSettings, LoggingSettings, StoreSettings,
    DEFAULT_LOG_FILE, DEFAULT_STORE_FILE,
};
