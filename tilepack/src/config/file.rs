//! Loading and saving `~/.tilepack/config.ini`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use super::settings::ConfigFile;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl ConfigFile {
    /// Load configuration from `~/.tilepack/config.ini`.
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path. A missing file is defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Save configuration to `~/.tilepack/config.ini`.
    pub fn save(&self) -> Result<(), ConfigFileError> {
        self.save_to(&config_file_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }

        std::fs::write(path, to_config_string(self))
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Write the default config file if none exists. Returns its path.
    pub fn ensure_exists() -> Result<PathBuf, ConfigFileError> {
        let path = config_file_path();
        if !path.exists() {
            Self::default().save_to(&path)?;
        }
        Ok(path)
    }
}

/// The config directory (`~/.tilepack`).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilepack")
}

/// The config file (`~/.tilepack/config.ini`).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

fn parse_ini(ini: &Ini) -> Result<ConfigFile, ConfigFileError> {
    let mut config = ConfigFile::default();

    if let Some(section) = ini.section(Some("store")) {
        if let Some(v) = section.get("path") {
            let v = v.trim();
            if !v.is_empty() {
                config.store.path = expand_tilde(v);
            }
        }
    }

    if let Some(section) = ini.section(Some("download")) {
        if let Some(v) = section.get("tile_count_limit") {
            config.download.tile_count_limit =
                parse_number("download", "tile_count_limit", v, "expected a tile count, 0 = unlimited")?;
        }
    }

    if let Some(section) = ini.section(Some("engine")) {
        if let Some(v) = section.get("simulate") {
            config.engine.simulate = parse_bool(v);
        }
        if let Some(v) = section.get("tick_interval_ms") {
            config.engine.tick_interval_ms =
                parse_number("engine", "tick_interval_ms", v, "expected milliseconds")?;
        }
        if let Some(v) = section.get("tiles_per_tick") {
            let tiles: u64 = parse_number("engine", "tiles_per_tick", v, "expected a positive integer")?;
            if tiles == 0 {
                return Err(invalid("engine", "tiles_per_tick", v, "must be at least 1"));
            }
            config.engine.tiles_per_tick = tiles;
        }
        if let Some(v) = section.get("event_capacity") {
            let capacity: usize =
                parse_number("engine", "event_capacity", v, "expected a positive integer")?;
            if capacity == 0 {
                return Err(invalid("engine", "event_capacity", v, "must be at least 1"));
            }
            config.engine.event_capacity = capacity;
        }
    }

    if let Some(section) = ini.section(Some("logging")) {
        if let Some(v) = section.get("directory") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.directory = expand_tilde(v);
            }
        }
        if let Some(v) = section.get("file") {
            let v = v.trim();
            if !v.is_empty() {
                config.logging.file = v.to_string();
            }
        }
    }

    Ok(config)
}

fn to_config_string(config: &ConfigFile) -> String {
    format!(
        r#"[store]
; Pack store file holding every downloaded region
path = {}

[download]
; Maximum tiles a single region may download (0 = unlimited)
tile_count_limit = {}

[engine]
; Advance downloads on a timer (the local engine fetches nothing itself)
simulate = {}
tick_interval_ms = {}
tiles_per_tick = {}
; Engine event buffer; slow listeners drop events beyond this
event_capacity = {}

[logging]
directory = {}
file = {}
"#,
        config.store.path.display(),
        config.download.tile_count_limit,
        config.engine.simulate,
        config.engine.tick_interval_ms,
        config.engine.tiles_per_tick,
        config.engine.event_capacity,
        config.logging.directory.display(),
        config.logging.file,
    )
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_number<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, ConfigFileError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn parse_bool(value: &str) -> bool {
    let v = value.trim().to_lowercase();
    v == "true" || v == "1" || v == "yes" || v == "on"
}

/// Expand `~/` to the home directory.
fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp_dir.path().join("nonexistent.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");

        let mut config = ConfigFile::default();
        config.store.path = temp_dir.path().join("packs.json");
        config.download.tile_count_limit = 6000;
        config.engine.simulate = false;
        config.engine.tiles_per_tick = 7;
        config.logging.file = "custom.log".to_string();
        config.save_to(&path).unwrap();

        assert_eq!(ConfigFile::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[download]\ntile_count_limit = 100\n").unwrap();

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.download.tile_count_limit, 100);
        assert_eq!(config.engine, ConfigFile::default().engine);
    }

    #[test]
    fn test_invalid_number() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[download]\ntile_count_limit = lots\n").unwrap();

        match ConfigFile::load_from(&path) {
            Err(ConfigFileError::InvalidValue { section, key, .. }) => {
                assert_eq!(section, "download");
                assert_eq!(key, "tile_count_limit");
            }
            other => panic!("expected InvalidValue, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_tiles_per_tick_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.ini");
        std::fs::write(&path, "[engine]\ntiles_per_tick = 0\n").unwrap();

        assert!(matches!(
            ConfigFile::load_from(&path),
            Err(ConfigFileError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_bool("true"));
        assert!(parse_bool(" Yes "));
        assert!(parse_bool("1"));
        assert!(!parse_bool("false"));
        assert!(!parse_bool("nope"));
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/packs.json"), home.join("packs.json"));
        }
    }

    #[test]
    fn test_config_paths() {
        assert!(config_file_path().ends_with(".tilepack/config.ini"));
    }
}
