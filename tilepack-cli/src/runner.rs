//! CLI runner for common setup.
//!
//! Loads the config file, initializes logging and starts the offline
//! manager on a local engine backed by the configured pack store.

use std::path::Path;
use std::sync::Arc;

use tilepack::config::ConfigFile;
use tilepack::engine::LocalEngine;
use tilepack::logging::{init_logging, LoggingGuard};
use tilepack::offline::OfflineManager;
use tracing::info;

use crate::error::CliError;

/// Runner that manages CLI lifecycle.
pub struct CliRunner {
    _logging_guard: LoggingGuard,
    config: ConfigFile,
    manager: OfflineManager,
}

impl CliRunner {
    /// Load config (from `config_path` or the default location), start
    /// logging and the offline manager.
    pub fn new(config_path: Option<&Path>) -> Result<Self, CliError> {
        let config = match config_path {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };

        let logging_guard = init_logging(&config.logging.directory, &config.logging.file)
            .map_err(|e| CliError::LoggingInit(e.to_string()))?;

        let engine = Arc::new(LocalEngine::new(config.engine_config()));
        let manager = OfflineManager::start(engine, config.manager_config());

        Ok(Self {
            _logging_guard: logging_guard,
            config,
            manager,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn manager(&self) -> &OfflineManager {
        &self.manager
    }

    /// Log startup information for a command.
    pub fn log_startup(&self, command: &str) {
        info!("Tilepack v{}", env!("CARGO_PKG_VERSION"));
        info!(
            store = %self.config.store.path.display(),
            "Tilepack CLI: {} command",
            command
        );
    }
}

impl Drop for CliRunner {
    fn drop(&mut self) {
        self.manager.shutdown();
    }
}
