use std::path::{Path, PathBuf};
use std::sync::Arc;

use webagent_kernel::Config;

pub struct CliContext {
    config: Arc<Config>,
    config_path: PathBuf,
    config_loaded: bool,
}

impl CliContext {
    pub fn new(config: Config, config_path: PathBuf, config_loaded: bool) -> Self {
        Self {
            config: Arc::new(config),
            config_path,
            config_loaded,
        }
    }

    pub fn config(&self) -> &Config {
        self.config.as_ref()
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Whether the settings came from a file rather than built-in defaults.
    pub fn config_loaded(&self) -> bool {
        self.config_loaded
    }
}
