//! JSON configuration store.
//!
//! An explicit store object with its own cache, constructed once per
//! invocation and threaded through the command context, so tests can point
//! it at a scratch file instead of sharing process-wide state.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

const CONFIG_FILENAME: &str = "replkit.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Credential in the `xxxxx:xxxxx` form.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Local directory -> repl identity.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub repls: HashMap<String, String>,
}

pub struct ConfigStore {
    path: PathBuf,
    cache: Option<Config>,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path, cache: None }
    }

    /// `replkit.json` under the user config dir when one exists, otherwise
    /// under the home directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_FILENAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the configuration, reading the file on first access.
    ///
    /// A missing or unparseable file is replaced with a blank configuration
    /// rather than failing the command.
    pub fn load(&mut self) -> Result<&Config> {
        if self.cache.is_none() {
            let config = match self.read_and_parse() {
                Ok(config) => config,
                Err(e) => {
                    debug!(target = "replkit", error = %e, "resetting unreadable config");
                    let blank = Config::default();
                    self.write(&blank)?;
                    blank
                }
            };
            self.cache = Some(config);
        }
        Ok(self.cache.get_or_insert_with(Config::default))
    }

    /// Applies `mutate` to the configuration and persists the result.
    pub fn update(&mut self, mutate: impl FnOnce(&mut Config)) -> Result<()> {
        let mut config = self.load()?.clone();
        mutate(&mut config);
        self.write(&config)?;
        self.cache = Some(config);
        Ok(())
    }

    fn read_and_parse(&self) -> Result<Config> {
        debug!(target = "replkit", path = %self.path.display(), "reading config");
        let text = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&text)?)
    }

    fn write(&self, config: &Config) -> Result<()> {
        debug!(target = "replkit", path = %self.path.display(), "writing config");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string(config)?)?;
        Ok(())
    }
}
