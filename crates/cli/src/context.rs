//! Shared state threaded through command handlers.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use replkit_client::Session;

use crate::config::ConfigStore;
use crate::connect::{is_key, resolve_identity, ConnectFactory, Endpoints, SessionFactory};
use crate::error::{CliError, Result};

pub struct CommandContext {
    config: Arc<Mutex<ConfigStore>>,
    endpoints: Endpoints,
    sessions: Arc<dyn SessionFactory>,
}

impl CommandContext {
    pub fn new(config_path: PathBuf, endpoints: Endpoints, show_connecting: bool) -> Self {
        let sessions = Arc::new(ConnectFactory::new(endpoints.connect.clone(), show_connecting));
        Self {
            config: Arc::new(Mutex::new(ConfigStore::new(config_path))),
            endpoints,
            sessions,
        }
    }

    /// Same configuration and endpoints, different session factory. Bulk uses
    /// this to swap in a caching factory for its sub-commands.
    pub fn with_sessions(&self, sessions: Arc<dyn SessionFactory>) -> Self {
        Self {
            config: Arc::clone(&self.config),
            endpoints: self.endpoints.clone(),
            sessions,
        }
    }

    pub fn config(&self) -> MutexGuard<'_, ConfigStore> {
        match self.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn sessions(&self) -> Arc<dyn SessionFactory> {
        Arc::clone(&self.sessions)
    }

    /// The stored API key, with `REPLKIT_KEY` taking precedence. Fails when
    /// neither source holds a plausible key.
    pub fn require_key(&self) -> Result<String> {
        let stored = self.config().load()?.key.clone();
        let key = std::env::var("REPLKIT_KEY").ok().or(stored);
        match key {
            Some(key) if is_key(&key) => Ok(key),
            _ => Err(CliError::fatal(
                "Missing or invalid API key! Run the auth command before this one.",
            )),
        }
    }

    /// Looks up the repl linked to a directory, if any.
    pub fn linked_repl(&self, dir: &Path) -> Result<Option<String>> {
        let mut config = self.config();
        Ok(config.load()?.repls.get(&dir.display().to_string()).cloned())
    }

    /// Resolves the repl to target: an explicit argument wins, otherwise the
    /// link recorded for the current directory.
    pub async fn resolve_repl(&self, arg: Option<&str>) -> Result<String> {
        match arg {
            Some(spec) => resolve_identity(&self.endpoints, spec).await,
            None => {
                let cwd = std::env::current_dir().map_err(CliError::from)?;
                self.linked_repl(&cwd)?.ok_or_else(|| {
                    CliError::fatal(
                        "No repl given and this directory is not linked to one. \
                         Pass a repl or run the link command first.",
                    )
                })
            }
        }
    }

    /// Resolves the target repl and returns an authenticated session for it.
    pub async fn session(&self, repl_arg: Option<&str>) -> Result<Arc<Session>> {
        let key = self.require_key()?;
        let id = self.resolve_repl(repl_arg).await?;
        self.sessions.session(&id, &key).await
    }
}
