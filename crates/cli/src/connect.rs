//! Identity resolution and session factories.
//!
//! Commands acquire sessions through the [`SessionFactory`] seam. The real
//! factory performs the token exchange and transport open; the caching
//! decorator shares one session per identity, which is how a bulk run avoids
//! reconnecting between sub-commands.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use colored::Colorize;
use replkit_client::{ConnectOptions, Session};
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{CliError, Result};

pub const KEY_SITE: &str = "https://devs.turbio.repl.co";

/// Heuristic for obviously invalid credentials: two colon-separated parts,
/// each longer than five characters.
pub fn is_key(key: &str) -> bool {
    let parts: Vec<&str> = key.split(':').collect();
    parts.len() == 2 && parts.iter().all(|part| part.len() > 5)
}

/// Endpoints for identity resolution and session establishment.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub connect: ConnectOptions,
    /// Base URL for resolving `@user/slug` names to repl ids.
    pub data_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            connect: ConnectOptions::default(),
            data_base: "https://repl.it/data".to_string(),
        }
    }
}

/// Resolves a repl spec to an identity. `@user/slug` names go through the
/// data endpoint; anything else is already an id.
pub async fn resolve_identity(endpoints: &Endpoints, spec: &str) -> Result<String> {
    if !spec.starts_with('@') {
        return Ok(spec.to_string());
    }

    let url = format!(
        "{}/repls/{}",
        endpoints.data_base.trim_end_matches('/'),
        spec
    );
    debug!(target = "replkit", %spec, "resolving repl id");

    let response = reqwest::get(&url).await?;
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(CliError::fatal(format!(
            "Repl not found: {spec}\n\
             If this is a private repl, open {url} in a browser,\n\
             copy the id value near the beginning of the response,\n\
             and re-run the command with that id instead of the name."
        )));
    }
    let data: serde_json::Value = response.error_for_status()?.json().await?;
    data.get("id")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| CliError::fatal(format!("Could not read the id of {spec}")))
}

#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Returns an authenticated session for the given repl identity.
    async fn session(&self, repl_id: &str, api_key: &str) -> Result<Arc<Session>>;
}

/// Factory that performs a fresh token exchange and transport open per call.
pub struct ConnectFactory {
    connect: ConnectOptions,
    show_connecting: bool,
}

impl ConnectFactory {
    pub fn new(connect: ConnectOptions, show_connecting: bool) -> Self {
        Self {
            connect,
            show_connecting,
        }
    }
}

#[async_trait]
impl SessionFactory for ConnectFactory {
    async fn session(&self, repl_id: &str, api_key: &str) -> Result<Arc<Session>> {
        if self.show_connecting {
            println!("{}", "Starting connection...".green());
        }
        let session = Session::connect(repl_id, api_key, &self.connect).await?;
        Ok(Arc::new(session))
    }
}

/// Decorator that caches sessions per identity for the lifetime of one
/// invocation. Never persisted.
pub struct CachingFactory {
    inner: Arc<dyn SessionFactory>,
    cache: Mutex<HashMap<String, Arc<Session>>>,
}

impl CachingFactory {
    pub fn new(inner: Arc<dyn SessionFactory>) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Closes every cached session.
    pub async fn close_all(&self) {
        for (_, session) in self.cache.lock().await.drain() {
            session.close().await;
        }
    }
}

#[async_trait]
impl SessionFactory for CachingFactory {
    async fn session(&self, repl_id: &str, api_key: &str) -> Result<Arc<Session>> {
        let mut cache = self.cache.lock().await;
        if let Some(session) = cache.get(repl_id) {
            debug!(target = "replkit", %repl_id, "reusing cached session");
            return Ok(Arc::clone(session));
        }
        let session = self.inner.session(repl_id, api_key).await?;
        cache.insert(repl_id.to_string(), Arc::clone(&session));
        Ok(session)
    }
}
