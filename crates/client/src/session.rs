//! One authenticated logical connection to the remote execution backend.
//!
//! A `Session` owns the transport, the token obtained from the exchange
//! endpoint, and a cache of open channels keyed by service name. Channel
//! opens are memoized in flight, so racing callers for the same name share
//! one open instead of leaking a duplicate channel.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use replkit_proto::{
    CommandOutput, ExecRequest, FileEntry, FilesRequest, PackagerRequest, ReadReply, ReaddirReply,
    RunMessage, SnapshotRequest,
};
use serde_json::Value;
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::token;
use crate::transport::{Transport, WsTransport};

/// Endpoints for establishing a session.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Base URL of the token-issuance API.
    pub api_base: String,
    /// Base URL of the WebSocket gateway.
    pub gateway_base: String,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            api_base: "https://repl.it/api/v0".to_string(),
            gateway_base: "wss://eval.repl.it".to_string(),
        }
    }
}

pub struct Session {
    transport: Arc<dyn Transport>,
    token: String,
    channels: Mutex<HashMap<String, Arc<OnceCell<Channel>>>>,
}

impl Session {
    /// Exchanges the credential for a token and opens the transport.
    ///
    /// The transport receives a token-supplier callback rather than the bare
    /// token so it may re-fetch lazily; the token itself is immutable for
    /// the session's lifetime.
    pub async fn connect(identity: &str, api_key: &str, options: &ConnectOptions) -> Result<Self> {
        let token = token::exchange(&options.api_base, identity, api_key).await?;
        debug!(target = "replkit.session", %identity, "token acquired, opening transport");

        let supplier = {
            let token = token.clone();
            Arc::new(move || token.clone()) as Arc<dyn Fn() -> String + Send + Sync>
        };
        let transport = WsTransport::connect(&options.gateway_base, identity, supplier).await?;
        Ok(Self::with_transport(Arc::new(transport), token))
    }

    /// Builds a session over an already-open transport.
    pub fn with_transport(transport: Arc<dyn Transport>, token: String) -> Self {
        Self {
            transport,
            token,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the channel for `name`, opening it on first use.
    ///
    /// The per-name cell memoizes the in-flight open, so concurrent callers
    /// racing before the first open settles still receive the same channel.
    pub async fn channel(&self, name: &str) -> Result<Channel> {
        let cell = {
            let mut channels = self.channels.lock().await;
            Arc::clone(
                channels
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::new(OnceCell::new())),
            )
        };

        let channel = cell
            .get_or_try_init(|| async {
                debug!(target = "replkit.session", service = %name, "opening channel");
                let raw = self.transport.open_channel(name).await?;
                Ok::<_, Error>(Channel::open(raw))
            })
            .await?;
        Ok(channel.clone())
    }

    /// Reads a remote file, returning its decoded content.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let channel = self.channel("files").await?;
        let reply = channel
            .request(FilesRequest::Read {
                path: normalize_path(path),
            })
            .await?;
        let reply: ReadReply = serde_json::from_value(reply)?;
        Ok(reply.file.content)
    }

    /// Writes a remote file. Content is carried base64-encoded on the wire.
    pub async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let channel = self.channel("files").await?;
        channel
            .request(FilesRequest::Write {
                path: normalize_path(path),
                content: content.to_vec(),
            })
            .await?;
        Ok(())
    }

    /// Lists a remote directory.
    pub async fn readdir(&self, path: &str) -> Result<Vec<FileEntry>> {
        let channel = self.channel("files").await?;
        let reply = channel
            .request(FilesRequest::Readdir {
                path: normalize_path(path),
            })
            .await?;
        let reply: ReaddirReply = serde_json::from_value(reply)?;
        Ok(reply.files.files)
    }

    /// Runs a program on the exec service and returns the terminal reply.
    pub async fn exec(&self, args: Vec<String>) -> Result<Value> {
        let channel = self.channel("exec").await?;
        channel.request(ExecRequest::Exec { args, env: None }).await
    }

    /// Starts the main program and waits for the next command push.
    pub async fn run(&self, timeout: Option<Duration>) -> Result<Value> {
        let channel = self.channel("shellrun2").await?;
        channel.send(RunMessage::RunMain {})?;
        channel.wait_for_command(timeout).await
    }

    /// Stops the running program and waits for the next command push.
    pub async fn stop(&self, timeout: Option<Duration>) -> Result<Value> {
        let channel = self.channel("shellrun2").await?;
        channel.send(RunMessage::Clear {})?;
        channel.wait_for_command(timeout).await
    }

    /// Installs project packages, forwarding streamed log events to `log`.
    pub async fn install<F>(&self, timeout: Option<Duration>, mut log: F) -> Result<()>
    where
        F: FnMut(&CommandOutput),
    {
        let channel = self.channel("packager3").await?;
        let mut events = channel.subscribe();

        let work = async {
            let request = channel.request(PackagerRequest::PackageInstall {});
            tokio::pin!(request);
            loop {
                tokio::select! {
                    reply = &mut request => {
                        reply?;
                        // Drain log events that raced with the final reply.
                        while let Some(message) = events.try_next() {
                            if let Ok(output) = serde_json::from_value::<CommandOutput>(message) {
                                log(&output);
                            }
                        }
                        return Ok(());
                    }
                    event = events.next() => {
                        match event {
                            Some(message) => {
                                if let Ok(output) = serde_json::from_value::<CommandOutput>(message) {
                                    log(&output);
                                }
                            }
                            None => return Err(Error::ConnectionClosed),
                        }
                    }
                }
            }
        };

        match timeout.filter(|t| !t.is_zero()) {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| Error::Timeout)?,
            None => work.await,
        }
    }

    /// Persists the current state of written files durably.
    pub async fn snapshot(&self) -> Result<()> {
        let channel = self.channel("snapshot").await?;
        channel.request(SnapshotRequest::FsSnapshot {}).await?;
        Ok(())
    }

    /// Releases the transport. Idempotent; open channels die with it.
    pub async fn close(&self) {
        self.transport.close().await;
    }
}

/// Normalizes a path per the remote filesystem contract: no leading `./`,
/// no trailing `/`, empty string for the project root. Idempotent.
pub fn normalize_path(path: &str) -> String {
    let path = path.strip_prefix("./").unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);
    path.to_string()
}
