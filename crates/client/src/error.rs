//! Error taxonomy for the session/channel layer.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing credential, or a failed token exchange. Always fatal
    /// for callers.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Remote-reported protocol error on a request.
    #[error("channel error: {0}")]
    Channel(String),

    /// A bounded wait elapsed without the expected command.
    #[error("timed out waiting for command")]
    Timeout,

    /// Invalid path supplied before any network activity.
    #[error("{0}")]
    Path(String),

    /// The transport closed while a request or wait was outstanding.
    #[error("connection closed")]
    ConnectionClosed,

    /// Unrecoverable transport failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
