//! Session/channel layer for the remote execution backend.
//!
//! The pieces, leaf-first:
//! * [`transport`] - the seam to the wire: a [`Transport`] trait, the
//!   WebSocket implementation, and an in-memory fake for tests.
//! * [`Channel`] - a named logical pipe multiplexed over one connection:
//!   fire-and-forget sends, correlated request/reply, and subscription to
//!   unsolicited server pushes with an optional bounded wait.
//! * [`Session`] - one authenticated connection owning a cache of channels
//!   plus the convenience operations (read/write/readdir, exec, run/stop,
//!   install, snapshot) built from channel primitives.

pub mod channel;
pub mod error;
pub mod session;
pub mod token;
pub mod transport;

pub use channel::{Channel, CommandStream};
pub use error::{Error, Result};
pub use session::{ConnectOptions, Session, normalize_path};
pub use transport::{FakeTransport, FakeTransportController, RawChannel, Transport, WsTransport};
