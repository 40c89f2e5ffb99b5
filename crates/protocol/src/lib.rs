//! Wire types for the replkit channel protocol.
//!
//! This crate contains the serde-serializable types exchanged with the remote
//! execution backend over multiplexed channels. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization/deserialization
//! * 1:1 with the channel services: Match the payload shapes each named
//!   service (`files`, `exec`, `shell`, `shellrun2`, `packager3`, `snapshot`)
//!   accepts and emits
//! * Stable: Changes only when the wire payloads change
//!
//! The session/channel machinery built on top of these types lives in
//! `replkit-client`.

pub mod auth;
pub mod files;
pub mod frame;
pub mod service;

pub use auth::*;
pub use files::*;
pub use frame::*;
pub use service::*;

/// Serde adapter for binary payloads carried as base64 strings.
pub mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}
