//! Payloads for the `files` service.
//!
//! Paths on these payloads follow the remote filesystem contract: always
//! relative, no leading `./` or `/`, no trailing `/`; the empty string refers
//! to the project root.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Requests accepted by the `files` service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilesRequest {
    Read {
        path: String,
    },
    Write {
        path: String,
        #[serde(with = "crate::base64_bytes")]
        content: Vec<u8>,
    },
    Readdir {
        path: String,
    },
}

/// Reply to `read`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadReply {
    pub file: File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    #[serde(default)]
    pub path: String,
    #[serde(default, with = "crate::base64_bytes")]
    pub content: Vec<u8>,
}

/// Reply to `readdir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReaddirReply {
    pub files: FileList,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(default, rename = "type")]
    pub kind: FileKind,
}

/// Entry kind as reported by `readdir`.
///
/// The backend emits either the numeric enum value or its name, so
/// deserialization accepts both forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileKind {
    #[default]
    Regular,
    Directory,
}

impl Serialize for FileKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FileKind::Regular => serializer.serialize_str("REGULAR"),
            FileKind::Directory => serializer.serialize_str("DIRECTORY"),
        }
    }
}

impl<'de> Deserialize<'de> for FileKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        Ok(match value {
            serde_json::Value::Number(n) if n.as_u64() == Some(1) => FileKind::Directory,
            serde_json::Value::String(s) if s == "DIRECTORY" => FileKind::Directory,
            _ => FileKind::Regular,
        })
    }
}
