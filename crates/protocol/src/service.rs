//! Payloads for the execution-oriented services.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Requests accepted by the `exec` service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExecRequest {
    Exec {
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        env: Option<HashMap<String, String>>,
    },
}

/// Fire-and-forget messages accepted by the `shell` service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShellMessage {
    /// Raw keystrokes, forwarded verbatim to the remote pty.
    Input(String),
    ResizeTerm { rows: u16, cols: u16 },
}

/// Messages accepted by the `shellrun2` service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RunMessage {
    RunMain {},
    Clear {},
}

/// Requests accepted by the `packager3` service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PackagerRequest {
    PackageInstall {},
}

/// Requests accepted by the `snapshot` service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SnapshotRequest {
    FsSnapshot {},
}

/// Unsolicited command shape pushed by the execution services.
///
/// Not every field is present on every push; `output` carries terminal
/// bytes, `state` transitions on `shellrun2` (0 means stopped), `error`
/// carries a remote-reported failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
