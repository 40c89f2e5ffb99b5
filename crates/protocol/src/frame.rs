//! Session-level frames and control-channel bodies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One multiplexed message as it crosses the transport.
///
/// `ref` is present only on requests and their correlated replies; messages
/// without it are fire-and-forget commands or unsolicited server pushes.
/// The body is kept opaque here: each channel service defines its own
/// payload shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Target channel id. Channel 0 is the control channel.
    pub channel: u32,
    /// Correlation token for request/reply pairs.
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Service payload.
    #[serde(flatten)]
    pub body: Value,
}

impl Frame {
    pub fn command(channel: u32, body: Value) -> Self {
        Self {
            channel,
            reference: None,
            body,
        }
    }

    pub fn request(channel: u32, reference: String, body: Value) -> Self {
        Self {
            channel,
            reference: Some(reference),
            body,
        }
    }
}

/// Requests carried on the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlRequest {
    /// Open a named service channel.
    OpenChan { service: String },
}

/// Replies carried on the control channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ControlResponse {
    /// Acknowledges an `openChan` request with the allocated channel id.
    OpenChanRes {
        id: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn frame_serializes_body_inline() {
        let frame = Frame::request(3, "r1".to_string(), json!({"read": {"path": "main.py"}}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(
            value,
            json!({"channel": 3, "ref": "r1", "read": {"path": "main.py"}})
        );
    }

    #[test]
    fn frame_without_reference_omits_ref_key() {
        let frame = Frame::command(2, json!({"input": "ls\n"}));
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value, json!({"channel": 2, "input": "ls\n"}));
    }

    #[test]
    fn open_chan_round_trip() {
        let value = serde_json::to_value(ControlRequest::OpenChan {
            service: "files".to_string(),
        })
        .unwrap();
        assert_eq!(value, json!({"openChan": {"service": "files"}}));

        let res: ControlResponse =
            serde_json::from_value(json!({"openChanRes": {"id": 4}})).unwrap();
        let ControlResponse::OpenChanRes { id, error } = res;
        assert_eq!(id, 4);
        assert!(error.is_none());
    }
}
