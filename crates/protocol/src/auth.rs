//! Token-exchange payloads.

use serde::{Deserialize, Serialize};

/// Body of `POST /repls/{id}/token`.
///
/// The success reply is a bare JSON string carrying the short-lived access
/// token, so no reply type is defined here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub api_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_request_uses_camel_case_key() {
        let body = TokenRequest {
            api_key: "aaaaaa:bbbbbb".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({"apiKey": "aaaaaa:bbbbbb"})
        );
    }
}
