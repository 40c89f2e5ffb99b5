//! Token exchange against the token-issuance endpoint.

use replkit_proto::TokenRequest;
use reqwest::StatusCode;

use crate::error::{Error, Result};

/// Exchanges a credential for a short-lived access token via
/// `POST {api_base}/repls/{id}/token`.
pub async fn exchange(api_base: &str, repl_id: &str, api_key: &str) -> Result<String> {
    let url = format!("{}/repls/{}/token", api_base.trim_end_matches('/'), repl_id);
    let response = reqwest::Client::new()
        .post(&url)
        .json(&TokenRequest {
            api_key: api_key.to_string(),
        })
        .send()
        .await
        .map_err(|e| Error::Auth(format!("token exchange failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| Error::Auth(format!("token exchange failed: {e}")))?;
    parse_token_response(status, &body)
}

/// A success reply must be a bare string: either a JSON-encoded string or
/// plain text. Structured JSON bodies are malformed token responses.
fn parse_token_response(status: StatusCode, body: &str) -> Result<String> {
    if !status.is_success() {
        return Err(Error::Auth(format!(
            "token endpoint returned status {status}"
        )));
    }
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(token)) => Ok(token),
        Ok(_) => Err(Error::Auth(
            "token endpoint returned a malformed body".to_string(),
        )),
        Err(_) => Ok(body.trim().to_string()),
    }
}
