//! Completion transport errors.

use thiserror::Error;

/// Condense an HTTP error body into something readable for diagnostics.
///
/// `HTTP 502: {"error": {"message": "upstream down"}}` becomes
/// `HTTP 502: upstream down`. Bodies without a recognizable JSON message are
/// returned unchanged.
#[must_use]
pub fn format_api_error(error: &str) -> String {
    let Some(json_start) = error.find('{') else {
        return error.to_string();
    };
    let Ok(json) = serde_json::from_str::<serde_json::Value>(&error[json_start..]) else {
        return error.to_string();
    };
    let Some(msg) = error_message(&json) else {
        return error.to_string();
    };

    let prefix = error[..json_start].trim();
    if prefix.is_empty() {
        msg
    } else {
        format!("{prefix} {msg}")
    }
}

fn error_message(json: &serde_json::Value) -> Option<String> {
    // {"error": {"message": ...}}, {"error": "..."}, {"message": "..."}
    if let Some(err) = json.get("error") {
        if let Some(msg) = err.get("message").and_then(|v| v.as_str()) {
            return Some(msg.to_string());
        }
        if let Some(msg) = err.as_str() {
            return Some(msg.to_string());
        }
    }
    json.get("message")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Failure to obtain any usable payload from the completion endpoint.
///
/// A payload that carries an `error` field is not one of these; it is a
/// regular [`super::Reply::Error`].
#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Response carried neither a reply nor an error")]
    EmptyReply,
}
