//! Completion collaborator: turns a transcript into a reply.
//!
//! The endpoint accepts `{"conversation": [{"role", "content"}, ...]}` and
//! answers with either `{"response": "..."}` or `{"error": "..."}`.

mod error;
mod http;

pub use error::{Error, format_api_error};
pub use http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_TIMEOUT, HttpCompletion};

use crate::session::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request body sent to the completion endpoint.
#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub conversation: &'a [Message],
}

/// Settled payload from the completion endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The assistant's answer.
    Response(String),
    /// An error the backend chose to report; shown to the user verbatim.
    Error(String),
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    response: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl ChatResponse {
    /// A non-empty `response` wins; otherwise fall back to `error`.
    fn into_reply(self) -> Option<Reply> {
        match (self.response, self.error) {
            (Some(text), _) if !text.is_empty() => Some(Reply::Response(text)),
            (_, Some(err)) => Some(Reply::Error(err)),
            _ => None,
        }
    }
}

#[async_trait]
pub trait CompletionApi: Send + Sync {
    /// Identifier used in logs.
    fn id(&self) -> &str;

    /// Request a reply for the full transcript, newest user message last.
    async fn complete(&self, conversation: &[Message]) -> Result<Reply, Error>;
}
