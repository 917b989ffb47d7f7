//! HTTP client for the chat completion endpoint.

use super::error::{Error, format_api_error};
use super::{ChatRequest, ChatResponse, CompletionApi, Reply};
use crate::session::Message;
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use std::time::Duration;
use tracing::debug;

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Default connection timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// POSTs transcripts to a fixed endpoint URL.
#[derive(Debug)]
pub struct HttpCompletion {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCompletion {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeouts(endpoint, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn with_timeouts(
        endpoint: impl Into<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .default_headers(default_headers())
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers
}

/// Classify a settled HTTP exchange.
///
/// Backends answer failed completions with a non-2xx status and an `error`
/// payload; that payload is still a reply. Anything else outside 2xx, or a
/// body that does not parse, is a transport failure.
pub(crate) fn parse_reply(status: StatusCode, body: &str) -> Result<Reply, Error> {
    if !status.is_success() {
        let reported = serde_json::from_str::<ChatResponse>(body)
            .ok()
            .and_then(ChatResponse::into_reply);
        return match reported {
            Some(reply @ Reply::Error(_)) => Ok(reply),
            _ => Err(Error::Api(format_api_error(&format!(
                "HTTP {status}: {body}"
            )))),
        };
    }

    let payload: ChatResponse = serde_json::from_str(body)
        .map_err(|e| Error::Parse(format!("{e}\nBody: {body}")))?;
    payload.into_reply().ok_or(Error::EmptyReply)
}

#[async_trait]
impl CompletionApi for HttpCompletion {
    fn id(&self) -> &str {
        &self.endpoint
    }

    async fn complete(&self, conversation: &[Message]) -> Result<Reply, Error> {
        debug!(
            endpoint = %self.endpoint,
            messages = conversation.len(),
            "Sending conversation"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&ChatRequest { conversation })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        debug!(%status, bytes = body.len(), "Completion settled");

        parse_reply(status, &body)
    }
}
