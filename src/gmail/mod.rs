//! Read-only access to a user's Gmail mailbox through the REST API.
mod retry;

pub use retry::RetryingSource;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use crate::errors::{IngestError, IngestResult};
use crate::types::{MessageFilter, MessageSummary, RawMessage};

/// A remote message store scoped by the caller's access token.
#[async_trait]
pub trait EmailSource: Send + Sync {
    /// Lists at most `max_results` candidate ids in the provider's order.
    async fn list_candidates(
        &self,
        access_token: &str,
        filter: &MessageFilter,
        max_results: u32,
    ) -> IngestResult<Vec<MessageSummary>>;

    /// Fetches one message document in full.
    async fn fetch_full(&self, access_token: &str, id: &str) -> IngestResult<RawMessage>;
}

#[derive(Clone, Debug)]
pub struct GmailClient {
    /// The inner client used to make requests
    inner: reqwest::Client,
    /// The base url for Gmail API, e.g. `https://gmail.googleapis.com/gmail/v1`
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageSummary>,
}

impl GmailClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            inner: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
        access_token: &str,
    ) -> IngestResult<reqwest::Response> {
        let response = self
            .inner
            .get(url)
            .query(query)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| classify_send_error(url, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body))
    }
}

#[async_trait]
impl EmailSource for GmailClient {
    #[tracing::instrument(skip(self, access_token, filter))]
    async fn list_candidates(
        &self,
        access_token: &str,
        filter: &MessageFilter,
        max_results: u32,
    ) -> IngestResult<Vec<MessageSummary>> {
        let url = format!("{}/users/me/messages", self.base_url);
        let query = [
            ("q", filter.query()),
            ("maxResults", max_results.to_string()),
        ];
        let listed = self
            .get(&url, &query, access_token)
            .await?
            .json::<ListMessagesResponse>()
            .await
            .map_err(|e| IngestError::Protocol(format!("parse message list: {e}")))?;

        let mut candidates = listed.messages;
        candidates.truncate(max_results as usize);
        Ok(candidates)
    }

    #[tracing::instrument(skip(self, access_token), level = "debug")]
    async fn fetch_full(&self, access_token: &str, id: &str) -> IngestResult<RawMessage> {
        let url = format!("{}/users/me/messages/{}", self.base_url, id);
        let doc = self
            .get(&url, &[("format", "full".to_string())], access_token)
            .await?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| IngestError::Protocol(format!("parse message {id}: {e}")))?;
        Ok(RawMessage(doc))
    }
}

// A request that could not even be built will fail the same way every time.
fn classify_send_error(url: &str, err: reqwest::Error) -> IngestError {
    if err.is_builder() {
        IngestError::Protocol(format!("invalid request to {url}: {err}"))
    } else {
        IngestError::Transient(format!("request to {url} failed: {err}"))
    }
}

/// Maps a non-success Gmail status onto the ingestion failure taxonomy.
pub fn classify_status(status: StatusCode, body: &str) -> IngestError {
    let detail = if body.is_empty() {
        format!("Gmail API returned {status}")
    } else {
        format!("Gmail API returned {status}: {body}")
    };
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => IngestError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::REQUEST_TIMEOUT => {
            IngestError::Transient(detail)
        }
        s if s.is_server_error() => IngestError::Transient(detail),
        _ => IngestError::Protocol(detail),
    }
}
