use crate::dispatch::wire::PushRequest;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("push endpoint returned status {status}: {message}")]
    UnexpectedStatus { status: u16, message: String },
}

/// Delivers one serialized batch to the sink.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn push(&self, request: &PushRequest) -> Result<(), TransportError>;
}

/// JSON over HTTP POST; only `204 No Content` counts as delivered.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    push_url: String,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(push_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            push_url: push_url.into(),
            client,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn push(&self, request: &PushRequest) -> Result<(), TransportError> {
        let body = serde_json::to_vec(request)?;
        tracing::trace!(bytes = body.len(), url = %self.push_url, "Posting batch");

        let response = self
            .client
            .post(&self.push_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if response.status() != StatusCode::NO_CONTENT {
            return Err(TransportError::UnexpectedStatus {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
