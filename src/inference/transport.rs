//! # Transport
//!
//! One POST per turn. Buffered for `reply`, a live byte stream for
//! `stream`. Non-success statuses become [`ProviderError::Transport`].
//! No retries or timeouts here; wrap the trait if you need them.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use log::{debug, warn};
use serde_json::Value;

use super::provider::ProviderError;
use super::request::RequestDescriptor;

/// Raw response body chunks as they arrive from the network.
pub type ByteStream = BoxStream<'static, Result<Bytes, ProviderError>>;

pub enum RawResponse {
    /// Full body of a non-streaming request.
    Body(String),
    /// Live body of a streaming request.
    Stream(ByteStream),
}

impl std::fmt::Debug for RawResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawResponse::Body(body) => f.debug_tuple("Body").field(body).finish(),
            RawResponse::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request`. Streams iff `request.stream` is set.
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, ProviderError>;
}

/// reqwest-backed transport.
#[derive(Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, ProviderError> {
        let json_body = serde_json::to_string(&request.body)
            .map_err(|e| ProviderError::Protocol(format!("Request serialization failed: {e}")))?;
        debug!("Raw request to {}: {}", request.url, json_body);

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .body(json_body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        debug!("Response status: {}", response.status());

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let err_body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            warn!("API error: {} - {}", status, err_body);
            let payload = serde_json::from_str::<Value>(&err_body)
                .unwrap_or_else(|_| Value::String(err_body));
            return Err(ProviderError::Transport { status, payload });
        }

        if request.stream {
            let stream = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| ProviderError::Network(e.to_string())))
                .boxed();
            Ok(RawResponse::Stream(stream))
        } else {
            let body = response
                .text()
                .await
                .map_err(|e| ProviderError::Network(e.to_string()))?;
            debug!("Response body: {} bytes", body.len());
            Ok(RawResponse::Body(body))
        }
    }
}
