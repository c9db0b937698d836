//! Test utilities shared across the crate.
//!
//! This module is only compiled during tests (`#[cfg(test)]`).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream;
use serde_json::Value;

use crate::inference::{ProviderError, RawResponse, RequestDescriptor, Transport};

/// One canned answer for [`StubTransport`].
pub enum StubReply {
    /// Buffered JSON body.
    Json(Value),
    /// Buffered raw body.
    Body(String),
    /// Non-success status with an error payload.
    Status(u16, Value),
    /// Stream that delivers these chunks, then ends.
    Sse(Vec<String>),
    /// Stream that delivers these chunks, then never ends.
    SseThenHang(Vec<String>),
    /// Stream that delivers these chunks, then fails with a network error.
    SseThenError(Vec<String>),
}

/// Transport that replays canned replies in order and records every request.
pub struct StubTransport {
    replies: Mutex<VecDeque<StubReply>>,
    requests: Mutex<Vec<RequestDescriptor>>,
    calls: AtomicUsize,
}

impl StubTransport {
    pub fn new(replies: Vec<StubReply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        })
    }

    /// Number of times `send` was invoked.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RequestDescriptor> {
        self.requests.lock().unwrap().last().cloned()
    }
}

fn chunks(chunks: Vec<String>) -> impl futures::Stream<Item = Result<Bytes, ProviderError>> {
    stream::iter(chunks.into_iter().map(|c| Ok(Bytes::from(c))))
}

#[async_trait]
impl Transport for StubTransport {
    async fn send(&self, request: &RequestDescriptor) -> Result<RawResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::Network("stub has no replies left".to_string()))?;

        Ok(match reply {
            StubReply::Json(value) => RawResponse::Body(value.to_string()),
            StubReply::Body(body) => RawResponse::Body(body),
            StubReply::Status(status, payload) => {
                return Err(ProviderError::Transport { status, payload });
            }
            StubReply::Sse(parts) => RawResponse::Stream(chunks(parts).boxed()),
            StubReply::SseThenHang(parts) => {
                RawResponse::Stream(chunks(parts).chain(stream::pending()).boxed())
            }
            StubReply::SseThenError(parts) => RawResponse::Stream(
                chunks(parts)
                    .chain(stream::once(async {
                        Err(ProviderError::Network("connection reset".to_string()))
                    }))
                    .boxed(),
            ),
        })
    }
}
