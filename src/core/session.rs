//! # Conversation Session
//!
//! Owns a fixed system prompt and the ordered history of one chat.
//!
//! ```text
//!            reply() / stream()
//!   Idle ───────────────────────► AwaitingReply
//!    ▲                                 │
//!    └──── completed: +user +assistant ┤
//!    └──── failed / cancelled: no-op ──┘
//! ```
//!
//! Both operations borrow the conversation mutably for the whole turn, so
//! a second turn can't start while one is in flight. History is only ever
//! written after the assistant text is complete.
//!
//! Streaming runs one producer task (transport → SSE decoder → extractor)
//! feeding a capacity-1 channel. [`ReplyStream`] is the consumer; dropping
//! it (or calling [`ReplyStream::cancel`]) signals the producer to stop.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::inference::{
    ChatMessage, MessageContent, ProviderError, RawResponse, RequestDescriptor, RequestOptions,
    Transport, request, sse,
};

/// What the producer task reports to the consumer.
#[derive(Debug)]
enum TurnEvent {
    Delta(String),
    Finished,
    Failed(ProviderError),
}

pub struct Conversation {
    id: String,
    system: String,
    defaults: RequestOptions,
    history: Vec<ChatMessage>,
    transport: Arc<dyn Transport>,
}

impl Conversation {
    /// `defaults` are session-level options (provider, key, overrides);
    /// per-call options passed to `reply`/`stream` win over them. An image
    /// belongs to a single turn, so only the per-call `image` is used.
    pub fn new(
        system: impl Into<String>,
        defaults: RequestOptions,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        debug!("Conversation {} created", id);
        Self {
            id,
            system: system.into(),
            defaults,
            history: Vec::new(),
            transport,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn system(&self) -> &str {
        &self.system
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Merges session state beneath `options` and builds the request.
    /// Returns the request plus the user entry to record on success.
    fn prepare(
        &self,
        query: &str,
        options: &RequestOptions,
        stream: bool,
    ) -> Result<(RequestDescriptor, ChatMessage), ProviderError> {
        let session = RequestOptions {
            system: Some(self.system.clone()),
            history: Some(self.history.clone()),
            ..Default::default()
        };
        let mut merged = session.overlay(&self.defaults).overlay(options);
        merged.stream = stream;
        merged.image = options.image.clone();

        let request = request::build(query, &merged)?;
        let user = ChatMessage::user(MessageContent {
            text: query.to_string(),
            image: merged.image,
        });
        Ok((request, user))
    }

    fn commit(&mut self, user: ChatMessage, text: String) {
        self.history.push(user);
        self.history.push(ChatMessage::assistant(text));
        debug!(
            "Conversation {}: turn committed, history_len={}",
            self.id,
            self.history.len()
        );
    }

    /// Single-shot reply. History is untouched on any error.
    pub async fn reply(
        &mut self,
        query: &str,
        options: &RequestOptions,
    ) -> Result<String, ProviderError> {
        let (request, user) = self.prepare(query, options, false)?;
        info!(
            "Conversation {}: reply via {} (history_len={})",
            self.id,
            request.url,
            self.history.len()
        );

        let body = match self.transport.send(&request).await? {
            RawResponse::Body(body) => body,
            RawResponse::Stream(_) => {
                return Err(ProviderError::Protocol(
                    "expected a buffered body, got a stream".to_string(),
                ));
            }
        };
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::Protocol(format!("response is not JSON: {e}")))?;
        let text = request.dialect.wire().extract_response(&json)?;
        if text.is_empty() {
            return Err(ProviderError::Protocol("provider returned an empty reply".to_string()));
        }

        self.commit(user, text.clone());
        Ok(text)
    }

    /// Streaming reply. Configuration and authentication errors are returned
    /// here, before the transport is touched, as is a missing tokio runtime.
    pub fn stream(
        &mut self,
        query: &str,
        options: &RequestOptions,
    ) -> Result<ReplyStream<'_>, ProviderError> {
        let (request, user) = self.prepare(query, options, true)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
            ProviderError::Config(format!("streaming needs a tokio runtime: {e}"))
        })?;
        info!(
            "Conversation {}: stream via {} (history_len={})",
            self.id,
            request.url,
            self.history.len()
        );

        let (sender, receiver) = mpsc::channel(1);
        let (cancel, cancelled) = oneshot::channel();
        runtime.spawn(produce(Arc::clone(&self.transport), request, sender, cancelled));

        Ok(ReplyStream {
            conversation: self,
            user: Some(user),
            receiver,
            cancel: Some(cancel),
            text: String::new(),
            finished: false,
        })
    }
}

/// Producer side of a streaming turn. Stops as soon as `cancelled` fires
/// (or its sender is dropped), dropping the network stream with it.
async fn produce(
    transport: Arc<dyn Transport>,
    request: RequestDescriptor,
    sender: mpsc::Sender<TurnEvent>,
    mut cancelled: oneshot::Receiver<()>,
) {
    let outcome = tokio::select! {
        biased;
        _ = &mut cancelled => {
            debug!("Stream cancelled by consumer");
            return;
        }
        outcome = pump(transport.as_ref(), &request, &sender) => outcome,
    };

    let last = match outcome {
        Ok(()) => TurnEvent::Finished,
        Err(ProviderError::ChannelClosed) => {
            warn!("Delta send failed: receiver dropped");
            return;
        }
        Err(e) => TurnEvent::Failed(e),
    };
    if sender.send(last).await.is_err() {
        debug!("Consumer gone before the turn outcome was delivered");
    }
}

async fn pump(
    transport: &dyn Transport,
    request: &RequestDescriptor,
    sender: &mpsc::Sender<TurnEvent>,
) -> Result<(), ProviderError> {
    let input = match transport.send(request).await? {
        RawResponse::Stream(input) => input,
        RawResponse::Body(_) => {
            return Err(ProviderError::Protocol(
                "expected a stream, got a buffered body".to_string(),
            ));
        }
    };

    let wire = request.dialect.wire();
    let mut events = sse::decode(input);
    let mut chunk_count = 0usize;
    let mut total_len = 0usize;

    while let Some(event) = events.next().await {
        // None = malformed frame, already logged by the decoder
        let Some(event) = event? else { continue };
        if let Some(err) = wire.stream_error(&event) {
            return Err(err);
        }
        let Some(delta) = wire.extract_stream_delta(&event) else {
            continue;
        };
        if delta.is_empty() {
            continue;
        }
        chunk_count += 1;
        total_len += delta.len();
        sender
            .send(TurnEvent::Delta(delta))
            .await
            .map_err(|_| ProviderError::ChannelClosed)?;
    }

    info!(
        "Stream ended: {} chunks, {} content bytes",
        chunk_count, total_len
    );
    Ok(())
}

/// Consumer side of a streaming turn: a [`Stream`] of text deltas.
///
/// Ends with `None` after the turn has been committed to history, or with a
/// single `Err` when the turn failed. Dropping it early cancels the turn and
/// leaves history as it was.
pub struct ReplyStream<'a> {
    conversation: &'a mut Conversation,
    user: Option<ChatMessage>,
    receiver: mpsc::Receiver<TurnEvent>,
    cancel: Option<oneshot::Sender<()>>,
    text: String,
    finished: bool,
}

impl ReplyStream<'_> {
    /// Assistant text received so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Stops the producer. Nothing is recorded; the stream yields no more items.
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        self.receiver.close();
        self.finished = true;
    }

    fn fail(&mut self, err: ProviderError) -> Poll<Option<Result<String, ProviderError>>> {
        warn!("Conversation {}: turn failed: {}", self.conversation.id, err);
        self.finished = true;
        Poll::Ready(Some(Err(err)))
    }
}

impl Stream for ReplyStream<'_> {
    type Item = Result<String, ProviderError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.finished {
            return Poll::Ready(None);
        }

        match ready!(this.receiver.poll_recv(cx)) {
            Some(TurnEvent::Delta(delta)) => {
                this.text.push_str(&delta);
                Poll::Ready(Some(Ok(delta)))
            }
            Some(TurnEvent::Finished) => {
                if this.text.is_empty() {
                    return this.fail(ProviderError::Protocol(
                        "provider returned an empty reply".to_string(),
                    ));
                }
                this.finished = true;
                if let Some(user) = this.user.take() {
                    this.conversation.commit(user, this.text.clone());
                }
                Poll::Ready(None)
            }
            Some(TurnEvent::Failed(err)) => this.fail(err),
            None => this.fail(ProviderError::Protocol(
                "stream producer stopped without finishing the turn".to_string(),
            )),
        }
    }
}

impl Drop for ReplyStream<'_> {
    fn drop(&mut self) {
        if !self.finished {
            debug!(
                "Conversation {}: reply stream dropped mid-turn, discarding {} bytes",
                self.conversation.id,
                self.text.len()
            );
            self.cancel();
        }
    }
}
