//! Anthropic Messages API format.
//!
//! - request: `{"messages": [...], "system": "..."}` (system is top-level, not a message)
//! - response: first `text` block of `content[]`
//! - stream: `event: <type>` + `data: {"type": ...}` pairs, no `[DONE]` sentinel;
//!   only `content_block_delta` / `text_delta` events carry text
//! - an `error` event can arrive mid-stream after a 200 and fails the turn

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::inference::provider::{PayloadArgs, ProviderError, WireFormat};
use crate::inference::types::{Image, Role};

// ============================================================================
// Messages API Types
// ============================================================================

#[derive(Serialize, Debug)]
struct Message {
    role: Role,
    content: Value,
}

#[derive(Deserialize, Debug)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize, Debug)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Every stream event carries its type inside the JSON as well as on the `event:` line.
#[derive(Deserialize, Debug)]
struct StreamEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    delta: Option<EventDelta>,
}

/// `{"type": "error", "error": {"type": "overloaded_error", "message": "Overloaded"}}`
#[derive(Deserialize, Debug)]
struct ErrorEvent {
    #[serde(rename = "type")]
    event_type: String,
    error: ErrorDetail,
}

#[derive(Deserialize, Debug)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct EventDelta {
    #[serde(rename = "type")]
    delta_type: Option<String>,
    #[serde(default)]
    text: Option<String>,
}

// ============================================================================
// Format Implementation
// ============================================================================

pub struct AnthropicFormat;

impl WireFormat for AnthropicFormat {
    fn shape_content(&self, text: &str, image: Option<&Image>) -> Value {
        match image {
            None => Value::String(text.to_string()),
            // Anthropic recommends the image block before the text it refers to.
            Some(image) => json!([
                {
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": image.media_type,
                        "data": image.data,
                    },
                },
                { "type": "text", "text": text },
            ]),
        }
    }

    fn shape_payload(&self, content: Value, args: PayloadArgs<'_>) -> Map<String, Value> {
        let mut messages: Vec<Message> = args
            .history
            .into_iter()
            .map(|(role, content)| Message { role, content })
            .collect();
        messages.push(Message {
            role: Role::User,
            content,
        });
        if let Some(prefill) = args.prefill {
            messages.push(Message {
                role: Role::Assistant,
                content: Value::String(prefill.to_string()),
            });
        }

        let mut payload = Map::new();
        payload.insert("messages".to_string(), json!(messages));
        if let Some(system) = args.system {
            payload.insert("system".to_string(), Value::String(system.to_string()));
        }
        payload
    }

    fn extract_response(&self, response: &Value) -> Result<String, ProviderError> {
        let parsed = MessagesResponse::deserialize(response)
            .map_err(|e| ProviderError::Protocol(format!("unexpected messages response: {e}")))?;
        parsed
            .content
            .into_iter()
            .find(|block| block.block_type == "text")
            .and_then(|block| block.text)
            .ok_or_else(|| ProviderError::Protocol("response has no text content block".to_string()))
    }

    fn extract_stream_delta(&self, event: &Value) -> Option<String> {
        let event = StreamEvent::deserialize(event).ok()?;
        if event.event_type != "content_block_delta" {
            return None;
        }
        let delta = event.delta?;
        match delta.delta_type.as_deref() {
            Some("text_delta") => delta.text,
            _ => None,
        }
    }

    fn stream_error(&self, event: &Value) -> Option<ProviderError> {
        let event = ErrorEvent::deserialize(event).ok()?;
        if event.event_type != "error" {
            return None;
        }
        let detail = event.error;
        Some(ProviderError::Protocol(match detail.message {
            Some(message) => format!("stream error ({}): {message}", detail.error_type),
            None => format!("stream error ({})", detail.error_type),
        }))
    }
}
