//! OpenAI-style Chat Completions format.
//!
//! Shared by OpenAI itself and every "OpenAI-compatible" server (Groq,
//! Fireworks, llama.cpp / vLLM style local servers).
//! - request: `{"messages": [{role, content}, ...]}`
//! - response: `choices[0].message.content`
//! - stream: `data: {"choices":[{"delta":{"content":"..."}}]}` ... `data: [DONE]`

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::inference::provider::{PayloadArgs, ProviderError, WireFormat};
use crate::inference::types::{Image, Role};

// ============================================================================
// Chat Completions API Types
// ============================================================================

#[derive(Serialize, Debug)]
struct Message {
    role: Role,
    content: Value,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize, Debug)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize, Debug)]
struct ResponseMessage {
    content: Option<String>,
}

/// One streamed chunk. Role-only and finish chunks carry no `content`.
#[derive(Deserialize, Debug)]
struct ChunkEvent {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize, Debug)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Debug, Default)]
struct ChunkDelta {
    content: Option<String>,
}

// ============================================================================
// Format Implementation
// ============================================================================

pub struct OpenAiFormat;

impl WireFormat for OpenAiFormat {
    fn shape_content(&self, text: &str, image: Option<&Image>) -> Value {
        match image {
            None => Value::String(text.to_string()),
            Some(image) => json!([
                { "type": "text", "text": text },
                { "type": "image_url", "image_url": { "url": image.data_url() } },
            ]),
        }
    }

    fn shape_payload(&self, content: Value, args: PayloadArgs<'_>) -> Map<String, Value> {
        let mut messages = Vec::with_capacity(args.history.len() + 3);
        if let Some(system) = args.system {
            messages.push(Message {
                role: Role::System,
                content: Value::String(system.to_string()),
            });
        }
        messages.extend(
            args.history
                .into_iter()
                .map(|(role, content)| Message { role, content }),
        );
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
        payload
    }

    fn extract_response(&self, response: &Value) -> Result<String, ProviderError> {
        let parsed = ChatResponse::deserialize(response)
            .map_err(|e| ProviderError::Protocol(format!("unexpected chat response: {e}")))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::Protocol("response has no choices[0].message.content".to_string()))
    }

    fn extract_stream_delta(&self, event: &Value) -> Option<String> {
        let chunk = ChunkEvent::deserialize(event).ok()?;
        chunk.choices.into_iter().next()?.delta.content
    }
}
