use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::providers::{AnthropicFormat, GenericFormat, OpenAiFormat};
use super::types::{Image, Role};

/// Errors that can occur while building, sending or decoding a chat turn.
/// Every variant aborts the turn; none of them touch conversation history.
#[derive(Debug)]
pub enum ProviderError {
    /// Provider misconfigured (no URL, no port, missing path).
    Config(String),
    /// Provider requires an API key and none was supplied. Raised before any I/O.
    Authentication(String),
    /// Server answered with a non-success status. `payload` is the parsed JSON
    /// error body, or the raw body as a JSON string when it wasn't JSON.
    Transport { status: u16, payload: Value },
    /// Network-level failure (DNS, connection refused, body read aborted).
    Network(String),
    /// Success status but the body didn't have the expected shape, or the reply was empty.
    Protocol(String),
    /// The consumer dropped its end of the delta channel.
    ChannelClosed,
}

impl ProviderError {
    /// Best-effort human readable message from a transport error payload.
    fn payload_message(payload: &Value) -> String {
        payload
            .pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| match payload {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Config(msg) => write!(f, "config error: {msg}"),
            ProviderError::Authentication(msg) => write!(f, "authentication error: {msg}"),
            ProviderError::Transport { status, payload } => {
                write!(
                    f,
                    "API error (HTTP {status}): {}",
                    Self::payload_message(payload)
                )
            }
            ProviderError::Network(msg) => write!(f, "network error: {msg}"),
            ProviderError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            ProviderError::ChannelClosed => write!(f, "channel closed"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Conversation context handed to [`WireFormat::shape_payload`].
/// History content has already been shaped by the same format.
#[derive(Debug, Default)]
pub struct PayloadArgs<'a> {
    pub system: Option<&'a str>,
    pub history: Vec<(Role, Value)>,
    pub prefill: Option<&'a str>,
}

/// The capability set every provider family implements.
pub trait WireFormat: Send + Sync {
    /// Provider-native content value for text plus an optional image.
    /// Formats without image support still accept `None`.
    fn shape_content(&self, text: &str, image: Option<&Image>) -> Value;

    /// Provider-native request body fragment (messages, system, ...).
    fn shape_payload(&self, content: Value, args: PayloadArgs<'_>) -> Map<String, Value>;

    /// Assistant text from a full (non-streaming) JSON response.
    fn extract_response(&self, response: &Value) -> Result<String, ProviderError>;

    /// Text carried by one decoded stream event, or None for non-content events.
    fn extract_stream_delta(&self, event: &Value) -> Option<String>;

    /// Error reported in-band by a stream that already answered 200.
    /// The turn fails with it; text received before it is discarded.
    fn stream_error(&self, _event: &Value) -> Option<ProviderError> {
        None
    }
}

/// Closed set of provider families. New families are added as a variant.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    OpenAi,
    Anthropic,
    Generic,
}

impl Dialect {
    pub fn wire(self) -> &'static dyn WireFormat {
        match self {
            Dialect::OpenAi => &OpenAiFormat,
            Dialect::Anthropic => &AnthropicFormat,
            Dialect::Generic => &GenericFormat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_transport_error_display_prefers_error_message() {
        let err = ProviderError::Transport {
            status: 401,
            payload: json!({"error": {"message": "invalid key"}}),
        };
        assert_eq!(err.to_string(), "API error (HTTP 401): invalid key");
    }

    #[test]
    fn test_transport_error_display_raw_body() {
        let err = ProviderError::Transport {
            status: 502,
            payload: Value::String("Bad Gateway".to_string()),
        };
        assert_eq!(err.to_string(), "API error (HTTP 502): Bad Gateway");
    }

    #[test]
    fn test_dialect_deserializes_lowercase() {
        let d: Dialect = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(d, Dialect::Anthropic);
        assert_eq!(Dialect::default(), Dialect::OpenAi);
    }
}
