//! Flat format for simple self-hosted chat servers.
//!
//! request `{"query": ..., "system"?, "history"?, "prefill"?}`,
//! response and stream events `{"text": "..."}`.

use serde_json::{Map, Value, json};

use crate::inference::provider::{PayloadArgs, ProviderError, WireFormat};
use crate::inference::types::Image;

pub struct GenericFormat;

impl WireFormat for GenericFormat {
    fn shape_content(&self, text: &str, image: Option<&Image>) -> Value {
        match image {
            None => Value::String(text.to_string()),
            Some(image) => json!({ "text": text, "image": image.data_url() }),
        }
    }

    fn shape_payload(&self, content: Value, args: PayloadArgs<'_>) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("query".to_string(), content);
        if let Some(system) = args.system {
            payload.insert("system".to_string(), Value::String(system.to_string()));
        }
        if !args.history.is_empty() {
            let history: Vec<Value> = args
                .history
                .into_iter()
                .map(|(role, content)| json!({ "role": role, "content": content }))
                .collect();
            payload.insert("history".to_string(), Value::Array(history));
        }
        if let Some(prefill) = args.prefill {
            payload.insert("prefill".to_string(), Value::String(prefill.to_string()));
        }
        payload
    }

    fn extract_response(&self, response: &Value) -> Result<String, ProviderError> {
        response
            .get("text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Protocol("response has no \"text\" field".to_string()))
    }

    fn extract_stream_delta(&self, event: &Value) -> Option<String> {
        event.get("text").and_then(Value::as_str).map(str::to_string)
    }
}
