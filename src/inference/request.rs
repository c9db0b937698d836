//! # Request Builder
//!
//! Pure translation of a query plus [`RequestOptions`] into a
//! [`RequestDescriptor`]. No I/O happens here, so configuration and
//! authentication problems surface before any network access.
//!
//! Body overlay order, later keys win:
//!
//! ```text
//! shape_payload(...) → model → <max_tokens_field> → prediction → extra_body → stream
//! ```

use std::collections::BTreeMap;

use log::debug;
use serde_json::{Value, json};

use super::provider::{Dialect, PayloadArgs, ProviderError};
use super::registry::{self, DEFAULT_MAX_TOKENS, Endpoint, PartialConfig};
use super::types::{ChatMessage, Image};

/// Per-call options. Everything is optional; `overrides` is the caller's
/// layer on top of the named provider.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub provider: Option<String>,
    pub system: Option<String>,
    pub history: Option<Vec<ChatMessage>>,
    pub image: Option<Image>,
    pub prefill: Option<String>,
    /// Predicted output text (OpenAI "predicted outputs").
    pub prediction: Option<String>,
    pub max_tokens: Option<u32>,
    pub api_key: Option<String>,
    pub stream: bool,
    pub overrides: PartialConfig,
}

impl RequestOptions {
    /// Returns `self` with every option set in `top` taking precedence.
    /// `stream` is always taken from `top`.
    pub fn overlay(mut self, top: &RequestOptions) -> Self {
        fn pick<T: Clone>(below: &mut Option<T>, above: &Option<T>) {
            if above.is_some() {
                below.clone_from(above);
            }
        }

        pick(&mut self.provider, &top.provider);
        pick(&mut self.system, &top.system);
        pick(&mut self.history, &top.history);
        pick(&mut self.image, &top.image);
        pick(&mut self.prefill, &top.prefill);
        pick(&mut self.prediction, &top.prediction);
        pick(&mut self.max_tokens, &top.max_tokens);
        pick(&mut self.api_key, &top.api_key);
        self.stream = top.stream;
        self.overrides = self.overrides.overlay(&top.overrides);
        self
    }
}

/// A fully formed HTTP request, consumed immediately by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub url: String,
    /// Lowercase header names.
    pub headers: BTreeMap<String, String>,
    pub body: Value,
    pub stream: bool,
    /// Wire format the response must be decoded with.
    pub dialect: Dialect,
}

/// Builds the chat request for `query`.
pub fn build(query: &str, options: &RequestOptions) -> Result<RequestDescriptor, ProviderError> {
    let config = registry::resolve(options.provider.as_deref(), &options.overrides);
    let url = config.endpoint_url(Endpoint::Chat)?;

    if config.auth.requires_key() && options.api_key.is_none() {
        return Err(ProviderError::Authentication(format!(
            "provider {} requires an API key",
            options.provider.as_deref().unwrap_or("<custom>")
        )));
    }

    let wire = config.dialect.wire();
    let content = wire.shape_content(query, options.image.as_ref());
    let history = options
        .history
        .iter()
        .flatten()
        .map(|msg| {
            (
                msg.role,
                wire.shape_content(&msg.content.text, msg.content.image.as_ref()),
            )
        })
        .collect();

    let mut body = wire.shape_payload(
        content,
        PayloadArgs {
            system: options.system.as_deref(),
            history,
            prefill: options.prefill.as_deref(),
        },
    );
    if let Some(model) = &config.model {
        body.insert("model".to_string(), Value::String(model.clone()));
    }
    body.insert(
        config.max_tokens_field.clone(),
        json!(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    if let Some(prediction) = &options.prediction {
        body.insert(
            "prediction".to_string(),
            json!({ "type": "content", "content": prediction }),
        );
    }
    for (key, value) in &config.extra_body {
        body.insert(key.clone(), value.clone());
    }
    body.insert("stream".to_string(), Value::Bool(options.stream));

    let mut headers = BTreeMap::from([("content-type".to_string(), "application/json".to_string())]);
    if let Some(api_key) = &options.api_key {
        headers.extend(config.auth.authorize(api_key));
    }
    headers.extend(config.headers.clone());

    debug!(
        "Built request: url={}, dialect={:?}, stream={}, body_keys={:?}",
        url,
        config.dialect,
        options.stream,
        body.keys().collect::<Vec<_>>()
    );

    Ok(RequestDescriptor {
        url,
        headers,
        body: Value::Object(body),
        stream: options.stream,
        dialect: config.dialect,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::registry::{AuthScheme, BaseUrl};
    use crate::inference::types::{MessageContent, Role};

    fn options(provider: &str) -> RequestOptions {
        RequestOptions {
            provider: Some(provider.to_string()),
            api_key: Some("sk-test".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_max_tokens_field_and_value_precedence() {
        let mut opts = options("openai");
        opts.max_tokens = Some(500);
        let req = build("hi", &opts).unwrap();

        assert_eq!(req.body["max_completion_tokens"], json!(500));
        assert!(req.body.get("max_tokens").is_none());
    }

    #[test]
    fn test_max_tokens_defaults_to_1024() {
        let req = build("hi", &options("local")).unwrap();
        assert_eq!(req.body["max_tokens"], json!(1024));
    }

    #[test]
    fn test_caller_override_of_field_name_wins() {
        let mut opts = options("openai");
        opts.overrides.max_tokens_field = Some("max_output_tokens".to_string());
        let req = build("hi", &opts).unwrap();
        assert_eq!(req.body["max_output_tokens"], json!(1024));
        assert!(req.body.get("max_completion_tokens").is_none());
    }

    #[test]
    fn test_missing_api_key_is_authentication_error() {
        for provider in ["openai", "anthropic", "groq", "fireworks"] {
            let mut opts = options(provider);
            opts.api_key = None;
            assert!(
                matches!(build("hi", &opts), Err(ProviderError::Authentication(_))),
                "{provider}"
            );
        }
    }

    #[test]
    fn test_keyless_provider_needs_no_key() {
        let mut opts = options("local");
        opts.api_key = None;
        let req = build("hi", &opts).unwrap();
        assert!(!req.headers.contains_key("authorization"));
    }

    #[test]
    fn test_missing_url_is_config_error() {
        let opts = options("does-not-exist");
        assert!(matches!(build("hi", &opts), Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_fully_custom_provider_via_overrides() {
        let mut opts = RequestOptions::default();
        opts.overrides = PartialConfig {
            base_url: Some(BaseUrl::Fixed("https://proxy.example/v1".to_string())),
            auth: Some(AuthScheme::ApiKeyHeader("X-Proxy-Key".to_string())),
            dialect: Some(Dialect::Anthropic),
            chat_path: Some("/messages".to_string()),
            ..Default::default()
        };
        opts.api_key = Some("pk".to_string());
        let req = build("hi", &opts).unwrap();

        assert_eq!(req.url, "https://proxy.example/v1/messages");
        assert_eq!(req.headers["x-proxy-key"], "pk");
        assert!(req.body.get("model").is_none());
    }

    #[test]
    fn test_anthropic_headers() {
        let req = build("hi", &options("anthropic")).unwrap();
        assert_eq!(req.headers["content-type"], "application/json");
        assert_eq!(req.headers["x-api-key"], "sk-test");
        assert_eq!(req.headers["anthropic-version"], "2023-06-01");
        assert_eq!(req.body["model"], "claude-3-5-sonnet-latest");
    }

    #[test]
    fn test_provider_headers_beat_content_type_default() {
        let mut opts = options("local");
        opts.overrides
            .headers
            .insert("Content-Type".to_string(), "application/vnd.api+json".to_string());
        let req = build("hi", &opts).unwrap();
        assert_eq!(req.headers["content-type"], "application/vnd.api+json");
        assert_eq!(req.headers.len(), 1);
    }

    #[test]
    fn test_bearer_header() {
        let req = build("hi", &options("openai")).unwrap();
        assert_eq!(req.headers["authorization"], "Bearer sk-test");
    }

    #[test]
    fn test_history_is_shaped_in_order() {
        let image = Image::from_bytes("image/png", b"px");
        let mut opts = options("openai");
        opts.system = Some("sys".to_string());
        opts.history = Some(vec![
            ChatMessage {
                role: Role::User,
                content: MessageContent {
                    text: "look".to_string(),
                    image: Some(image.clone()),
                },
            },
            ChatMessage::assistant("a cat"),
        ]);
        let req = build("and now?", &opts).unwrap();
        let messages = req.body["messages"].as_array().unwrap();

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["role"], "user");
        assert_eq!(messages[1]["content"][1]["image_url"]["url"], image.data_url());
        assert_eq!(messages[2], json!({"role": "assistant", "content": "a cat"}));
        assert_eq!(messages[3], json!({"role": "user", "content": "and now?"}));
    }

    #[test]
    fn test_query_image_is_shaped() {
        let mut opts = options("anthropic");
        opts.image = Some(Image::from_bytes("image/gif", b"gif"));
        let req = build("what?", &opts).unwrap();
        let content = &req.body["messages"][0]["content"];
        assert_eq!(content[0]["type"], "image");
        assert_eq!(content[1]["text"], "what?");
    }

    #[test]
    fn test_stream_flag_model_and_prediction() {
        let mut opts = options("openai");
        opts.stream = true;
        opts.prediction = Some("fn main() {}".to_string());
        let req = build("edit", &opts).unwrap();

        assert!(req.stream);
        assert_eq!(req.body["stream"], json!(true));
        assert_eq!(req.body["model"], "gpt-4o");
        assert_eq!(
            req.body["prediction"],
            json!({"type": "content", "content": "fn main() {}"})
        );
    }

    #[test]
    fn test_extra_body_overlays_model_but_not_stream() {
        let mut opts = options("openai");
        opts.overrides.extra_body.insert("model".to_string(), json!("o3"));
        opts.overrides.extra_body.insert("stream".to_string(), json!(true));
        opts.overrides.extra_body.insert("temperature".to_string(), json!(0.1));
        let req = build("hi", &opts).unwrap();

        assert_eq!(req.body["model"], "o3");
        assert_eq!(req.body["temperature"], json!(0.1));
        assert_eq!(req.body["stream"], json!(false));
    }

    #[test]
    fn test_generic_provider_flat_body() {
        let mut opts = options("generic");
        opts.system = Some("sys".to_string());
        let req = build("hello", &opts).unwrap();
        assert_eq!(req.url, "http://localhost:8000/chat");
        assert_eq!(req.body["query"], "hello");
        assert_eq!(req.body["system"], "sys");
        assert!(req.body.get("messages").is_none());
    }

    #[test]
    fn test_options_overlay() {
        let base = RequestOptions {
            provider: Some("openai".to_string()),
            system: Some("base".to_string()),
            max_tokens: Some(10),
            ..Default::default()
        };
        let top = RequestOptions {
            system: Some("top".to_string()),
            stream: true,
            ..Default::default()
        };
        let merged = base.overlay(&top);
        assert_eq!(merged.provider.as_deref(), Some("openai"));
        assert_eq!(merged.system.as_deref(), Some("top"));
        assert_eq!(merged.max_tokens, Some(10));
        assert!(merged.stream);
    }
}
