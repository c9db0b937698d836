//! # Provider Registry
//!
//! Maps a logical provider name to everything needed to talk to it.
//!
//! ```text
//! PartialConfig::defaults()      lowest precedence
//!        ▲ overlay
//! builtin(name)                  unknown name = empty layer, no error
//!        ▲ overlay
//! caller overrides               highest precedence
//!        │ finish()
//!        ▼
//! ProviderConfig
//! ```
//!
//! Resolution never fails. A config that still lacks a URL is reported by
//! [`ProviderConfig::endpoint_url`], which lets a completely custom provider
//! be described purely through overrides.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use super::provider::{Dialect, ProviderError};

pub const DEFAULT_MAX_TOKENS: u32 = 1024;
pub const DEFAULT_MAX_TOKENS_FIELD: &str = "max_tokens";
pub const DEFAULT_CHAT_PATH: &str = "/chat/completions";
pub const DEFAULT_LOCAL_PORT: u16 = 8000;

/// Names of the built-in providers.
pub const PROVIDERS: &[&str] = &["local", "openai", "anthropic", "fireworks", "groq", "generic"];

/// Where a provider lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseUrl {
    /// Complete base URL, e.g. `https://api.openai.com/v1`.
    Fixed(String),
    /// Plain-http host; the resolved `port` is appended at URL time.
    Local(String),
}

/// How the API key is presented to the server.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthScheme {
    /// No key required. Also used by overrides to switch auth off.
    #[default]
    Anonymous,
    /// `Authorization: Bearer <key>`
    Bearer,
    /// `<header>: <key>`
    ApiKeyHeader(String),
}

impl AuthScheme {
    pub fn requires_key(&self) -> bool {
        !matches!(self, AuthScheme::Anonymous)
    }

    /// Header pairs carrying `api_key`. Header names are lowercase.
    pub fn authorize(&self, api_key: &str) -> Vec<(String, String)> {
        match self {
            AuthScheme::Anonymous => Vec::new(),
            AuthScheme::Bearer => vec![("authorization".to_string(), format!("Bearer {api_key}"))],
            AuthScheme::ApiKeyHeader(name) => vec![(name.to_ascii_lowercase(), api_key.to_string())],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Chat,
    Embed,
    Transcribe,
}

/// One layer of provider settings. Unset fields defer to the layer below.
/// `headers` and `extra_body` merge key by key, upper layer wins per key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialConfig {
    pub base_url: Option<BaseUrl>,
    pub port: Option<u16>,
    pub chat_path: Option<String>,
    pub embed_path: Option<String>,
    pub transcribe_path: Option<String>,
    pub auth: Option<AuthScheme>,
    pub dialect: Option<Dialect>,
    pub model: Option<String>,
    pub max_tokens_field: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub extra_body: Map<String, Value>,
}

impl PartialConfig {
    /// The layer every provider is resolved on top of.
    pub fn defaults() -> Self {
        Self {
            chat_path: Some(DEFAULT_CHAT_PATH.to_string()),
            auth: Some(AuthScheme::Anonymous),
            dialect: Some(Dialect::OpenAi),
            max_tokens_field: Some(DEFAULT_MAX_TOKENS_FIELD.to_string()),
            ..Default::default()
        }
    }

    /// Returns `self` with every field set in `top` replaced by `top`'s value.
    pub fn overlay(mut self, top: &PartialConfig) -> Self {
        fn pick<T: Clone>(below: &mut Option<T>, above: &Option<T>) {
            if above.is_some() {
                below.clone_from(above);
            }
        }

        pick(&mut self.base_url, &top.base_url);
        pick(&mut self.port, &top.port);
        pick(&mut self.chat_path, &top.chat_path);
        pick(&mut self.embed_path, &top.embed_path);
        pick(&mut self.transcribe_path, &top.transcribe_path);
        pick(&mut self.auth, &top.auth);
        pick(&mut self.dialect, &top.dialect);
        pick(&mut self.model, &top.model);
        pick(&mut self.max_tokens_field, &top.max_tokens_field);
        for (name, value) in &top.headers {
            self.headers.insert(name.to_ascii_lowercase(), value.clone());
        }
        for (key, value) in &top.extra_body {
            self.extra_body.insert(key.clone(), value.clone());
        }
        self
    }

    fn finish(self, name: Option<&str>) -> ProviderConfig {
        ProviderConfig {
            name: name.map(str::to_string),
            base_url: self.base_url,
            port: self.port,
            chat_path: self.chat_path,
            embed_path: self.embed_path,
            transcribe_path: self.transcribe_path,
            auth: self.auth.unwrap_or_default(),
            dialect: self.dialect.unwrap_or_default(),
            model: self.model,
            max_tokens_field: self
                .max_tokens_field
                .unwrap_or_else(|| DEFAULT_MAX_TOKENS_FIELD.to_string()),
            headers: self
                .headers
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v))
                .collect(),
            extra_body: self.extra_body,
        }
    }
}

/// Fully resolved provider settings. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: Option<String>,
    pub base_url: Option<BaseUrl>,
    pub port: Option<u16>,
    pub chat_path: Option<String>,
    pub embed_path: Option<String>,
    pub transcribe_path: Option<String>,
    pub auth: AuthScheme,
    pub dialect: Dialect,
    pub model: Option<String>,
    pub max_tokens_field: String,
    /// Static headers, lowercase names.
    pub headers: BTreeMap<String, String>,
    pub extra_body: Map<String, Value>,
}

impl ProviderConfig {
    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<custom>")
    }

    /// Base URL with the port applied, without a trailing slash.
    pub fn host_url(&self) -> Result<String, ProviderError> {
        match &self.base_url {
            Some(BaseUrl::Fixed(url)) => Ok(url.trim_end_matches('/').to_string()),
            Some(BaseUrl::Local(host)) => {
                let port = self.port.ok_or_else(|| {
                    ProviderError::Config(format!("provider {} has a local host but no port", self.label()))
                })?;
                Ok(format!("http://{host}:{port}"))
            }
            None => Err(ProviderError::Config(format!(
                "provider {} has no URL",
                self.label()
            ))),
        }
    }

    /// Full URL for `endpoint`.
    pub fn endpoint_url(&self, endpoint: Endpoint) -> Result<String, ProviderError> {
        let path = match endpoint {
            Endpoint::Chat => &self.chat_path,
            Endpoint::Embed => &self.embed_path,
            Endpoint::Transcribe => &self.transcribe_path,
        };
        let path = path.as_deref().ok_or_else(|| {
            ProviderError::Config(format!(
                "provider {} has no {:?} endpoint",
                self.label(),
                endpoint
            ))
        })?;
        Ok(format!("{}{}", self.host_url()?, path))
    }
}

/// Static settings for a built-in provider, None for unknown names.
pub fn builtin(name: &str) -> Option<PartialConfig> {
    let config = match name {
        "local" => PartialConfig {
            base_url: Some(BaseUrl::Local("localhost".to_string())),
            port: Some(DEFAULT_LOCAL_PORT),
            chat_path: Some("/v1/chat/completions".to_string()),
            ..Default::default()
        },
        "openai" => PartialConfig {
            base_url: Some(BaseUrl::Fixed("https://api.openai.com/v1".to_string())),
            embed_path: Some("/embeddings".to_string()),
            transcribe_path: Some("/audio/transcriptions".to_string()),
            auth: Some(AuthScheme::Bearer),
            model: Some("gpt-4o".to_string()),
            max_tokens_field: Some("max_completion_tokens".to_string()),
            ..Default::default()
        },
        "anthropic" => PartialConfig {
            base_url: Some(BaseUrl::Fixed("https://api.anthropic.com/v1".to_string())),
            chat_path: Some("/messages".to_string()),
            auth: Some(AuthScheme::ApiKeyHeader("x-api-key".to_string())),
            dialect: Some(Dialect::Anthropic),
            model: Some("claude-3-5-sonnet-latest".to_string()),
            headers: BTreeMap::from([
                ("anthropic-version".to_string(), "2023-06-01".to_string()),
                ("anthropic-beta".to_string(), "prompt-caching-2024-07-31".to_string()),
                (
                    "anthropic-dangerous-direct-browser-access".to_string(),
                    "true".to_string(),
                ),
            ]),
            ..Default::default()
        },
        "fireworks" => PartialConfig {
            base_url: Some(BaseUrl::Fixed("https://api.fireworks.ai/inference/v1".to_string())),
            auth: Some(AuthScheme::Bearer),
            model: Some("accounts/fireworks/models/llama-v3p1-70b-instruct".to_string()),
            ..Default::default()
        },
        "groq" => PartialConfig {
            base_url: Some(BaseUrl::Fixed("https://api.groq.com/openai/v1".to_string())),
            auth: Some(AuthScheme::Bearer),
            model: Some("llama-3.1-70b-versatile".to_string()),
            ..Default::default()
        },
        "generic" => PartialConfig {
            base_url: Some(BaseUrl::Local("localhost".to_string())),
            port: Some(DEFAULT_LOCAL_PORT),
            chat_path: Some("/chat".to_string()),
            dialect: Some(Dialect::Generic),
            ..Default::default()
        },
        _ => return None,
    };
    Some(config)
}

/// Resolves `name` with precedence default < named provider < `overrides`.
pub fn resolve(name: Option<&str>, overrides: &PartialConfig) -> ProviderConfig {
    let named = name.and_then(builtin).unwrap_or_default();
    PartialConfig::defaults()
        .overlay(&named)
        .overlay(overrides)
        .finish(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_builtins_resolve_to_a_chat_url() {
        for name in PROVIDERS {
            let config = resolve(Some(name), &PartialConfig::default());
            assert!(config.endpoint_url(Endpoint::Chat).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_named_provider_beats_default() {
        let config = resolve(Some("openai"), &PartialConfig::default());
        assert_eq!(config.max_tokens_field, "max_completion_tokens");
        assert_eq!(config.auth, AuthScheme::Bearer);
        assert_eq!(config.dialect, Dialect::OpenAi);
        assert_eq!(
            config.endpoint_url(Endpoint::Chat).unwrap(),
            "https://api.openai.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_overrides_beat_named_provider() {
        let overrides = PartialConfig {
            model: Some("gpt-4o-mini".to_string()),
            max_tokens_field: Some("max_tokens".to_string()),
            auth: Some(AuthScheme::Anonymous),
            ..Default::default()
        };
        let config = resolve(Some("openai"), &overrides);
        assert_eq!(config.model.as_deref(), Some("gpt-4o-mini"));
        assert_eq!(config.max_tokens_field, "max_tokens");
        assert!(!config.auth.requires_key());
        // untouched fields still come from the named layer
        assert_eq!(config.embed_path.as_deref(), Some("/embeddings"));
    }

    #[test]
    fn test_headers_merge_per_key() {
        let overrides = PartialConfig {
            headers: BTreeMap::from([
                ("Anthropic-Version".to_string(), "2099-01-01".to_string()),
                ("x-trace".to_string(), "1".to_string()),
            ]),
            ..Default::default()
        };
        let config = resolve(Some("anthropic"), &overrides);
        assert_eq!(config.headers["anthropic-version"], "2099-01-01");
        assert_eq!(config.headers["anthropic-beta"], "prompt-caching-2024-07-31");
        assert_eq!(config.headers["x-trace"], "1");
    }

    #[test]
    fn test_extra_body_merges_per_key() {
        let mut named = PartialConfig::default();
        named.extra_body.insert("temperature".to_string(), json!(0.2));
        named.extra_body.insert("top_p".to_string(), json!(0.9));
        let mut top = PartialConfig::default();
        top.extra_body.insert("temperature".to_string(), json!(1.0));

        let merged = named.overlay(&top);
        assert_eq!(merged.extra_body["temperature"], json!(1.0));
        assert_eq!(merged.extra_body["top_p"], json!(0.9));
    }

    #[test]
    fn test_unknown_name_is_default_plus_overrides() {
        let config = resolve(Some("nope"), &PartialConfig::default());
        assert_eq!(config.dialect, Dialect::OpenAi);
        assert_eq!(config.max_tokens_field, DEFAULT_MAX_TOKENS_FIELD);
        assert!(matches!(
            config.endpoint_url(Endpoint::Chat),
            Err(ProviderError::Config(_))
        ));

        let custom = PartialConfig {
            base_url: Some(BaseUrl::Fixed("https://llm.internal/api/".to_string())),
            ..Default::default()
        };
        let config = resolve(Some("nope"), &custom);
        assert_eq!(
            config.endpoint_url(Endpoint::Chat).unwrap(),
            "https://llm.internal/api/chat/completions"
        );
    }

    #[test]
    fn test_no_name_resolves_like_unknown() {
        assert_eq!(
            resolve(None, &PartialConfig::default()).dialect,
            resolve(Some("unknown"), &PartialConfig::default()).dialect
        );
    }

    #[test]
    fn test_local_port_override() {
        let overrides = PartialConfig {
            port: Some(1234),
            ..Default::default()
        };
        let config = resolve(Some("local"), &overrides);
        assert_eq!(
            config.endpoint_url(Endpoint::Chat).unwrap(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_local_host_without_port_is_config_error() {
        let overrides = PartialConfig {
            base_url: Some(BaseUrl::Local("gpu-box".to_string())),
            ..Default::default()
        };
        let config = resolve(None, &overrides);
        assert!(matches!(config.host_url(), Err(ProviderError::Config(_))));
    }

    #[test]
    fn test_secondary_endpoints() {
        let openai = resolve(Some("openai"), &PartialConfig::default());
        assert_eq!(
            openai.endpoint_url(Endpoint::Transcribe).unwrap(),
            "https://api.openai.com/v1/audio/transcriptions"
        );
        let anthropic = resolve(Some("anthropic"), &PartialConfig::default());
        assert!(matches!(
            anthropic.endpoint_url(Endpoint::Embed),
            Err(ProviderError::Config(_))
        ));
    }

    #[test]
    fn test_authorize_headers() {
        assert_eq!(
            AuthScheme::Bearer.authorize("k"),
            vec![("authorization".to_string(), "Bearer k".to_string())]
        );
        assert_eq!(
            AuthScheme::ApiKeyHeader("X-Api-Key".to_string()).authorize("k"),
            vec![("x-api-key".to_string(), "k".to_string())]
        );
        assert!(AuthScheme::Anonymous.authorize("k").is_empty());
    }
}
