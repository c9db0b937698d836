//! API key lookup. Keys are read per turn and never written anywhere.

use std::collections::HashMap;

use log::debug;

use crate::core::config::ChatterConfig;

pub trait CredentialSource: Send + Sync {
    fn api_key(&self, provider: &str) -> Option<String>;
}

/// `openai` → `OPENAI_API_KEY`, `my-proxy` → `MY_PROXY_API_KEY`.
pub fn env_var_name(provider: &str) -> String {
    format!("{}_API_KEY", provider.to_ascii_uppercase().replace('-', "_"))
}

/// Environment first, then keys from the config file.
#[derive(Debug, Default)]
pub struct EnvCredentials {
    fallback: HashMap<String, String>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: &ChatterConfig) -> Self {
        let fallback = config
            .providers
            .iter()
            .filter_map(|(name, settings)| Some((name.clone(), settings.api_key.clone()?)))
            .collect();
        Self { fallback }
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self, provider: &str) -> Option<String> {
        let var = env_var_name(provider);
        if let Some(key) = std::env::var(&var).ok().filter(|k| !k.is_empty()) {
            debug!("Using API key from {}", var);
            return Some(key);
        }
        let key = self.fallback.get(provider).cloned();
        if key.is_some() {
            debug!("Using API key for {} from config file", provider);
        }
        key
    }
}

/// Fixed in-memory keys.
#[derive(Debug, Default, Clone)]
pub struct StaticCredentials(HashMap<String, String>);

impl StaticCredentials {
    pub fn new<I, K, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self(keys.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self, provider: &str) -> Option<String> {
        self.0.get(provider).cloned()
    }
}
