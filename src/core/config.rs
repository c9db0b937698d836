//! # Configuration
//!
//! Centralizes all settings with a clear override hierarchy:
//! defaults → config file → env vars → CLI flags.
//!
//! Config lives at `~/.chatter/config.toml`. If missing on first run, a
//! commented-out default is generated so users can discover all options.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::inference::{BaseUrl, PartialConfig};

// ============================================================================
// Config Structs (all fields Option<T> for sparse TOML)
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ChatterConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    /// Per-provider settings keyed by provider name (`[providers.openai]`).
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderSettings>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub default_provider: Option<String>,
    pub system_prompt: Option<String>,
    pub max_tokens: Option<u32>,
    pub stream: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub port: Option<u16>,
    pub model: Option<String>,
    pub max_tokens_field: Option<String>,
}

impl ProviderSettings {
    /// The caller-override layer these settings describe.
    pub fn to_overrides(&self) -> PartialConfig {
        PartialConfig {
            base_url: self.base_url.clone().map(BaseUrl::Fixed),
            port: self.port,
            model: self.model.clone(),
            max_tokens_field: self.max_tokens_field.clone(),
            ..Default::default()
        }
    }
}

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_PROVIDER: &str = "anthropic";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that loves to use emojis.";

// ============================================================================
// Resolved Config (concrete values where a default exists)
// ============================================================================

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub provider: String,
    pub system_prompt: String,
    /// None = the request builder's default.
    pub max_tokens: Option<u32>,
    pub stream: bool,
    /// Overrides for the selected provider from the config file.
    pub overrides: PartialConfig,
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigLoadError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl fmt::Display for ConfigLoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigLoadError::Io(e) => write!(f, "config I/O error: {e}"),
            ConfigLoadError::Parse(e) => write!(f, "config parse error: {e}"),
        }
    }
}

impl std::error::Error for ConfigLoadError {}

// ============================================================================
// Loading
// ============================================================================

/// Returns the path to `~/.chatter/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".chatter").join("config.toml"))
}

/// Load config from `~/.chatter/config.toml`.
///
/// If the file doesn't exist, generates a commented-out default and
/// returns `ChatterConfig::default()`. If it exists but is malformed,
/// returns `ConfigLoadError::Parse`.
pub fn load_config() -> Result<ChatterConfig, ConfigLoadError> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            warn!("Could not determine home directory, using default config");
            return Ok(ChatterConfig::default());
        }
    };
    load_config_from(&path)
}

/// Same as [`load_config`] for an explicit path.
pub fn load_config_from(path: &Path) -> Result<ChatterConfig, ConfigLoadError> {
    if !path.exists() {
        info!("No config file found, generating default at {}", path.display());
        generate_default_config(path);
        return Ok(ChatterConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(ConfigLoadError::Io)?;
    let config: ChatterConfig = toml::from_str(&contents).map_err(ConfigLoadError::Parse)?;
    info!("Loaded config from {}", path.display());
    // api keys live in here, so only the shape gets logged
    debug!(
        "Config: general={:?}, providers={:?}",
        config.general,
        config.providers.keys().collect::<Vec<_>>()
    );
    Ok(config)
}

/// Generates a commented-out default config file at the given path.
fn generate_default_config(path: &Path) {
    let default_content = r#"# Chatter Configuration
# All settings are optional. Defaults are used for anything not specified.
# Override hierarchy: defaults → this file → env vars → CLI flags.

# [general]
# default_provider = "anthropic"     # local, openai, anthropic, fireworks, groq, generic
# system_prompt = "You are a helpful assistant."
# max_tokens = 1024
# stream = true

# [providers.openai]
# api_key = "sk-..."                 # Or set OPENAI_API_KEY env var
# model = "gpt-4o-mini"

# [providers.local]
# port = 8080

# [providers.generic]
# base_url = "http://192.168.1.100:8000"
"#;

    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Failed to create config directory: {}", e);
            return;
        }
    }
    if let Err(e) = fs::write(path, default_content) {
        warn!("Failed to write default config: {}", e);
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Resolve the final config by collapsing: defaults → config file → env vars → CLI.
///
/// `cli_provider` and `cli_system` are from CLI flags (None = not specified).
pub fn resolve(
    config: &ChatterConfig,
    cli_provider: Option<&str>,
    cli_system: Option<&str>,
) -> ResolvedConfig {
    // Provider: CLI → env → config → default
    let provider = cli_provider
        .map(|s| s.to_string())
        .or_else(|| std::env::var("CHATTER_PROVIDER").ok())
        .or_else(|| config.general.default_provider.clone())
        .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

    // System prompt: CLI → env → config → default
    let system_prompt = cli_system
        .map(|s| s.to_string())
        .or_else(|| std::env::var("CHATTER_SYSTEM_PROMPT").ok())
        .or_else(|| config.general.system_prompt.clone())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

    let overrides = config
        .providers
        .get(&provider)
        .map(ProviderSettings::to_overrides)
        .unwrap_or_default();

    ResolvedConfig {
        provider,
        system_prompt,
        max_tokens: config.general.max_tokens,
        stream: config.general.stream.unwrap_or(true),
        overrides,
    }
}
