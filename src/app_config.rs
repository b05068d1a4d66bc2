use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::default::Default;
use std::path::Path;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::glossary::{Glossary, GlossaryEntry};
use crate::language::Language;
use crate::platforms::NO_KEY_REQUIRED;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Language of the ingested items
    pub source_language: Language,

    /// Language to translate into
    pub target_language: Language,

    /// Index of the active platform in `platforms`
    #[serde(default)]
    pub activate_platform: usize,

    /// Ordered list of configured backends
    #[serde(default)]
    pub platforms: Vec<PlatformConfig>,

    /// Concurrency limit for first pass and repair (0 selects the default)
    #[serde(default)]
    pub max_workers: usize,

    /// Task admissions allowed per minute across both passes (0 disables pacing)
    #[serde(default)]
    pub rpm_threshold: u32,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Required term translations
    #[serde(default)]
    pub glossary: Vec<GlossaryEntry>,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Wire protocol family of a platform
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiFormat {
    // @format: OpenAI chat completions
    #[default]
    OpenAI,
    // @format: Anthropic messages
    Anthropic,
    // @format: Google generateContent
    Google,
    // @format: SakuraLLM local server (OpenAI wire shape)
    SakuraLLM,
}

impl ApiFormat {
    // @returns: Human readable protocol name
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Google => "Google",
            Self::SakuraLLM => "SakuraLLM",
        }
    }
}

impl std::fmt::Display for ApiFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl std::str::FromStr for ApiFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "google" => Ok(Self::Google),
            "sakurallm" | "sakura" => Ok(Self::SakuraLLM),
            _ => Err(anyhow::anyhow!("Invalid api format: {}", s)),
        }
    }
}

/// Default sampling parameters of a platform
///
/// Unset values are not sent, leaving the backend's own defaults in place.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct GenerationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

/// One configured backend endpoint
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlatformConfig {
    // @field: Display name
    pub name: String,

    // @field: Protocol family
    #[serde(default)]
    pub api_format: ApiFormat,

    // @field: Base URL
    #[serde(default)]
    pub api_url: String,

    // @field: Credentials, rotated round-robin
    #[serde(default)]
    pub api_key: Vec<String>,

    // @field: Model name
    #[serde(default)]
    pub model: String,

    // @field: Default sampling parameters
    #[serde(default)]
    pub generation: GenerationSettings,

    // @field: Maximum output tokens per request
    #[serde(default = "default_output_token_limit")]
    pub output_token_limit: u32,

    // @field: Additional HTTP headers
    #[serde(default)]
    pub extra_headers: BTreeMap<String, String>,
}

impl PlatformConfig {
    // @param api_format: Protocol family
    // @returns: Platform config with defaults for that protocol
    pub fn new(name: impl Into<String>, api_format: ApiFormat) -> Self {
        let (api_url, model, api_key) = match api_format {
            ApiFormat::OpenAI => (default_openai_endpoint(), default_openai_model(), Vec::new()),
            ApiFormat::Anthropic => (default_anthropic_endpoint(), default_anthropic_model(), Vec::new()),
            ApiFormat::Google => (default_google_endpoint(), default_google_model(), Vec::new()),
            ApiFormat::SakuraLLM => (
                default_sakura_endpoint(),
                default_sakura_model(),
                vec![NO_KEY_REQUIRED.to_string()],
            ),
        };

        Self {
            name: name.into(),
            api_format,
            api_url,
            api_key,
            model,
            generation: GenerationSettings::default(),
            output_token_limit: default_output_token_limit(),
            extra_headers: BTreeMap::new(),
        }
    }

    /// Set the credential list
    pub fn with_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.api_key = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Keys that may actually be sent: non-blank and not the placeholder sentinel
    pub fn usable_keys(&self) -> Vec<&str> {
        self.api_key
            .iter()
            .map(|k| k.trim())
            .filter(|k| !k.is_empty() && *k != NO_KEY_REQUIRED)
            .collect()
    }

    /// Whether this platform carries real credential material
    pub fn has_credentials(&self) -> bool {
        !self.usable_keys().is_empty()
    }

    fn validate(&self, index: usize) -> std::result::Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidPlatform {
            index,
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name is empty"));
        }
        if self.model.trim().is_empty() {
            return Err(invalid("model is empty"));
        }
        url::Url::parse(&self.api_url)
            .map_err(|e| invalid(&format!("api_url '{}' is not a valid URL: {}", self.api_url, e)))?;
        if self.output_token_limit == 0 {
            return Err(invalid("output_token_limit must be positive"));
        }
        Ok(())
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Concurrency limit used when `max_workers` is 0
pub const DEFAULT_MAX_WORKERS: usize = 8;

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_output_token_limit() -> u32 {
    4096
}

fn default_openai_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_anthropic_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_google_endpoint() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_sakura_endpoint() -> String {
    // Local SakuraLLM server exposing the OpenAI wire format
    "http://127.0.0.1:8080/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_anthropic_model() -> String {
    "claude-3-5-haiku-latest".to_string()
}

fn default_google_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_sakura_model() -> String {
    "sakura-14b-qwen2.5-v1.0".to_string()
}

impl Config {
    /// Load a configuration file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        Ok(config)
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
            }
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }

    /// Validate the configuration for consistency and required values
    ///
    /// Having no platform with credentials is not an error here; the repair
    /// pass reports it per item.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.source_language == self.target_language {
            return Err(ConfigError::SameLanguage(self.source_language.to_string()));
        }

        // Entries without credentials are never requested unless active
        for (index, platform) in self.platforms.iter().enumerate() {
            if index == self.activate_platform || platform.has_credentials() {
                platform.validate(index)?;
            }
        }

        if !self.platforms.is_empty() && self.activate_platform >= self.platforms.len() {
            return Err(ConfigError::ActivePlatformOutOfRange {
                index: self.activate_platform,
                count: self.platforms.len(),
            });
        }

        for (index, entry) in self.glossary.iter().enumerate() {
            if entry.enable && (entry.src.trim().is_empty() || entry.dst.trim().is_empty()) {
                return Err(ConfigError::EmptyGlossaryTerm(index));
            }
        }

        Ok(())
    }

    /// The active platform, if the index points into the list
    pub fn active_platform(&self) -> std::result::Result<&PlatformConfig, ConfigError> {
        self.platforms
            .get(self.activate_platform)
            .ok_or(ConfigError::ActivePlatformOutOfRange {
                index: self.activate_platform,
                count: self.platforms.len(),
            })
    }

    /// Effective concurrency limit
    pub fn worker_limit(&self) -> usize {
        if self.max_workers == 0 {
            DEFAULT_MAX_WORKERS
        } else {
            self.max_workers
        }
    }

    /// Per-request timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Enforced glossary built from the configured entries
    pub fn glossary(&self) -> Glossary {
        Glossary::new(self.glossary.iter().cloned())
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: Language::Ja,
            target_language: Language::Zh,
            activate_platform: 0,
            platforms: vec![
                PlatformConfig::new("OpenAI", ApiFormat::OpenAI),
                PlatformConfig::new("Anthropic", ApiFormat::Anthropic),
                PlatformConfig::new("Google", ApiFormat::Google),
                PlatformConfig::new("SakuraLLM", ApiFormat::SakuraLLM),
            ],
            max_workers: 0,
            rpm_threshold: 0,
            request_timeout_secs: default_request_timeout_secs(),
            glossary: Vec::new(),
            log_level: LogLevel::default(),
        }
    }
}
