use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::language_utils;
use crate::translation::core::TranslationOptions;
use crate::translation::TierTable;

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
/// Represents the application configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Target language code (ISO)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation backend configuration
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Run settings common to all backends
    #[serde(default)]
    pub translation: TranslationSettings,

    /// Concurrency tier table
    #[serde(default)]
    pub tiers: TierTable,

    /// Translation memory settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation backend type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAI,
    Azure,
}

impl ProviderKind {
    pub fn display_name(&self) -> &str {
        match self {
            Self::OpenAI => "OpenAI",
            Self::Azure => "Azure OpenAI",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::Azure => write!(f, "azure"),
        }
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "azure" => Ok(Self::Azure),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Backend configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    /// Backend type identifier
    #[serde(rename = "type", default)]
    pub kind: ProviderKind,

    /// Model name (OpenAI) or informational label (Azure)
    #[serde(default = "default_model")]
    pub model: String,

    /// API key
    #[serde(default = "String::new")]
    pub api_key: String,

    /// Service endpoint URL (empty uses the public OpenAI API)
    #[serde(default = "String::new")]
    pub endpoint: String,

    /// Azure deployment name
    #[serde(default = "String::new")]
    pub deployment: String,

    /// Azure API version query parameter
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Temperature parameter for text generation (0.0 to 1.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Nucleus sampling probability (None leaves the backend default)
    #[serde(default)]
    pub top_p: Option<f32>,

    /// Maximum HTTP retry attempts per request
    #[serde(default = "default_http_retries")]
    pub max_retries: u32,

    /// Base backoff in milliseconds, doubled on each HTTP retry
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Rate limit in requests per minute (None disables pacing)
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::default(),
            model: default_model(),
            api_key: String::new(),
            endpoint: String::new(),
            deployment: String::new(),
            api_version: default_api_version(),
            temperature: default_temperature(),
            top_p: None,
            max_retries: default_http_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            rate_limit: default_rate_limit(),
        }
    }
}

/// Run settings common to all backends
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationSettings {
    /// Token budget per oracle request
    #[serde(default = "default_max_tokens_per_request")]
    pub max_tokens_per_request: usize,

    /// Retry attempts for failed units in the retry pass
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Fixed delay between retry attempts, in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Whether the oracle is told to keep inline markup and placeholders
    #[serde(default = "default_true")]
    pub preserve_formatting: bool,

    /// Term substitutions the oracle must honor
    #[serde(default)]
    pub terminology: HashMap<String, String>,

    /// Cost per 1000 prompt tokens, for the run estimate
    #[serde(default)]
    pub prompt_cost_per_1k: f64,

    /// Cost per 1000 completion tokens, for the run estimate
    #[serde(default)]
    pub completion_cost_per_1k: f64,
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            max_tokens_per_request: default_max_tokens_per_request(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            preserve_formatting: true,
            terminology: HashMap::new(),
            prompt_cost_per_1k: 0.0,
            completion_cost_per_1k: 0.0,
        }
    }
}

/// Translation memory settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MemoryConfig {
    /// Whether the memory is consulted and populated
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Minimum similarity for fuzzy hits (floored at 0.8 by the store)
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    /// Database file path; None uses the per-user data directory
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Entries unused for this many days are purged by optimization
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_similarity: default_min_similarity(),
            database_path: None,
            retention_days: default_retention_days(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
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

fn default_source_language() -> String {
    "en".to_string()
}

fn default_target_language() -> String {
    "zh".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_version() -> String {
    "2024-02-01".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_http_retries() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_rate_limit() -> Option<u32> {
    Some(60)
}

fn default_max_tokens_per_request() -> usize {
    1000
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}

fn default_min_similarity() -> f64 {
    0.8
}

fn default_retention_days() -> u32 {
    365
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_language: default_target_language(),
            provider: ProviderConfig::default(),
            translation: TranslationSettings::default(),
            tiers: TierTable::default(),
            memory: MemoryConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl Config {
    /// Load a configuration file, or create one with defaults when missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            let config: Config = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?;
            Ok(config)
        } else {
            log::warn!("Config file not found at {:?}, creating default config", path);
            let config = Config::default();
            let raw = serde_json::to_string_pretty(&config)
                .context("Failed to serialize default config")?;
            std::fs::write(path, raw)
                .with_context(|| format!("Failed to write default config: {:?}", path))?;
            Ok(config)
        }
    }

    /// Validate the configuration for consistency and required values
    pub fn validate(&self) -> Result<()> {
        language_utils::validate_language_code(&self.source_language)
            .with_context(|| format!("Invalid source language: {}", self.source_language))?;
        language_utils::validate_language_code(&self.target_language)
            .with_context(|| format!("Invalid target language: {}", self.target_language))?;

        if self.provider.api_key.is_empty() {
            return Err(anyhow!(
                "Translation API key is required for the {} provider",
                self.provider.kind.display_name()
            ));
        }
        if self.provider.kind == ProviderKind::Azure
            && (self.provider.endpoint.is_empty() || self.provider.deployment.is_empty())
        {
            return Err(anyhow!(
                "Azure provider requires both an endpoint and a deployment name"
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.min_similarity) {
            return Err(anyhow!("memory.min_similarity must be within [0, 1]"));
        }

        self.tiers.validate()?;

        Ok(())
    }

    /// Flatten config into the options the translation engine consumes
    pub fn translation_options(&self) -> TranslationOptions {
        TranslationOptions {
            source_language: self.source_language.clone(),
            target_language: self.target_language.clone(),
            max_tokens_per_request: self.translation.max_tokens_per_request,
            max_retries: self.translation.retry_count,
            retry_delay_ms: self.translation.retry_delay_ms,
            preserve_formatting: self.translation.preserve_formatting,
            use_memory: self.memory.enabled,
            min_similarity: self.memory.min_similarity,
            terminology: self.translation.terminology.clone(),
            prompt_cost_per_1k: self.translation.prompt_cost_per_1k,
            completion_cost_per_1k: self.translation.completion_cost_per_1k,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.provider.api_key = "sk-test".to_string();
        config
    }

    #[test]
    fn test_minimal_json_should_deserialize_with_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.source_language, "en");
        assert_eq!(config.target_language, "zh");
        assert_eq!(config.provider.kind, ProviderKind::OpenAI);
        assert_eq!(config.translation.max_tokens_per_request, 1000);
        assert!(config.memory.enabled);
        assert_eq!(config.log_level, LogLevel::Info);
    }

    #[test]
    fn test_validate_should_require_api_key() {
        let config = Config::default();
        assert!(config.validate().is_err());
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_validate_should_require_azure_deployment() {
        let mut config = valid_config();
        config.provider.kind = ProviderKind::Azure;
        assert!(config.validate().is_err());

        config.provider.endpoint = "https://res.openai.azure.com".to_string();
        config.provider.deployment = "gpt4o".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_should_reject_bad_language() {
        let mut config = valid_config();
        config.target_language = "xx".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_should_reject_out_of_range_similarity() {
        let mut config = valid_config();
        config.memory.min_similarity = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_provider_kind_should_round_trip_from_str() {
        assert_eq!("azure".parse::<ProviderKind>().unwrap(), ProviderKind::Azure);
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert!("ollama".parse::<ProviderKind>().is_err());
    }

    #[test]
    fn test_translation_options_should_mirror_config() {
        let mut config = valid_config();
        config.memory.enabled = false;
        config.translation.retry_count = 5;
        let options = config.translation_options();
        assert!(!options.use_memory);
        assert_eq!(options.max_retries, 5);
        assert_eq!(options.target_language, "zh");
    }
}
