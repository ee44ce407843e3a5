//! Configuration for the mastery loop and its collaborators.
//!
//! Settings live in `mastery.json` (camelCase). API keys are never part of
//! the file; they come from the environment only.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MasteryError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "mastery.json";

/// Environment variable holding the content-generation API key.
pub const GENERATION_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

/// Environment variable holding the web-search API key.
pub const SEARCH_API_KEY_ENV: &str = "YDC_API_KEY";

/// Largest result count the search service accepts.
pub const MAX_SEARCH_RESULTS: u32 = 20;

fn default_model() -> String {
    "google/gemini-3-flash-preview".to_string()
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

const fn default_request_timeout() -> u64 {
    60
}

fn default_app_title() -> String {
    "Mentor Agent".to_string()
}

fn default_referer() -> String {
    "http://localhost".to_string()
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_search_base_url() -> String {
    "https://ydc-index.io/v1".to_string()
}

const fn default_result_count() -> u32 {
    5
}

const fn default_concurrency() -> usize {
    2
}

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Model identifier sent to the chat-completions endpoint.
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Sent as `X-Title`.
    #[serde(default = "default_app_title")]
    pub app_title: String,

    /// Sent as `HTTP-Referer`.
    #[serde(default = "default_referer")]
    pub referer: String,

    /// Sampling temperature; provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Attempt ceiling for drivers that want one. Absent means no ceiling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Client-side retry of transient transport failures.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Web-search settings.
    #[serde(default)]
    pub search: SearchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            app_title: default_app_title(),
            referer: default_referer(),
            temperature: None,
            max_attempts: None,
            retry: RetryConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `mastery.json`; falls back to defaults if it isn't there.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            MasteryError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads `mastery.json` from `dir`, or defaults if it isn't there.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is invalid.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::ConfigParseError` if the file cannot be read or
    /// is not valid JSON, and `MasteryError::ConfigValidationError` if values
    /// are out of range.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(MasteryError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| MasteryError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `MasteryError::ConfigValidationError` for the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(MasteryError::config_validation(
                "model must not be empty",
                "Set model to a provider model id, e.g. \"google/gemini-3-flash-preview\"",
            ));
        }

        if self.base_url.trim().is_empty() {
            return Err(MasteryError::config_validation(
                "baseUrl must not be empty",
                "Set baseUrl to an OpenAI-compatible endpoint in your mastery.json",
            ));
        }

        if self.request_timeout_secs == 0 {
            return Err(MasteryError::config_validation(
                "requestTimeoutSecs must be greater than 0",
                "Set requestTimeoutSecs to at least 1 second in your mastery.json",
            ));
        }

        if self.max_attempts == Some(0) {
            return Err(MasteryError::config_validation(
                "maxAttempts must be greater than 0 when set",
                "Remove maxAttempts for no ceiling, or set it to at least 1",
            ));
        }

        if self.search.base_url.trim().is_empty() {
            return Err(MasteryError::config_validation(
                "search.baseUrl must not be empty",
                "Set search.baseUrl in your mastery.json",
            ));
        }

        if !(1..=MAX_SEARCH_RESULTS).contains(&self.search.result_count) {
            return Err(MasteryError::config_validation(
                format!(
                    "search.resultCount must be between 1 and {MAX_SEARCH_RESULTS}, got {}",
                    self.search.result_count
                ),
                "Set search.resultCount to a value between 1 and 20",
            ));
        }

        if self.search.concurrency == 0 {
            return Err(MasteryError::config_validation(
                "search.concurrency must be greater than 0",
                "Set search.concurrency to at least 1 in your mastery.json",
            ));
        }

        Ok(())
    }
}

/// Client-side retry policy for transient transport failures.
///
/// The default of zero retries leaves retry decisions to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// Retries after the first attempt.
    #[serde(default)]
    pub max_retries: u32,

    /// Backoff before the first retry; doubles each time.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_backoff_ms: default_initial_backoff_ms(),
        }
    }
}

/// Web-search settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConfig {
    /// Base URL of the search API.
    #[serde(default = "default_search_base_url")]
    pub base_url: String,

    /// Results requested per query.
    #[serde(default = "default_result_count")]
    pub result_count: u32,

    /// Queries in flight at once for multi-query searches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_search_base_url(),
            result_count: default_result_count(),
            concurrency: default_concurrency(),
        }
    }
}
