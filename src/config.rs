//! Configuration management for Calbot
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from a YAML file with environment variable overrides.

use crate::error::{CalbotError, Result};
use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure for Calbot
///
/// Holds everything the service needs: the HTTP listener, the OpenAI
/// and Cal.com API settings, and chat behavior defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// OpenAI completion provider settings
    #[serde(default)]
    pub openai: OpenAiConfig,

    /// Cal.com calendar provider settings
    #[serde(default)]
    pub calcom: CalComConfig,

    /// Chat behavior defaults
    #[serde(default)]
    pub chat: ChatConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// OpenAI provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API base URL (overridable so tests can point at a mock server)
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,

    /// API key, normally supplied via CALBOT_OPENAI_API_KEY
    #[serde(default)]
    pub api_key: String,

    /// Chat model to use
    #[serde(default = "default_openai_model")]
    pub model: String,

    /// Sampling temperature for conversational completions
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_openai_model() -> String {
    "gpt-4-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout() -> u64 {
    30
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: default_openai_api_base(),
            api_key: String::new(),
            model: default_openai_model(),
            temperature: default_temperature(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Cal.com provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalComConfig {
    /// API base URL (overridable so tests can point at a mock server)
    #[serde(default = "default_calcom_api_base")]
    pub api_base: String,

    /// API key, normally supplied via CALBOT_CALCOM_API_KEY
    #[serde(default)]
    pub api_key: String,

    /// Per-request timeout (seconds)
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_calcom_api_base() -> String {
    "https://api.cal.com/v1".to_string()
}

impl Default for CalComConfig {
    fn default() -> Self {
        Self {
            api_base: default_calcom_api_base(),
            api_key: String::new(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Chat behavior configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// IANA timezone name passed to the calendar provider
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// UTC offset (hours) used to render "today" in the system prompt
    /// and to pick the target year for pattern-based date extraction
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,

    /// Default meeting duration (minutes) when the caller gives none
    #[serde(default = "default_slot_duration")]
    pub default_duration_minutes: u32,

    /// Booking language passed to the calendar provider
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_timezone() -> String {
    "America/Los_Angeles".to_string()
}

fn default_utc_offset_hours() -> i32 {
    -7
}

fn default_slot_duration() -> u32 {
    30
}

fn default_language() -> String {
    "en".to_string()
}

impl ChatConfig {
    /// Fixed offset of the reference timezone
    ///
    /// An out-of-range offset (rejected by `validate` anyway) falls
    /// back to UTC rather than panicking.
    pub fn reference_offset(&self) -> FixedOffset {
        match FixedOffset::east_opt(self.utc_offset_hours * 3600) {
            Some(offset) => offset,
            None => Utc.fix(),
        }
    }

    /// Current wall-clock time in the reference timezone
    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.reference_offset())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            utc_offset_hours: default_utc_offset_hours(),
            default_duration_minutes: default_slot_duration(),
            language: default_language(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            openai: OpenAiConfig::default(),
            calcom: CalComConfig::default(),
            chat: ChatConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file, then apply environment
    /// variable overrides.
    ///
    /// Missing file falls back to defaults with a warning, matching the
    /// behavior expected for containerized deployments where everything
    /// arrives via the environment.
    ///
    /// # Errors
    ///
    /// Returns `CalbotError::Config` if the file exists but cannot be
    /// read or parsed.
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| CalbotError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| CalbotError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(key) = std::env::var("CALBOT_OPENAI_API_KEY") {
            self.openai.api_key = key;
        }
        if let Ok(key) = std::env::var("CALBOT_CALCOM_API_KEY") {
            self.calcom.api_key = key;
        }
        if let Ok(base) = std::env::var("CALBOT_OPENAI_API_BASE") {
            self.openai.api_base = base;
        }
        if let Ok(base) = std::env::var("CALBOT_CALCOM_API_BASE") {
            self.calcom.api_base = base;
        }
        if let Ok(model) = std::env::var("CALBOT_OPENAI_MODEL") {
            self.openai.model = model;
        }
        if let Ok(host) = std::env::var("CALBOT_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CALBOT_PORT") {
            if let Ok(value) = port.parse() {
                self.server.port = value;
            } else {
                tracing::warn!("Invalid CALBOT_PORT: {}", port);
            }
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns `CalbotError::Config` if required values are missing or
    /// out of range.
    pub fn validate(&self) -> Result<()> {
        if self.openai.api_key.is_empty() {
            return Err(CalbotError::Config(
                "OpenAI API key is not set (CALBOT_OPENAI_API_KEY)".to_string(),
            )
            .into());
        }
        if self.calcom.api_key.is_empty() {
            return Err(CalbotError::Config(
                "Cal.com API key is not set (CALBOT_CALCOM_API_KEY)".to_string(),
            )
            .into());
        }
        if !(-12..=14).contains(&self.chat.utc_offset_hours) {
            return Err(CalbotError::Config(format!(
                "chat.utc_offset_hours out of range: {}",
                self.chat.utc_offset_hours
            ))
            .into());
        }
        if self.chat.default_duration_minutes == 0 {
            return Err(CalbotError::Config(
                "chat.default_duration_minutes must be greater than 0".to_string(),
            )
            .into());
        }
        Ok(())
    }
}
