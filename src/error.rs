//! Error types for Calbot
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling, plus the structured
//! JSON payload the HTTP boundary returns for request-level failures.

use serde::Serialize;
use thiserror::Error;

/// Main error type for Calbot operations
///
/// Covers caller-input validation, missing resources, upstream provider
/// failures (calendar and completion APIs), configuration loading, and
/// the catch-all conversions from IO/serialization/HTTP errors.
#[derive(Error, Debug)]
pub enum CalbotError {
    /// Bad or missing caller input (400-equivalent)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced resource does not exist (404-equivalent)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Cal.com API failure, carrying the upstream status when known
    #[error("Cal.com API error: {message}")]
    CalendarApi {
        /// Human-readable failure summary
        message: String,
        /// Upstream HTTP status, if the request reached the API
        status: Option<u16>,
        /// Raw upstream response body or transport detail
        details: Option<String>,
    },

    /// Completion (LLM) API failure
    #[error("Completion API error: {message}")]
    CompletionApi {
        /// Human-readable failure summary
        message: String,
        /// Raw upstream response body or transport detail
        details: Option<String>,
    },

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CalbotError {
    /// Machine-readable error code for the boundary payload
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::CalendarApi { .. } => "calcom_api_error",
            Self::CompletionApi { .. } => "completion_api_error",
            Self::Config(_) => "config_error",
            Self::Io(_) | Self::Serialization(_) | Self::Yaml(_) | Self::Http(_) => {
                "unexpected_error"
            }
        }
    }

    /// HTTP-equivalent status for the boundary payload
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::CalendarApi { status, .. } => status.unwrap_or(502),
            Self::CompletionApi { .. } => 502,
            _ => 500,
        }
    }

    /// Upstream detail string, when one was captured
    pub fn details(&self) -> Option<&str> {
        match self {
            Self::CalendarApi { details, .. } | Self::CompletionApi { details, .. } => {
                details.as_deref()
            }
            _ => None,
        }
    }
}

/// Structured error payload returned by the HTTP boundary
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// HTTP-equivalent status
    pub status: u16,
    /// Optional upstream detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    /// Build the boundary payload from any error, downcasting to
    /// `CalbotError` when possible and falling back to the 500 class.
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<CalbotError>() {
            Some(e) => Self {
                code: e.code().to_string(),
                message: e.to_string(),
                status: e.status_code(),
                details: e.details().map(String::from),
            },
            None => Self {
                code: "unexpected_error".to_string(),
                message: err.to_string(),
                status: 500,
                details: None,
            },
        }
    }
}

/// Result type alias for Calbot operations
///
/// Uses `anyhow::Error` as the error type, allowing rich error context
/// and easy propagation with `?`.
pub type Result<T> = anyhow::Result<T>;
