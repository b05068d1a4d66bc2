/*!
 * Error types for the transfix library.
 *
 * The request taxonomy mirrors what a backend can do to a single call:
 * the call never completed (`Transport`), the backend answered with
 * something unusable (`Rejected`), or the credential is spent or refused
 * (`ExhaustedCredential`). Repair reports add `ValidationFailure` and
 * `Configuration` on top of that through `FailureKind`.
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by one request/response exchange with a backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Network failure, connection refusal or timeout
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend answered but the result is empty, blocked or malformed
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Quota, billing or authentication failure
    #[error("Credential exhausted: {0}")]
    ExhaustedCredential(String),
}

impl RequestError {
    /// Report-level classification of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Transport(_) => FailureKind::Transport,
            Self::Rejected(_) => FailureKind::Rejected,
            Self::ExhaustedCredential(_) => FailureKind::ExhaustedCredential,
        }
    }

    /// Map an HTTP status and body to the request taxonomy
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = format!("HTTP {}: {}", status, truncate(body, 300));
        match status {
            401 | 402 | 403 | 429 => Self::ExhaustedCredential(message),
            400..=499 => Self::Rejected(message),
            _ => Self::Transport(message),
        }
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::from_status(status.as_u16(), &error.to_string());
        }
        if error.is_decode() {
            return Self::Rejected(format!("Failed to decode response: {}", error));
        }
        Self::Transport(error.to_string())
    }
}

/// Why a first-pass task or a repair attempt did not produce usable text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network failure or timeout
    #[serde(rename = "transport_error")]
    Transport,
    /// Unusable response
    Rejected,
    /// Quota or authentication failure
    ExhaustedCredential,
    /// A response arrived but still carries the original defect
    ValidationFailure,
    /// No usable platform is configured
    #[serde(rename = "configuration_error")]
    Configuration,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Transport => "transport_error",
            Self::Rejected => "rejected",
            Self::ExhaustedCredential => "exhausted_credential",
            Self::ValidationFailure => "validation_failure",
            Self::Configuration => "configuration_error",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised while validating configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The active platform index points past the platform list
    #[error("Active platform index {index} is out of range ({count} platforms configured)")]
    ActivePlatformOutOfRange {
        /// Configured index
        index: usize,
        /// Number of configured platforms
        count: usize,
    },

    /// A platform entry is structurally invalid
    #[error("Platform {index} is invalid: {reason}")]
    InvalidPlatform {
        /// Position in the configured list
        index: usize,
        /// What is wrong with it
        reason: String,
    },

    /// Source and destination language are the same
    #[error("Source and target language are both {0}")]
    SameLanguage(String),

    /// A glossary entry has an empty side
    #[error("Glossary entry {0} has an empty source or destination term")]
    EmptyGlossaryTerm(usize),
}

/// Main application error type that wraps all other errors
#[derive(Error, Debug)]
pub enum AppError {
    /// Error from a file operation
    #[error("File error: {0}")]
    File(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Error from a backend request
    #[error("Request error: {0}")]
    Request(#[from] RequestError),

    /// Error from the item store
    #[error("Store error: {0}")]
    Store(String),

    /// Any other error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self::Unknown(error.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(error: std::io::Error) -> Self {
        Self::File(error.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Store(error.to_string())
    }
}

/// Shorten a message to at most `max_chars` characters
pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut short: String = text.chars().take(max_chars).collect();
        short.push_str("...");
        short
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fromStatus_withAuthAndQuotaCodes_shouldBeExhaustedCredential() {
        for status in [401, 402, 403, 429] {
            assert!(matches!(
                RequestError::from_status(status, "nope"),
                RequestError::ExhaustedCredential(_)
            ));
        }
    }

    #[test]
    fn test_fromStatus_withOtherClientErrors_shouldBeRejected() {
        assert!(matches!(RequestError::from_status(400, "bad"), RequestError::Rejected(_)));
        assert!(matches!(RequestError::from_status(404, "gone"), RequestError::Rejected(_)));
    }

    #[test]
    fn test_fromStatus_withServerErrors_shouldBeTransport() {
        assert!(matches!(RequestError::from_status(500, "boom"), RequestError::Transport(_)));
        assert!(matches!(RequestError::from_status(503, "busy"), RequestError::Transport(_)));
    }

    #[test]
    fn test_failureKind_display_shouldUseTaxonomyNames() {
        assert_eq!(FailureKind::Transport.to_string(), "transport_error");
        assert_eq!(FailureKind::Configuration.to_string(), "configuration_error");
        assert_eq!(FailureKind::ValidationFailure.to_string(), "validation_failure");
    }

    #[test]
    fn test_truncate_shouldRespectCharBoundaries() {
        assert_eq!(truncate("编程编程", 2), "编程...");
        assert_eq!(truncate("short", 10), "short");
    }
}
