//! Normalized error taxonomy for the translation pipeline

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Provider-independent classification of a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Request failed validation
    InvalidInput,
    /// No or unverifiable bearer token
    Unauthenticated,
    /// Provider rejected our API key
    InvalidCredentials,
    /// Caller exceeded their window
    RateLimited,
    /// Provider character quota exhausted
    QuotaExceeded,
    /// Provider did not answer in time
    Timeout,
    /// Provider down, unreachable or returned nothing usable
    ProviderUnavailable,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// HTTP status the kind is surfaced as
    pub fn http_status(self) -> u16 {
        match self {
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthenticated | ErrorKind::InvalidCredentials => 401,
            ErrorKind::RateLimited | ErrorKind::QuotaExceeded => 429,
            ErrorKind::Timeout => 504,
            ErrorKind::ProviderUnavailable => 502,
            ErrorKind::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::InvalidCredentials => "invalid_credentials",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ProviderUnavailable => "provider_unavailable",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Translation-related errors
#[derive(Error, Debug)]
pub enum TranslationError {
    /// Request failed validation
    #[error("{message}")]
    InvalidInput {
        /// What was wrong
        message: String,
    },

    /// No valid caller identity
    #[error("Not authenticated")]
    Unauthenticated,

    /// Provider rejected the configured API key
    #[error("Invalid API key")]
    InvalidCredentials,

    /// Local limiter or provider throttling
    #[error("{}", rate_limit_message(*retry_after))]
    RateLimited {
        /// How long until a retry can succeed, when known
        retry_after: Option<Duration>,
    },

    /// Monthly or plan quota exhausted at the provider
    #[error("Translation quota exceeded")]
    QuotaExceeded,

    /// Provider did not answer within the client timeout
    #[error("Translation service timed out")]
    Timeout,

    /// Provider 5xx or a successful response that breaks the contract
    #[error("{message}")]
    ProviderUnavailable {
        /// Caller-safe description
        message: String,
    },

    /// Anything unanticipated
    #[error("Internal error: {0}")]
    Internal(String),
}

fn rate_limit_message(retry_after: Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!(
            "Rate limit exceeded. Try again in {}s",
            retry_after_secs(wait)
        ),
        None => "Rate limit exceeded. Try again in a moment".to_string(),
    }
}

/// Whole seconds to wait, rounded up
pub fn retry_after_secs(wait: Duration) -> u64 {
    let millis = wait.as_millis() as u64;
    millis.div_ceil(1000)
}

impl TranslationError {
    /// Shorthand for a validation failure
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TranslationError::InvalidInput {
            message: message.into(),
        }
    }

    /// Shorthand for an unavailable or misbehaving provider
    pub fn unavailable(message: impl Into<String>) -> Self {
        TranslationError::ProviderUnavailable {
            message: message.into(),
        }
    }

    /// Build the error for a provider status already classified into `kind`
    pub fn from_provider_status(kind: ErrorKind, status: u16) -> Self {
        match kind {
            ErrorKind::InvalidInput => {
                Self::invalid_input("Translation request was rejected by the provider")
            }
            ErrorKind::Unauthenticated | ErrorKind::InvalidCredentials => {
                TranslationError::InvalidCredentials
            }
            ErrorKind::RateLimited => TranslationError::RateLimited { retry_after: None },
            ErrorKind::QuotaExceeded => TranslationError::QuotaExceeded,
            ErrorKind::Timeout => TranslationError::Timeout,
            ErrorKind::ProviderUnavailable if status >= 500 => {
                Self::unavailable("Translation service unavailable")
            }
            ErrorKind::ProviderUnavailable => Self::unavailable("Translation request failed"),
            ErrorKind::Internal => TranslationError::Internal(format!("provider status {status}")),
        }
    }

    /// Normalized kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            TranslationError::InvalidInput { .. } => ErrorKind::InvalidInput,
            TranslationError::Unauthenticated => ErrorKind::Unauthenticated,
            TranslationError::InvalidCredentials => ErrorKind::InvalidCredentials,
            TranslationError::RateLimited { .. } => ErrorKind::RateLimited,
            TranslationError::QuotaExceeded => ErrorKind::QuotaExceeded,
            TranslationError::Timeout => ErrorKind::Timeout,
            TranslationError::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            TranslationError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// HTTP status this error is surfaced as
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    /// Message safe to hand to the caller
    pub fn public_message(&self) -> String {
        match self {
            TranslationError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TranslationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TranslationError::Timeout
        } else if err.is_decode() {
            Self::unavailable("Translation service returned a malformed response")
        } else {
            Self::unavailable("Translation service unavailable")
        }
    }
}

/// Failures of a persistence backend (usage, history, preferences)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Concurrent first-write of the same unique key lost a race
    #[error("write contention")]
    Contention,

    /// Anything else the backend reported
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<StoreError> for TranslationError {
    fn from(err: StoreError) -> Self {
        TranslationError::Internal(err.to_string())
    }
}

/// Result type for persistence operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for translation operations
pub type Result<T> = std::result::Result<T, TranslationError>;
