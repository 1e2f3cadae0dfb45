use serde::Serialize;
use thiserror::Error;

/// Reason a credential ended up `Invalid`.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Network failure: {0}")]
    NetworkFailure(String),
    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ValidationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => "CFG-1001",
            Self::NetworkFailure(_) => "NET-1001",
            Self::Unknown(_) => "GEN-1000",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::InvalidConfiguration(_) => {
                "The provider could not be reached because its local configuration is missing or malformed."
            }
            Self::NetworkFailure(_) => {
                "The provider rejected the credential or could not be reached."
            }
            Self::Unknown(_) => "An unspecified error occurred while validating the credential.",
        }
    }

    /// Human readable detail preserved for display.
    pub fn detail(&self) -> &str {
        match self {
            Self::InvalidConfiguration(detail)
            | Self::NetworkFailure(detail)
            | Self::Unknown(detail) => detail,
        }
    }
}

/// Failure reported by a [`ProbeExecutor`](crate::validation::ProbeExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetworkError {
    #[error("provider responded with HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out")]
    Timeout,
    #[error("request was cancelled")]
    Cancelled,
    #[error("request could not be built: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Other(String),
}

impl From<NetworkError> for ValidationError {
    fn from(err: NetworkError) -> Self {
        match err {
            NetworkError::InvalidRequest(detail) => Self::InvalidConfiguration(detail),
            NetworkError::Other(detail) => Self::Unknown(detail),
            other => Self::NetworkFailure(other.to_string()),
        }
    }
}
