use std::io;

/// Error type shared by the evaluators, collaborators and HTTP layer
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    #[error("No evaluator registered for event: {0}")]
    UnsupportedEvent(String),

    #[error("Invalid payload: {0}")]
    Validation(String),

    #[error("{service} request failed: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl AlertError {
    pub fn github(message: impl Into<String>) -> Self {
        AlertError::Upstream {
            service: "GitHub API",
            message: message.into(),
        }
    }

    /// Short machine-readable code used in HTTP error envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            AlertError::UnsupportedEvent(_) => "UNSUPPORTED_EVENT",
            AlertError::Validation(_) => "VALIDATION_ERROR",
            AlertError::Upstream { .. } => "GITHUB_API_ERROR",
            AlertError::Config(_) => "CONFIGURATION_ERROR",
            AlertError::Io(_) | AlertError::TomlParse(_) => "INTERNAL_SERVER_ERROR",
        }
    }
}

impl From<reqwest::Error> for AlertError {
    fn from(e: reqwest::Error) -> Self {
        AlertError::github(e.to_string())
    }
}

impl From<serde_json::Error> for AlertError {
    fn from(e: serde_json::Error) -> Self {
        AlertError::Validation(e.to_string())
    }
}

/// Helper type for Results that use AlertError
pub type Result<T> = std::result::Result<T, AlertError>;
