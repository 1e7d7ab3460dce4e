use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Role '{role}' is missing a {field}")]
    IncompleteRole { role: String, field: &'static str },

    #[error("Unknown provider '{provider}' configured for role '{role}'")]
    UnknownProvider { role: String, provider: String },

    #[error("Retry base delay must be greater than zero")]
    ZeroBaseDelay,
}

/// Failure reported by a model backend. Carries an HTTP-like status when the
/// backend has one so the classifier can look at it.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process failed with exit code {code}: {stderr}")]
    NonZeroExit { code: i32, stderr: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{message}")]
    Other {
        message: String,
        status: Option<u16>,
    },
}

impl ProviderError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::Http { status, .. } => Some(*status),
            ProviderError::Other { status, .. } => *status,
            _ => None,
        }
    }

    /// Map a reqwest failure. `timeout` is the limit the client was built
    /// with, reported back when the request hit it.
    pub fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if let Some(status) = err.status() {
            return ProviderError::Http {
                status: status.as_u16(),
                message: err.to_string(),
            };
        }
        if err.is_timeout() {
            return ProviderError::Timeout(timeout);
        }
        if err.is_decode() {
            return ProviderError::InvalidResponse(err.to_string());
        }
        ProviderError::Network(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum RetryError {
    /// Non-retryable failure, passed through as-is.
    #[error(transparent)]
    Fatal(ProviderError),

    #[error("{source} (gave up after {attempts} attempts)")]
    Exhausted {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    #[error("Cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Could not recover a subtask batch from model output: {preview}")]
    MalformedOutput { preview: String },

    #[error("Subtask {index} failed validation: {reason}")]
    SchemaViolation { index: usize, reason: String },
}

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ExpandError {
    #[error("No model provider produced a response; check configured models and API keys")]
    NoProviderAvailable,

    #[error("Generation was cancelled")]
    Cancelled,

    #[error("Model returned an unexpected payload: {0}")]
    UnexpectedPayload(String),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error("Failed to read prompt file '{path}': {source}")]
    PromptFile {
        path: PathBuf,
        source: std::io::Error,
    },
}
