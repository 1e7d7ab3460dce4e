use crate::error::ProviderError;

const RETRYABLE_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "overloaded",
    "unavailable",
    "timeout",
    "timed out",
    "network error",
    "connection reset",
    "econnreset",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limits, overload, timeouts, 429 and 5xx
    Transient,
    /// Auth, validation, bad request, unknown model
    Fatal,
}

/// Decide from a message and optional status code alone
pub fn classify_parts(message: &str, status: Option<u16>) -> ErrorClass {
    if matches!(status, Some(s) if s == 429 || s >= 500) {
        return ErrorClass::Transient;
    }
    let lower = message.to_lowercase();
    if RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p)) {
        ErrorClass::Transient
    } else {
        ErrorClass::Fatal
    }
}

pub fn classify(err: &ProviderError) -> ErrorClass {
    match err {
        ProviderError::Timeout(_) | ProviderError::Network(_) => ErrorClass::Transient,
        _ => classify_parts(&err.to_string(), err.status()),
    }
}

pub fn is_retryable(err: &ProviderError) -> bool {
    classify(err) == ErrorClass::Transient
}
