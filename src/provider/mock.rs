//! Scripted backend and credentials for tests

use super::{BackendParams, BackendResponse, CredentialSource, ModelBackend, Payload, TokenUsage};
use crate::error::ProviderError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

type Script = Box<dyn Fn(u32) -> Result<BackendResponse, ProviderError> + Send + Sync>;

/// Backend whose reply to the n-th call (0-based) comes from a closure
pub struct MockBackend {
    script: Script,
    calls: AtomicU32,
    last_params: Mutex<Option<BackendParams>>,
}

impl MockBackend {
    pub fn scripted<F>(script: F) -> Self
    where
        F: Fn(u32) -> Result<BackendResponse, ProviderError> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicU32::new(0),
            last_params: Mutex::new(None),
        }
    }

    /// Always answers with the given text and fixed usage
    pub fn text(text: &str) -> Self {
        let text = text.to_string();
        Self::scripted(move |_| {
            Ok(BackendResponse {
                payload: Payload::Text(text.clone()),
                usage: TokenUsage {
                    input_tokens: 100,
                    output_tokens: 50,
                },
            })
        })
    }

    /// Always answers with the given JSON object
    pub fn object(value: serde_json::Value) -> Self {
        Self::scripted(move |_| {
            Ok(BackendResponse {
                payload: Payload::Object(value.clone()),
                usage: TokenUsage {
                    input_tokens: 10,
                    output_tokens: 5,
                },
            })
        })
    }

    /// Always fails with a freshly built error
    pub fn failing<F>(make_error: F) -> Self
    where
        F: Fn() -> ProviderError + Send + Sync + 'static,
    {
        Self::scripted(move |_| Err(make_error()))
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_params(&self) -> Option<BackendParams> {
        self.last_params.lock().ok().and_then(|p| p.clone())
    }

    fn respond(&self, params: &BackendParams) -> Result<BackendResponse, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_params.lock() {
            *last = Some(params.clone());
        }
        (self.script)(n)
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate_text(&self, params: &BackendParams) -> Result<BackendResponse, ProviderError> {
        self.respond(params)
    }
}

/// Fixed set of credentials keyed by env var name
#[derive(Debug, Default)]
pub struct StaticCredentials {
    keys: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(pairs: &[(&str, &str)]) -> Self {
        Self {
            keys: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

impl CredentialSource for StaticCredentials {
    fn lookup(&self, key_name: &str) -> Option<String> {
        self.keys.get(key_name).cloned()
    }
}
