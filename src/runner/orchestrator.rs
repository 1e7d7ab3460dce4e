use crate::config::{Config, Role};
use crate::error::RetryError;
use crate::provider::{
    BackendParams, BackendRegistry, Message, ModelBackend, Payload, ServiceKind, TokenUsage,
};
use crate::telemetry::{TelemetryQueue, UsageTelemetry};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::retry::{call_with_retry, RetryPolicy};
use super::roles::{build_attempt_sequence, AttemptSpec};

/// Where the caller's output goes. Only CLI runs push usage to the sink;
/// MCP callers get the record back in the result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputChannel {
    #[default]
    Cli,
    Mcp,
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub role: Role,
    pub prompt: String,
    pub system_prompt: String,
    pub schema: Option<serde_json::Value>,
    pub object_name: Option<String>,
    pub command_name: String,
    pub output_channel: OutputChannel,
}

impl GenerationRequest {
    pub fn new(role: Role, prompt: impl Into<String>) -> Self {
        Self {
            role,
            prompt: prompt.into(),
            system_prompt: String::new(),
            schema: None,
            object_name: None,
            command_name: "generate".to_string(),
            output_channel: OutputChannel::Cli,
        }
    }

    pub fn system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn schema(mut self, schema: serde_json::Value, object_name: &str) -> Self {
        self.schema = Some(schema);
        self.object_name = Some(object_name.to_string());
        self
    }

    pub fn command(mut self, command_name: &str) -> Self {
        self.command_name = command_name.to_string();
        self
    }

    pub fn channel(mut self, channel: OutputChannel) -> Self {
        self.output_channel = channel;
        self
    }
}

/// Successful generation from exactly one attempt
#[derive(Debug)]
pub struct GenerationResult<T = Payload> {
    pub output: T,
    pub usage: TokenUsage,
    pub provider: String,
    pub model_id: String,
    pub role: Role,
    pub telemetry: UsageTelemetry,
}

impl GenerationResult<Payload> {
    pub fn text(&self) -> Option<&str> {
        match &self.output {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn object(&self) -> Option<&serde_json::Value> {
        match &self.output {
            Payload::Object(value) => Some(value),
            _ => None,
        }
    }
}

/// Runs a request against each configured role in order until one succeeds.
///
/// Attempts are strictly sequential. Each attempt gets its own retry budget
/// for transient errors; anything else moves on to the next attempt. When
/// nothing succeeds the caller gets `None` and decides how to degrade.
pub struct UnifiedRunner {
    config: Arc<Config>,
    backends: BackendRegistry,
    policy: RetryPolicy,
    telemetry: Option<TelemetryQueue>,
    cancel: CancellationToken,
}

impl UnifiedRunner {
    pub fn new(config: Arc<Config>, backends: BackendRegistry) -> Self {
        let policy = RetryPolicy::from(&config.retry);
        Self {
            config,
            backends,
            policy,
            telemetry: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_telemetry(mut self, queue: TelemetryQueue) -> Self {
        self.telemetry = Some(queue);
        self
    }

    /// Cancelling this token aborts the in-flight call or backoff sleep
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn attempt_sequence(&self, role: Role) -> Vec<AttemptSpec> {
        build_attempt_sequence(&self.config, role)
    }

    pub async fn generate_text(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        self.run(ServiceKind::GenerateText, request).await
    }

    pub async fn generate_object(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        self.run(ServiceKind::GenerateObject, request).await
    }

    pub async fn stream_text(&self, request: &GenerationRequest) -> Option<GenerationResult> {
        self.run(ServiceKind::StreamText, request).await
    }

    /// Structured generation into `T`. The schema is derived from `T`; a reply
    /// that does not deserialize counts as a failed attempt.
    pub async fn generate_object_as<T>(
        &self,
        request: &GenerationRequest,
    ) -> Option<GenerationResult<T>>
    where
        T: DeserializeOwned + JsonSchema,
    {
        let mut request = request.clone();
        if request.schema.is_none() {
            let schema = schemars::schema_for!(T);
            let name = request
                .object_name
                .clone()
                .unwrap_or_else(|| T::schema_name());
            request = match serde_json::to_value(&schema) {
                Ok(value) => request.schema(value, &name),
                Err(e) => {
                    warn!("Could not serialize schema for {}: {}", name, e);
                    request
                }
            };
        }

        self.run_validated(ServiceKind::GenerateObject, &request, |payload| match payload {
            Payload::Object(value) => serde_json::from_value(value).map_err(|e| e.to_string()),
            other => Err(format!("expected an object payload, got {:?}", other)),
        })
        .await
    }

    pub async fn run(
        &self,
        kind: ServiceKind,
        request: &GenerationRequest,
    ) -> Option<GenerationResult> {
        self.run_validated(kind, request, Ok).await
    }

    /// Like `run`, but `accept` may reject a payload, which fails that attempt
    pub async fn run_validated<T, F>(
        &self,
        kind: ServiceKind,
        request: &GenerationRequest,
        accept: F,
    ) -> Option<GenerationResult<T>>
    where
        F: Fn(Payload) -> Result<T, String>,
    {
        let sequence = self.attempt_sequence(request.role);
        if sequence.is_empty() {
            warn!("No fully configured model for role {}", request.role);
            return None;
        }

        for attempt in &sequence {
            let Some((backend, params)) = self.prepare(attempt, request) else {
                continue;
            };

            debug!(
                "{} via {} ({}, {} backend) as {}",
                kind,
                attempt.provider,
                attempt.model_id,
                backend.name(),
                attempt.role
            );

            let backend_ref: &dyn ModelBackend = backend.as_ref();
            let params_ref = &params;
            let outcome = call_with_retry(&self.policy, &self.cancel, move || async move {
                match kind {
                    ServiceKind::GenerateText => backend_ref.generate_text(params_ref).await,
                    ServiceKind::GenerateObject => backend_ref.generate_object(params_ref).await,
                    ServiceKind::StreamText => backend_ref.stream_text(params_ref).await,
                }
            })
            .await;

            let response = match outcome {
                Ok(response) => response,
                Err(RetryError::Cancelled { attempts }) => {
                    info!(
                        "Generation cancelled during {} attempt {}",
                        attempt.role, attempts
                    );
                    return None;
                }
                Err(e) => {
                    warn!(
                        "{} attempt with {}/{} failed: {}",
                        attempt.role, attempt.provider, attempt.model_id, e
                    );
                    continue;
                }
            };

            let output = match accept(response.payload) {
                Ok(output) => output,
                Err(reason) => {
                    warn!(
                        "{} attempt with {}/{} returned an unusable payload: {}",
                        attempt.role, attempt.provider, attempt.model_id, reason
                    );
                    continue;
                }
            };

            let telemetry = UsageTelemetry::build(
                &self.config,
                &request.command_name,
                &attempt.provider,
                &attempt.model_id,
                response.usage,
            );
            self.record_usage(request.output_channel, &telemetry);

            info!(
                "{} succeeded with {}/{} ({} tokens)",
                kind,
                attempt.provider,
                attempt.model_id,
                response.usage.total()
            );

            return Some(GenerationResult {
                output,
                usage: response.usage,
                provider: attempt.provider.clone(),
                model_id: attempt.model_id.clone(),
                role: attempt.role,
                telemetry,
            });
        }

        warn!(
            "All {} attempt(s) for role {} failed or were skipped",
            sequence.len(),
            request.role
        );
        None
    }

    /// Resolve backend and call parameters; `None` means skip this attempt
    fn prepare(
        &self,
        attempt: &AttemptSpec,
        request: &GenerationRequest,
    ) -> Option<(Arc<dyn ModelBackend>, BackendParams)> {
        let Some(settings) = self.backends.settings(&attempt.provider) else {
            warn!(
                "Unknown provider '{}' for role {}, skipping",
                attempt.provider, attempt.role
            );
            return None;
        };

        if !self.backends.is_credentialed(&attempt.provider) {
            warn!(
                "Provider '{}' has no API key (set {}), skipping {} attempt",
                attempt.provider,
                settings.api_key_env.as_deref().unwrap_or("an API key"),
                attempt.role
            );
            return None;
        }

        let backend = self.backends.backend(&attempt.provider)?;

        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.trim().is_empty() {
            messages.push(Message::system(request.system_prompt.clone()));
        }
        messages.push(Message::user(request.prompt.clone()));

        let role_model = self.config.role_model(attempt.role);
        let params = BackendParams {
            model_id: attempt.model_id.clone(),
            messages,
            max_tokens: role_model.max_tokens,
            temperature: role_model.temperature,
            base_url: attempt.base_url.clone().or(settings.base_url),
            api_key: self.backends.api_key(&attempt.provider),
            schema: request.schema.clone(),
            object_name: request.object_name.clone(),
        };

        Some((backend, params))
    }

    fn record_usage(&self, channel: OutputChannel, telemetry: &UsageTelemetry) {
        if channel != OutputChannel::Cli || !self.config.telemetry.enabled {
            return;
        }
        if let Some(queue) = &self.telemetry {
            queue.emit(telemetry.clone());
        }
    }
}
