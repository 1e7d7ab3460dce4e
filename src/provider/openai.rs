//! Chat-completions client for OpenAI-compatible HTTP APIs
//! (OpenAI, OpenRouter, Perplexity, xAI, Groq, Ollama).

use super::{BackendParams, BackendResponse, ModelBackend, Payload, TokenUsage};
use crate::error::ProviderError;
use crate::parser::extract_json;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub struct OpenAiCompatBackend {
    client: reqwest::Client,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl OpenAiCompatBackend {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client, timeout }
    }

    async fn chat(
        &self,
        params: &BackendParams,
        body: Value,
    ) -> Result<(String, TokenUsage), ProviderError> {
        let base_url = params.base_url.as_deref().ok_or_else(|| {
            ProviderError::InvalidResponse(format!(
                "no base URL configured for {}",
                params.model_id
            ))
        })?;
        let url = format!("{}/chat/completions", base_url.trim_end_matches('/'));

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &params.api_key {
            request = request.bearer_auth(key);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: text.chars().take(500).collect(),
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, self.timeout))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse("empty choices".to_string()))?;
        let usage = parsed.usage.unwrap_or_default();

        Ok((
            content,
            TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        ))
    }
}

fn request_body(params: &BackendParams) -> Value {
    let mut body = json!({
        "model": params.model_id,
        "messages": params.messages,
    });
    if let Some(max_tokens) = params.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    if let Some(temperature) = params.temperature {
        body["temperature"] = json!(temperature);
    }
    body
}

#[async_trait]
impl ModelBackend for OpenAiCompatBackend {
    fn name(&self) -> &'static str {
        "openai_compat"
    }

    async fn generate_text(&self, params: &BackendParams) -> Result<BackendResponse, ProviderError> {
        let (text, usage) = self.chat(params, request_body(params)).await?;
        Ok(BackendResponse {
            payload: Payload::Text(text),
            usage,
        })
    }

    async fn generate_object(
        &self,
        params: &BackendParams,
    ) -> Result<BackendResponse, ProviderError> {
        let mut body = request_body(params);
        body["response_format"] = match &params.schema {
            Some(schema) => json!({
                "type": "json_schema",
                "json_schema": {
                    "name": params.object_name.as_deref().unwrap_or("response"),
                    "schema": schema,
                },
            }),
            None => json!({ "type": "json_object" }),
        };

        let (text, usage) = self.chat(params, body).await?;
        let object = extract_json(&text).ok_or_else(|| {
            ProviderError::InvalidResponse("structured output was not valid JSON".to_string())
        })?;
        Ok(BackendResponse {
            payload: Payload::Object(object),
            usage,
        })
    }
}
