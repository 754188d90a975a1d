//! Provider call implementations
//!
//! `HttpProviderCaller` executes real HTTP requests through a small closed
//! set of wire adapters registered per provider at construction time. The
//! engine never sees any of this; it hands over a config and a payload and
//! gets back a classified outcome.

use std::collections::HashMap;
use std::time::Instant;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;

use crate::traits::{CallPayload, ProviderCaller};
use shared::{CallFailure, CallSuccess, ProviderConfig, ProviderId};

/// Wire-format adapter for one provider family: builds the request and
/// extracts content/tokens from the response body
trait WireAdapter: Send + Sync {
    fn build_request(
        &self,
        client: &Client,
        api_key: &str,
        config: &ProviderConfig,
        prompt: &str,
    ) -> RequestBuilder;

    fn parse_response(&self, body: &Value) -> Result<(String, u32), CallFailure>;
}

/// OpenAI chat-completions wire format, shared by every provider exposing
/// an OpenAI-compatible endpoint
struct OpenAiCompatAdapter {
    endpoint: &'static str,
}

impl WireAdapter for OpenAiCompatAdapter {
    fn build_request(
        &self,
        client: &Client,
        api_key: &str,
        config: &ProviderConfig,
        prompt: &str,
    ) -> RequestBuilder {
        let body = serde_json::json!({
            "model": config.model_id,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": 512,
            "temperature": 0.2
        });
        client
            .post(self.endpoint)
            .header("Authorization", format!("Bearer {api_key}"))
            .header("Content-Type", "application/json")
            .json(&body)
    }

    fn parse_response(&self, body: &Value) -> Result<(String, u32), CallFailure> {
        let content = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .ok_or_else(|| CallFailure::InvalidResponse {
                message: "no content in response".to_string(),
            })?;
        let tokens = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(|tokens| tokens.as_u64())
            .unwrap_or(0) as u32;
        Ok((content.to_string(), tokens))
    }
}

/// Anthropic messages wire format
struct AnthropicAdapter;

impl WireAdapter for AnthropicAdapter {
    fn build_request(
        &self,
        client: &Client,
        api_key: &str,
        config: &ProviderConfig,
        prompt: &str,
    ) -> RequestBuilder {
        let body = serde_json::json!({
            "model": config.model_id,
            "max_tokens": 512,
            "messages": [{"role": "user", "content": prompt}]
        });
        client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", api_key)
            .header("Content-Type", "application/json")
            .header("anthropic-version", "2023-06-01")
            .json(&body)
    }

    fn parse_response(&self, body: &Value) -> Result<(String, u32), CallFailure> {
        let content = body
            .get("content")
            .and_then(|content| content.get(0))
            .and_then(|item| item.get("text"))
            .and_then(|text| text.as_str())
            .ok_or_else(|| CallFailure::InvalidResponse {
                message: "no content in response".to_string(),
            })?;
        let usage = body.get("usage");
        let input = usage
            .and_then(|u| u.get("input_tokens"))
            .and_then(|t| t.as_u64())
            .unwrap_or(0);
        let output = usage
            .and_then(|u| u.get("output_tokens"))
            .and_then(|t| t.as_u64())
            .unwrap_or(0);
        Ok((content.to_string(), (input + output) as u32))
    }
}

/// HTTP-backed caller with one adapter per provider, selected once at
/// construction rather than by inspecting model-name strings per call
pub struct HttpProviderCaller {
    client: Client,
    api_keys: HashMap<ProviderId, String>,
    adapters: HashMap<ProviderId, Box<dyn WireAdapter>>,
}

impl HttpProviderCaller {
    pub fn new(api_keys: HashMap<ProviderId, String>) -> Self {
        let mut adapters: HashMap<ProviderId, Box<dyn WireAdapter>> = HashMap::new();
        adapters.insert(
            ProviderId::OpenAI,
            Box::new(OpenAiCompatAdapter {
                endpoint: "https://api.openai.com/v1/chat/completions",
            }),
        );
        adapters.insert(ProviderId::Anthropic, Box::new(AnthropicAdapter));
        adapters.insert(
            ProviderId::Groq,
            Box::new(OpenAiCompatAdapter {
                endpoint: "https://api.groq.com/openai/v1/chat/completions",
            }),
        );
        adapters.insert(
            ProviderId::Together,
            Box::new(OpenAiCompatAdapter {
                endpoint: "https://api.together.xyz/v1/chat/completions",
            }),
        );

        Self {
            client: Client::new(),
            api_keys,
            adapters,
        }
    }

    fn classify_status(status: StatusCode, retry_after: Option<u64>) -> CallFailure {
        match status.as_u16() {
            401 | 403 => CallFailure::AuthenticationFailed,
            429 => CallFailure::RateLimited { retry_after_secs: retry_after },
            _ => CallFailure::Server { status: status.to_string() },
        }
    }
}

#[async_trait::async_trait]
impl ProviderCaller for HttpProviderCaller {
    async fn call(
        &self,
        config: ProviderConfig,
        payload: CallPayload,
    ) -> Result<CallSuccess, CallFailure> {
        let adapter = self
            .adapters
            .get(&config.provider_id)
            .ok_or_else(|| CallFailure::InvalidResponse {
                message: format!("no adapter registered for {}", config.provider_id),
            })?;
        let api_key = self
            .api_keys
            .get(&config.provider_id)
            .ok_or(CallFailure::AuthenticationFailed)?;

        let prompt = format!("[{}] Analyze subject: {}", payload.prompt_id, payload.subject);
        let request = adapter
            .build_request(&self.client, api_key, &config, &prompt)
            .timeout(config.call_timeout);

        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) if err.is_timeout() => return Err(CallFailure::Timeout),
            Err(err) => return Err(CallFailure::Network { message: err.to_string() }),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse::<u64>().ok());
            return Err(Self::classify_status(response.status(), retry_after));
        }

        let body: Value = response.json().await.map_err(|err| CallFailure::InvalidResponse {
            message: format!("failed to parse response: {err}"),
        })?;
        let (content, tokens) = adapter.parse_response(&body)?;

        debug!(
            "📡 {} answered {} in {}ms ({} tokens)",
            config.provider_id, payload.subject, latency_ms, tokens
        );
        Ok(CallSuccess { content, tokens, latency_ms })
    }
}

/// Deterministic in-process caller for the synthetic provider: succeeds
/// without network I/O, with metadata derived from the payload
pub struct SyntheticCaller;

#[async_trait::async_trait]
impl ProviderCaller for SyntheticCaller {
    async fn call(
        &self,
        config: ProviderConfig,
        payload: CallPayload,
    ) -> Result<CallSuccess, CallFailure> {
        let content = format!(
            "synthetic analysis of {} via {} ({})",
            payload.subject, config.model_id, payload.prompt_id
        );
        Ok(CallSuccess {
            tokens: (payload.subject.len() + payload.prompt_id.len()) as u32,
            latency_ms: 1,
            content,
        })
    }
}
