//! Environment-based provider registry
//!
//! Providers become active when their API key is present. Keys are loaded
//! from:
//! 1. `.env` file in the current directory or parent directories (if present)
//! 2. System environment variables
//!
//! Environment variables take precedence over .env file values. The
//! synthetic provider needs no key and is only activated explicitly.

use std::collections::HashMap;
use std::time::Duration;

use tracing::info;

use crate::error::OrchestratorResult;
use crate::traits::ProviderRegistry;
use shared::{ProviderConfig, ProviderId};

/// Environment variable carrying each provider's API key
const PROVIDER_KEY_VARS: &[(ProviderId, &str)] = &[
    (ProviderId::OpenAI, "OPENAI_API_KEY"),
    (ProviderId::Anthropic, "ANTHROPIC_API_KEY"),
    (ProviderId::Groq, "GROQ_API_KEY"),
    (ProviderId::Together, "TOGETHER_API_KEY"),
];

/// Registry backed by process environment: a provider is active when its
/// key variable is set
pub struct EnvProviderRegistry {
    include_synthetic: bool,
}

impl EnvProviderRegistry {
    pub fn new() -> Self {
        Self { include_synthetic: false }
    }

    /// Also activate the keyless synthetic provider alongside any real ones
    pub fn with_synthetic(mut self) -> Self {
        self.include_synthetic = true;
        self
    }

    /// Read the key map for the caller service. Only providers with a
    /// non-empty key appear.
    pub fn api_keys() -> HashMap<ProviderId, String> {
        let _ = dotenv::dotenv();
        PROVIDER_KEY_VARS
            .iter()
            .filter_map(|(provider, var)| {
                std::env::var(var)
                    .ok()
                    .filter(|value| !value.is_empty())
                    .map(|value| (*provider, value))
            })
            .collect()
    }

    /// Baseline rate-limit and retry configuration per provider. Tuned to
    /// published free/low-tier limits; overridable by constructing configs
    /// directly.
    pub fn default_config(provider: ProviderId) -> ProviderConfig {
        let (model_id, model_family, rpm, rph, concurrency, priority) = match provider {
            ProviderId::OpenAI => ("gpt-4o-mini", "gpt", 60, 3000, 8, 8),
            ProviderId::Anthropic => ("claude-3-5-haiku-latest", "claude", 50, 2500, 6, 7),
            ProviderId::Groq => ("llama-3.1-8b-instant", "llama", 30, 1500, 4, 6),
            ProviderId::Together => ("meta-llama/Llama-3-8b-chat-hf", "llama", 60, 3000, 4, 5),
            ProviderId::Synthetic => ("synthetic-1", "synthetic", 1000, 100_000, 16, 3),
        };
        ProviderConfig {
            provider_id: provider,
            model_id: model_id.to_string(),
            model_family: model_family.to_string(),
            requests_per_minute: rpm,
            requests_per_hour: rph,
            max_concurrency: concurrency,
            base_retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_retries: 3,
            priority,
            call_timeout: Duration::from_secs(30),
        }
    }
}

impl Default for EnvProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProviderRegistry for EnvProviderRegistry {
    async fn list_active_providers(&self) -> OrchestratorResult<Vec<ProviderConfig>> {
        let keys = Self::api_keys();
        let mut active: Vec<ProviderConfig> = keys
            .keys()
            .map(|provider| Self::default_config(*provider))
            .collect();

        if self.include_synthetic {
            active.push(Self::default_config(ProviderId::Synthetic));
        }
        active.sort_by_key(|config| std::cmp::Reverse(config.priority));

        info!(
            "🔑 {} active providers: {}",
            active.len(),
            active
                .iter()
                .map(|c| c.provider_id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(active)
    }
}

/// Fixed registry for tests and for deployments that configure providers
/// from a file rather than the environment
pub struct StaticProviderRegistry {
    providers: Vec<ProviderConfig>,
}

impl StaticProviderRegistry {
    pub fn new(providers: Vec<ProviderConfig>) -> Self {
        Self { providers }
    }

    /// Synthetic-only fleet, the dry-run and local-development default
    pub fn synthetic_only() -> Self {
        Self::new(vec![EnvProviderRegistry::default_config(ProviderId::Synthetic)])
    }
}

#[async_trait::async_trait]
impl ProviderRegistry for StaticProviderRegistry {
    async fn list_active_providers(&self) -> OrchestratorResult<Vec<ProviderConfig>> {
        Ok(self.providers.clone())
    }
}
