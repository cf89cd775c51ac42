use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;

use super::{with_client, LlmClient};
use crate::domain::{ports::LlmService, DomainError};
use crate::infrastructure::config::LlmConfig;

/// Single-shot completions through a `rig` provider.
pub struct RigLlm {
    client: LlmClient,
    model: String,
    temperature: f64,
    max_tokens: u64,
    timeout: Duration,
}

impl RigLlm {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        let defaults = LlmConfig::default();
        Self {
            client,
            model: model.into(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            timeout: Duration::from_secs(defaults.timeout_seconds),
        }
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, DomainError> {
        Ok(Self::new(LlmClient::from_env(config.provider)?, &config.model)
            .with_temperature(config.temperature)
            .with_max_tokens(config.max_tokens)
            .with_timeout(Duration::from_secs(config.timeout_seconds)))
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl LlmService for RigLlm {
    async fn complete(&self, prompt: &str) -> Result<String, DomainError> {
        self.complete_with_system("", prompt).await
    }

    async fn complete_with_system(
        &self,
        system: &str,
        prompt: &str,
    ) -> Result<String, DomainError> {
        with_client!(&self.client, client => {
            let agent = client
                .agent(&self.model)
                .preamble(system)
                .temperature(self.temperature)
                .max_tokens(self.max_tokens)
                .build();

            tokio::time::timeout(self.timeout, agent.prompt(prompt))
                .await
                .map_err(|_| DomainError::timeout("LLM completion timed out"))?
                .map_err(|e| DomainError::external(e.to_string()))
        })
    }
}
