mod rig_llm;

use rig::client::ProviderClient;
use rig::providers::{anthropic, gemini, openai};

use crate::domain::DomainError;
use crate::infrastructure::config::LlmProvider;

pub use rig_llm::RigLlm;

/// A configured `rig` provider client.
#[derive(Clone)]
pub enum LlmClient {
    Gemini(gemini::Client),
    Anthropic(anthropic::Client),
    OpenAi(openai::Client),
}

impl LlmClient {
    /// Builds the client for `provider` from its API key variable, failing
    /// early when the key is absent.
    pub fn from_env(provider: LlmProvider) -> Result<Self, DomainError> {
        let key_var = provider.api_key_var();
        if std::env::var(key_var).map(|k| k.trim().is_empty()).unwrap_or(true) {
            return Err(DomainError::config(format!(
                "{key_var} must be set for the configured llm provider"
            )));
        }

        Ok(match provider {
            LlmProvider::Gemini => Self::Gemini(gemini::Client::from_env()),
            LlmProvider::Anthropic => Self::Anthropic(anthropic::Client::from_env()),
            LlmProvider::OpenAi => Self::OpenAi(openai::Client::from_env()),
        })
    }
}

/// Runs `$body` with `$client` bound to the concrete provider client, so the
/// same agent-building code works for every provider.
macro_rules! with_client {
    ($llm:expr, $client:ident => $body:expr) => {
        match $llm {
            $crate::infrastructure::llm::LlmClient::Gemini($client) => $body,
            $crate::infrastructure::llm::LlmClient::Anthropic($client) => $body,
            $crate::infrastructure::llm::LlmClient::OpenAi($client) => $body,
        }
    };
}

pub(crate) use with_client;
