use crate::domain::{errors::DomainError, AgentSpec};
use async_trait::async_trait;

/// Runs a single generation turn for an agent.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(&self, agent: &AgentSpec, prompt: &str) -> Result<String, DomainError>;
}
