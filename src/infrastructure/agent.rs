use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use tracing::{debug, instrument};

use crate::domain::{ports::AgentExecutor, AgentSpec, DomainError};
use crate::infrastructure::config::LlmConfig;
use crate::infrastructure::llm::{with_client, LlmClient};
use crate::infrastructure::tools::{RigToolAdapter, ToolRegistry};

/// Runs crew agents on a `rig` provider, giving each agent the registry
/// tools it lists.
pub struct CrewAgent {
    client: LlmClient,
    model: String,
    temperature: f64,
    max_tokens: u64,
    timeout: Duration,
    tools: Arc<ToolRegistry>,
}

impl CrewAgent {
    pub fn new(client: LlmClient, config: &LlmConfig, tools: Arc<ToolRegistry>) -> Self {
        Self {
            client,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_seconds),
            tools,
        }
    }
}

#[async_trait]
impl AgentExecutor for CrewAgent {
    #[instrument(skip(self, prompt), fields(agent = %agent.name, tools = agent.tools.len()))]
    async fn execute(&self, agent: &AgentSpec, prompt: &str) -> Result<String, DomainError> {
        let tools = self.tools.resolve(&agent.tools)?;
        let preamble = agent.preamble();
        debug!(model = %self.model, "running agent");

        with_client!(&self.client, client => {
            let builder = client
                .agent(&self.model)
                .preamble(&preamble)
                .temperature(self.temperature)
                .max_tokens(self.max_tokens);

            let rig_agent = match tools.split_first() {
                None => builder.build(),
                Some((first, rest)) => {
                    let mut builder = builder.tool(RigToolAdapter::new(first.clone()));
                    for tool in rest {
                        builder = builder.tool(RigToolAdapter::new(tool.clone()));
                    }
                    builder.build()
                }
            };

            tokio::time::timeout(
                self.timeout,
                rig_agent.prompt(prompt).multi_turn(agent.max_iterations),
            )
            .await
            .map_err(|_| DomainError::timeout(format!("Agent '{}' timed out", agent.name)))?
            .map_err(|e| DomainError::external(format!("Agent failed: {e}")))
        })
    }
}
