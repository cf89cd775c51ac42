use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::application::CrewRunner;
use crate::domain::ports::{CrewTool, ToolRequest};
use crate::domain::CrewSpec;

/// Filled once the runner exists. The runner's agents hold the registry that
/// holds these tools, so the slot is set after both are built and keeps only
/// a weak reference.
pub type RunnerSlot = Arc<OnceLock<Weak<CrewRunner>>>;

/// Hands a request to another crew and answers with that crew's final output.
pub struct CrewDelegationTool {
    crew: Arc<CrewSpec>,
    name: String,
    description: String,
    runner: RunnerSlot,
}

impl CrewDelegationTool {
    /// `None` when the crew has no `delegation` section.
    pub fn new(crew: Arc<CrewSpec>, runner: RunnerSlot) -> Option<Self> {
        let name = crew.delegation_tool()?;
        let description = crew.delegation.as_ref()?.description.trim().to_string();
        Some(Self {
            crew,
            name,
            description,
            runner,
        })
    }

    fn error(&self, reason: impl std::fmt::Display) -> String {
        format!("Error running {} crew: {reason}", self.crew.name)
    }
}

#[async_trait]
impl CrewTool for CrewDelegationTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn execute(&self, request: &ToolRequest) -> String {
        let Some(runner) = self.runner.get().and_then(Weak::upgrade) else {
            return self.error("crew runner is not ready");
        };
        let Some(delegation) = &self.crew.delegation else {
            return self.error("crew does not accept delegation");
        };

        info!(crew = %self.crew.name, "delegating to crew");
        let inputs = delegation.inputs(&request.request, request.context.as_deref());
        match runner.run(&self.crew, &inputs).await {
            Ok(report) if report.completed => report.final_output().unwrap_or_default().to_string(),
            Ok(report) => {
                let last = report.outcomes.last();
                let reason = last
                    .and_then(|o| o.failure.as_deref())
                    .unwrap_or("crew run did not complete");
                warn!(crew = %self.crew.name, reason, "delegated crew stopped early");
                match last {
                    Some(o) => format!(
                        "{}\n\nPartial output from task '{}':\n{}",
                        self.error(reason),
                        o.task,
                        o.output
                    ),
                    None => self.error(reason),
                }
            }
            Err(e) => {
                warn!(crew = %self.crew.name, error = %e, "delegated crew failed");
                self.error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap, VecDeque};
    use std::sync::Mutex;

    use crate::application::TaskRunner;
    use crate::domain::guardrails::GuardrailSpec;
    use crate::domain::ports::AgentExecutor;
    use crate::domain::{AgentSpec, Delegation, DomainError, Process, TaskSpec};

    /// Replies from a script per agent and keeps the prompts it was given.
    #[derive(Default)]
    struct ScriptedExecutor {
        replies: Mutex<HashMap<String, VecDeque<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn reply(self, agent: &str, text: &str) -> Self {
            self.replies
                .lock()
                .unwrap()
                .entry(agent.to_string())
                .or_default()
                .push_back(text.to_string());
            self
        }
    }

    #[async_trait]
    impl AgentExecutor for ScriptedExecutor {
        async fn execute(&self, agent: &AgentSpec, prompt: &str) -> Result<String, DomainError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .get_mut(&agent.name)
                .and_then(|queue| queue.pop_front())
                .ok_or_else(|| DomainError::internal("script exhausted"))
        }
    }

    fn operations_crew(guardrails: Vec<GuardrailSpec>) -> Arc<CrewSpec> {
        Arc::new(CrewSpec {
            name: "operations".into(),
            description: String::new(),
            process: Process::Sequential,
            agents: vec![AgentSpec {
                name: "coo".into(),
                role: "Chief Operations Officer".into(),
                goal: "Run operations well".into(),
                backstory: "Scaled three logistics networks".into(),
                tools: vec![],
                max_iterations: 5,
            }],
            tasks: vec![TaskSpec {
                name: "operations_plan".into(),
                description: "Improve {focus_area} in {quarter}".into(),
                expected_output: "A plan".into(),
                agent: "coo".into(),
                context: vec![],
                async_execution: false,
                guardrails,
            }],
            delegation: Some(Delegation {
                description: "Operations planning and process improvement".into(),
                request_input: "focus_area".into(),
                defaults: BTreeMap::from([("quarter".to_string(), "Q1 2026".to_string())]),
            }),
        })
    }

    struct Harness {
        tool: CrewDelegationTool,
        executor: Arc<ScriptedExecutor>,
        runner: Arc<CrewRunner>,
    }

    fn harness(crew: Arc<CrewSpec>, executor: ScriptedExecutor) -> Harness {
        let executor = Arc::new(executor);
        let slot = RunnerSlot::default();
        let runner = Arc::new(CrewRunner::new(TaskRunner::new(executor.clone(), 0)));
        assert!(slot.set(Arc::downgrade(&runner)).is_ok());
        Harness {
            tool: CrewDelegationTool::new(crew, slot).unwrap(),
            executor,
            runner,
        }
    }

    #[tokio::test]
    async fn test_returns_final_output_of_delegated_crew() {
        let Harness { tool, executor, runner: _runner } = harness(
            operations_crew(vec![]),
            ScriptedExecutor::default().reply("coo", "Cut picking time by 12%."),
        );

        let output = tool.execute(&ToolRequest::new("warehouse throughput")).await;

        assert_eq!(tool.name(), "operations_crew");
        assert_eq!(tool.description(), "Operations planning and process improvement");
        assert_eq!(output, "Cut picking time by 12%.");
        assert_eq!(
            executor.prompts.lock().unwrap()[0],
            "Improve warehouse throughput in Q1 2026\n\nExpected output: A plan"
        );
    }

    #[tokio::test]
    async fn test_failing_crew_degrades_to_text() {
        let h = harness(operations_crew(vec![]), ScriptedExecutor::default());

        let output = h.tool.execute(&ToolRequest::new("returns")).await;

        assert_eq!(output, "Error running operations crew: Internal error: script exhausted");
    }

    #[tokio::test]
    async fn test_guardrail_failure_reports_partial_output() {
        let h = harness(
            operations_crew(vec![GuardrailSpec::HasMetrics]),
            ScriptedExecutor::default().reply("coo", "Improve things soon."),
        );

        let output = h.tool.execute(&ToolRequest::new("returns")).await;

        assert!(output.starts_with("Error running operations crew: "), "{output}");
        assert!(output.ends_with("Partial output from task 'operations_plan':\nImprove things soon."), "{output}");
    }

    #[tokio::test]
    async fn test_unset_or_dropped_runner_is_reported() {
        let unset = CrewDelegationTool::new(operations_crew(vec![]), RunnerSlot::default()).unwrap();
        assert_eq!(
            unset.execute(&ToolRequest::new("returns")).await,
            "Error running operations crew: crew runner is not ready"
        );

        let Harness { tool, runner, .. } = harness(operations_crew(vec![]), ScriptedExecutor::default());
        drop(runner);
        assert_eq!(
            tool.execute(&ToolRequest::new("returns")).await,
            "Error running operations crew: crew runner is not ready"
        );
    }

    #[test]
    fn test_crew_without_delegation_has_no_tool() {
        let mut crew = (*operations_crew(vec![])).clone();
        crew.delegation = None;

        assert!(CrewDelegationTool::new(Arc::new(crew), RunnerSlot::default()).is_none());
    }
}
