use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, instrument, warn};

use crate::domain::{
    guardrails::{GuardrailResult, GuardrailSet},
    ports::AgentExecutor,
    AgentSpec, CrewRunReport, CrewSpec, DomainError, TaskOutcome, TaskSpec,
};

/// Runs one task through its agent and retries with the guardrail's feedback
/// until the output passes or the retry budget runs out.
pub struct TaskRunner {
    executor: Arc<dyn AgentExecutor>,
    max_retries: usize,
}

impl TaskRunner {
    pub fn new(executor: Arc<dyn AgentExecutor>, max_retries: usize) -> Self {
        Self {
            executor,
            max_retries,
        }
    }

    #[instrument(skip_all, fields(task = %task.name, agent = %agent.name))]
    pub async fn run(
        &self,
        agent: &AgentSpec,
        task: &TaskSpec,
        inputs: &HashMap<String, String>,
        context: &[(String, String)],
    ) -> Result<TaskOutcome, DomainError> {
        let (description, expected_output) = task.render(inputs)?;
        let prompt = build_prompt(&description, &expected_output, context);
        let guardrails = GuardrailSet::from_specs(&task.guardrails);

        let mut attempt_prompt = prompt.clone();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let output = self.executor.execute(agent, &attempt_prompt).await?;

            let reason = match guardrails.validate(&output) {
                GuardrailResult::Pass(_) => {
                    return Ok(TaskOutcome {
                        task: task.name.clone(),
                        agent: agent.name.clone(),
                        output,
                        attempts,
                        passed: true,
                        failure: None,
                    });
                }
                GuardrailResult::Fail(reason) => reason,
            };

            if attempts > self.max_retries {
                warn!(attempts, reason = %reason, "guardrail retries exhausted");
                return Ok(TaskOutcome {
                    task: task.name.clone(),
                    agent: agent.name.clone(),
                    output,
                    attempts,
                    passed: false,
                    failure: Some(reason),
                });
            }

            info!(attempt = attempts, reason = %reason, "output rejected, retrying");
            attempt_prompt = format!(
                "{prompt}\n\nYour previous answer was rejected: {reason}\n\
                 Revise your answer so that it satisfies this requirement."
            );
        }
    }
}

fn build_prompt(description: &str, expected_output: &str, context: &[(String, String)]) -> String {
    let mut prompt = format!(
        "{}\n\nExpected output: {}",
        description.trim(),
        expected_output.trim()
    );

    if !context.is_empty() {
        prompt.push_str("\n\nContext from earlier tasks:");
        for (name, output) in context {
            prompt.push_str(&format!("\n\n### {name}\n{}", output.trim()));
        }
    }

    prompt
}

/// Executes a crew's tasks in order, handing earlier outputs to the tasks
/// that name them as context.
pub struct CrewRunner {
    tasks: TaskRunner,
}

impl CrewRunner {
    pub fn new(tasks: TaskRunner) -> Self {
        Self { tasks }
    }

    /// Consecutive `async_execution` tasks that do not depend on each other
    /// run concurrently. The run stops at the first task whose output never
    /// passed its guardrails.
    #[instrument(skip_all, fields(crew = %crew.name))]
    pub async fn run(
        &self,
        crew: &CrewSpec,
        inputs: &HashMap<String, String>,
    ) -> Result<CrewRunReport, DomainError> {
        let mut outputs: HashMap<String, String> = HashMap::new();
        let mut outcomes = Vec::with_capacity(crew.tasks.len());

        for batch in batches(&crew.tasks) {
            let mut runs = Vec::with_capacity(batch.len());
            for task in &batch {
                let agent = crew.agent(&task.agent).ok_or_else(|| {
                    DomainError::not_found(format!(
                        "agent '{}' for task '{}'",
                        task.agent, task.name
                    ))
                })?;
                let context = task
                    .context
                    .iter()
                    .map(|name| {
                        outputs
                            .get(name)
                            .map(|output| (name.clone(), output.clone()))
                            .ok_or_else(|| {
                                DomainError::validation(format!(
                                    "task '{}' needs output of '{name}' which has not run",
                                    task.name
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;

                runs.push(async move { self.tasks.run(agent, task, inputs, &context).await });
            }

            for outcome in join_all(runs).await {
                let outcome = outcome?;
                let passed = outcome.passed;
                outputs.insert(outcome.task.clone(), outcome.output.clone());
                outcomes.push(outcome);

                if !passed {
                    warn!("stopping crew after failed task");
                    return Ok(CrewRunReport {
                        crew: crew.name.clone(),
                        outcomes,
                        completed: false,
                    });
                }
            }
        }

        info!(tasks = outcomes.len(), "crew run completed");
        Ok(CrewRunReport {
            crew: crew.name.clone(),
            outcomes,
            completed: true,
        })
    }
}

/// Groups tasks into execution batches. A synchronous task is a batch on its
/// own; async tasks join the open batch unless they depend on a member of it.
fn batches(tasks: &[TaskSpec]) -> Vec<Vec<&TaskSpec>> {
    let mut batches: Vec<Vec<&TaskSpec>> = Vec::new();
    let mut open_async = false;

    for task in tasks {
        let joins_open = task.async_execution
            && open_async
            && batches.last().is_some_and(|batch| {
                !batch
                    .iter()
                    .any(|member| task.context.contains(&member.name))
            });

        if joins_open {
            if let Some(batch) = batches.last_mut() {
                batch.push(task);
            }
        } else {
            batches.push(vec![task]);
        }
        open_async = task.async_execution;
    }

    batches
}
