use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, Result};
use crate::domain::guardrails::GuardrailSpec;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder regex"));

/// A named group of agents and the tasks they run, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrewSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub process: Process,
    pub agents: Vec<AgentSpec>,
    pub tasks: Vec<TaskSpec>,
    /// Present when other crews may hand work to this one as a tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegation: Option<Delegation>,
}

impl CrewSpec {
    /// Name of the tool through which other crews delegate to this one.
    pub fn delegation_tool(&self) -> Option<String> {
        self.delegation.as_ref().map(|_| format!("{}_crew", self.name))
    }

    /// Every input the crew's tasks reference, sorted.
    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().flat_map(|t| t.placeholders()).collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn agent(&self, name: &str) -> Option<&AgentSpec> {
        self.agents.iter().find(|a| a.name == name)
    }

    pub fn task(&self, name: &str) -> Option<&TaskSpec> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// How a delegated request becomes crew inputs: the request fills
/// `request_input` and `defaults` fill the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Delegation {
    pub description: String,
    pub request_input: String,
    #[serde(default)]
    pub defaults: BTreeMap<String, String>,
}

impl Delegation {
    pub fn inputs(&self, request: &str, context: Option<&str>) -> HashMap<String, String> {
        let mut inputs: HashMap<String, String> = self
            .defaults
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let request = match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("{}\n\nContext: {context}", request.trim()),
            None => request.trim().to_string(),
        };
        inputs.insert(self.request_input.clone(), request);
        inputs
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Process {
    #[default]
    Sequential,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSpec {
    pub name: String,
    pub role: String,
    pub goal: String,
    pub backstory: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    5
}

impl AgentSpec {
    pub fn preamble(&self) -> String {
        format!(
            "You are {}.\n\nYour goal: {}\n\nBackground: {}",
            self.role.trim(),
            self.goal.trim(),
            self.backstory.trim()
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub agent: String,
    /// Names of earlier tasks whose output is handed to this one.
    #[serde(default)]
    pub context: Vec<String>,
    #[serde(default)]
    pub async_execution: bool,
    #[serde(default)]
    pub guardrails: Vec<GuardrailSpec>,
}

impl TaskSpec {
    /// Substitutes `{name}` placeholders in the description and expected
    /// output. A placeholder without a matching input is an error.
    pub fn render(&self, inputs: &HashMap<String, String>) -> Result<(String, String)> {
        Ok((
            render_template(&self.description, inputs)?,
            render_template(&self.expected_output, inputs)?,
        ))
    }

    pub fn placeholders(&self) -> Vec<String> {
        let mut names: Vec<String> = [&self.description, &self.expected_output]
            .into_iter()
            .flat_map(|t| PLACEHOLDER.captures_iter(t).map(|c| c[1].to_string()))
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

fn render_template(template: &str, inputs: &HashMap<String, String>) -> Result<String> {
    let missing: Vec<&str> = PLACEHOLDER
        .captures_iter(template)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .filter(|name| !inputs.contains_key(*name))
        .collect();

    if !missing.is_empty() {
        return Err(DomainError::validation(format!(
            "missing task inputs: {}",
            missing.join(", ")
        )));
    }

    Ok(PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures<'_>| {
            inputs.get(&caps[1]).cloned().unwrap_or_default()
        })
        .into_owned())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub task: String,
    pub agent: String,
    pub output: String,
    pub attempts: usize,
    pub passed: bool,
    pub failure: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrewRunReport {
    pub crew: String,
    pub outcomes: Vec<TaskOutcome>,
    pub completed: bool,
}

impl CrewRunReport {
    pub fn final_output(&self) -> Option<&str> {
        self.outcomes.last().map(|o| o.output.as_str())
    }
}
