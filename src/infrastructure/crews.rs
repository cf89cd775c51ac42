use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{CrewSpec, DomainError};

/// Crew definitions loaded from YAML and checked against each other and the
/// tool registry before anything runs.
#[derive(Debug, Default, Clone)]
pub struct CrewCatalog {
    crews: BTreeMap<String, Arc<CrewSpec>>,
}

impl CrewCatalog {
    /// Loads every `*.yaml` / `*.yml` file in `dir`. A missing directory gives
    /// an empty catalog.
    pub fn load_dir(dir: &Path, known_tools: &[&str]) -> Result<Self, DomainError> {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "crew directory not found, no crews loaded");
            return Ok(Self::default());
        }

        let mut paths: Vec<_> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .is_some_and(|ext| ext == "yaml" || ext == "yml")
            })
            .collect();
        paths.sort();

        let mut specs = Vec::with_capacity(paths.len());
        for path in &paths {
            let raw = std::fs::read_to_string(path)?;
            let spec: CrewSpec = serde_yaml::from_str(&raw)
                .map_err(|e| DomainError::config(format!("{}: {e}", path.display())))?;
            specs.push(spec);
        }

        let catalog = Self::from_specs(specs, known_tools)?;
        info!(crews = ?catalog.names(), "loaded crews");
        Ok(catalog)
    }

    /// Crews with a `delegation` section add a `{name}_crew` tool that the
    /// other crews may list. A delegable crew may not use delegation tools
    /// itself, which keeps delegation one level deep.
    pub fn from_specs(specs: Vec<CrewSpec>, known_tools: &[&str]) -> Result<Self, DomainError> {
        let delegation_tools: Vec<String> =
            specs.iter().filter_map(CrewSpec::delegation_tool).collect();
        let mut tools: Vec<&str> = known_tools.to_vec();
        tools.extend(delegation_tools.iter().map(String::as_str));

        let mut crews = BTreeMap::new();
        for spec in specs {
            validate_crew(&spec, &tools)?;
            if spec.delegation.is_some() {
                if let Some(tool) = spec
                    .agents
                    .iter()
                    .flat_map(|a| a.tools.iter())
                    .find(|t| delegation_tools.contains(*t))
                {
                    return Err(DomainError::config(format!(
                        "crew '{}' accepts delegation and cannot delegate through '{tool}'",
                        spec.name
                    )));
                }
            }
            let name = spec.name.clone();
            if crews.insert(name.clone(), Arc::new(spec)).is_some() {
                return Err(DomainError::config(format!("crew '{name}' is defined twice")));
            }
        }
        Ok(Self { crews })
    }

    /// Crews other crews may delegate to.
    pub fn delegable(&self) -> impl Iterator<Item = &Arc<CrewSpec>> {
        self.crews.values().filter(|spec| spec.delegation.is_some())
    }

    pub fn get(&self, name: &str) -> Option<Arc<CrewSpec>> {
        self.crews.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.crews.keys().map(String::as_str).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CrewSpec> {
        self.crews.values().map(|spec| spec.as_ref())
    }

    pub fn len(&self) -> usize {
        self.crews.len()
    }

    pub fn is_empty(&self) -> bool {
        self.crews.is_empty()
    }
}

pub fn validate_crew(spec: &CrewSpec, known_tools: &[&str]) -> Result<(), DomainError> {
    let fail = |msg: String| Err(DomainError::config(format!("crew '{}': {msg}", spec.name)));

    if spec.name.trim().is_empty() {
        return Err(DomainError::config("crew name must not be empty"));
    }
    if spec.agents.is_empty() {
        return fail("needs at least one agent".to_string());
    }
    if spec.tasks.is_empty() {
        return fail("needs at least one task".to_string());
    }

    let mut agents = HashSet::new();
    for agent in &spec.agents {
        if !agents.insert(agent.name.as_str()) {
            return fail(format!("agent '{}' is defined twice", agent.name));
        }
        if agent.max_iterations == 0 {
            return fail(format!("agent '{}' needs max_iterations above zero", agent.name));
        }
        if let Some(tool) = agent.tools.iter().find(|t| !known_tools.contains(&t.as_str())) {
            return fail(format!("agent '{}' uses unknown tool '{tool}'", agent.name));
        }
    }

    let mut earlier: HashSet<&str> = HashSet::new();
    for task in &spec.tasks {
        if earlier.contains(task.name.as_str()) {
            return fail(format!("task '{}' is defined twice", task.name));
        }
        if !agents.contains(task.agent.as_str()) {
            return fail(format!("task '{}' references unknown agent '{}'", task.name, task.agent));
        }
        if let Some(missing) = task.context.iter().find(|c| !earlier.contains(c.as_str())) {
            return fail(format!(
                "task '{}' takes context from '{missing}', which is not an earlier task",
                task.name
            ));
        }
        for guardrail in &task.guardrails {
            if let Err(reason) = guardrail.check() {
                return fail(format!("task '{}': {reason}", task.name));
            }
        }
        earlier.insert(task.name.as_str());
    }

    if let Some(delegation) = &spec.delegation {
        let placeholders = spec.placeholders();
        if !placeholders.contains(&delegation.request_input) {
            return fail(format!(
                "delegation request_input '{}' is not used by any task",
                delegation.request_input
            ));
        }
        let unfilled: Vec<String> = placeholders
            .into_iter()
            .filter(|p| *p != delegation.request_input && !delegation.defaults.contains_key(p))
            .collect();
        if !unfilled.is_empty() {
            return fail(format!("delegation leaves inputs unfilled: {}", unfilled.join(", ")));
        }
    }

    Ok(())
}
