//! Post-generation output checks.
//!
//! A [`Guardrail`] is a pure predicate over generated text. Guardrails are
//! combined into a [`GuardrailSet`] by concatenation and evaluated in order;
//! the first failure decides the result.

mod validators;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use validators::{
    format_currency, BudgetCompliance, ContainsSections, ExecutiveSummaryLength, HasDataSources,
    HasMetrics, JsonFormat, RiskAssessment, TimelinePresent, WordCount,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum GuardrailResult {
    /// Carries the validated text unchanged.
    Pass(String),
    /// Carries the reason the text was rejected.
    Fail(String),
}

impl GuardrailResult {
    pub fn passed(&self) -> bool {
        matches!(self, Self::Pass(_))
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Pass(detail) | Self::Fail(detail) => detail,
        }
    }

    pub fn into_parts(self) -> (bool, String) {
        match self {
            Self::Pass(detail) => (true, detail),
            Self::Fail(detail) => (false, detail),
        }
    }
}

pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    fn validate(&self, text: &str) -> GuardrailResult;
}

#[derive(Clone, Default)]
pub struct GuardrailSet {
    guardrails: Vec<Arc<dyn Guardrail>>,
}

impl GuardrailSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guardrail: impl Guardrail + 'static) -> Self {
        self.guardrails.push(Arc::new(guardrail));
        self
    }

    pub fn extend(mut self, other: GuardrailSet) -> Self {
        self.guardrails.extend(other.guardrails);
        self
    }

    pub fn from_specs(specs: &[GuardrailSpec]) -> Self {
        specs
            .iter()
            .fold(Self::new(), |set, spec| set.extend(spec.build()))
    }

    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.guardrails.iter().map(|g| g.name()).collect()
    }

    pub fn validate(&self, text: &str) -> GuardrailResult {
        for guardrail in &self.guardrails {
            if let GuardrailResult::Fail(reason) = guardrail.validate(text) {
                return GuardrailResult::Fail(reason);
            }
        }
        GuardrailResult::Pass(text.to_string())
    }

    /// Word count 500-3000, data sources, metrics.
    pub fn standard_report() -> Self {
        Self::new()
            .with(WordCount::new(500, 3000))
            .with(HasDataSources)
            .with(HasMetrics)
    }

    /// Executive summary length, metrics, timeline.
    pub fn executive_brief() -> Self {
        Self::new()
            .with(ExecutiveSummaryLength::default())
            .with(HasMetrics)
            .with(TimelinePresent)
    }

    pub fn strategic_plan() -> Self {
        Self::new()
            .with(WordCount::new(1000, 5000))
            .with(ContainsSections::new(["executive summary", "objectives", "timeline"]))
            .with(HasMetrics)
            .with(TimelinePresent)
            .with(RiskAssessment)
    }

    pub fn financial_report() -> Self {
        Self::new()
            .with(HasMetrics)
            .with(HasDataSources)
            .with(TimelinePresent)
    }
}

impl std::fmt::Debug for GuardrailSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Declarative form of a guardrail, as written in task configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GuardrailSpec {
    WordCount { min: usize, max: usize },
    ContainsSections { sections: Vec<String> },
    HasDataSources,
    HasMetrics,
    ExecutiveSummaryLength,
    JsonFormat,
    BudgetCompliance { max_budget: f64 },
    TimelinePresent,
    RiskAssessment,
    Preset { name: GuardrailPreset },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailPreset {
    StandardReport,
    ExecutiveBrief,
    StrategicPlan,
    FinancialReport,
}

impl GuardrailSpec {
    pub fn build(&self) -> GuardrailSet {
        let set = GuardrailSet::new();
        match self {
            Self::WordCount { min, max } => set.with(WordCount::new(*min, *max)),
            Self::ContainsSections { sections } => set.with(ContainsSections::new(sections)),
            Self::HasDataSources => set.with(HasDataSources),
            Self::HasMetrics => set.with(HasMetrics),
            Self::ExecutiveSummaryLength => set.with(ExecutiveSummaryLength::default()),
            Self::JsonFormat => set.with(JsonFormat),
            Self::BudgetCompliance { max_budget } => set.with(BudgetCompliance::new(*max_budget)),
            Self::TimelinePresent => set.with(TimelinePresent),
            Self::RiskAssessment => set.with(RiskAssessment),
            Self::Preset { name } => match name {
                GuardrailPreset::StandardReport => GuardrailSet::standard_report(),
                GuardrailPreset::ExecutiveBrief => GuardrailSet::executive_brief(),
                GuardrailPreset::StrategicPlan => GuardrailSet::strategic_plan(),
                GuardrailPreset::FinancialReport => GuardrailSet::financial_report(),
            },
        }
    }

    /// Rejects specs that could never pass.
    pub fn check(&self) -> Result<(), String> {
        match self {
            Self::WordCount { min, max } if min > max => {
                Err(format!("word_count min ({min}) is greater than max ({max})"))
            }
            Self::ContainsSections { sections } if sections.is_empty() => {
                Err("contains_sections needs at least one section".to_string())
            }
            Self::BudgetCompliance { max_budget } if !max_budget.is_finite() || *max_budget < 0.0 => {
                Err(format!("budget_compliance max_budget must be a non-negative number, got {max_budget}"))
            }
            _ => Ok(()),
        }
    }
}
