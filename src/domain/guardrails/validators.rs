use std::sync::LazyLock;

use regex::Regex;

use super::{Guardrail, GuardrailResult};

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("guardrail pattern is a valid regex")
}

static BRACKETED: LazyLock<Regex> = LazyLock::new(|| pattern(r"\[.*?\]"));

static METRIC: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\d+\.?\d*%|\$\d+|\d{1,3}(?:,\d{3})*(?:\.\d+)?"));

static SUMMARY_HEADING: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?:#{1,6}\s*)?executive summary"));

static NEXT_HEADING: LazyLock<Regex> = LazyLock::new(|| pattern(r"\n#{1,6}\s"));

static CURRENCY: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\$(\d{1,3}(?:,\d{3})*(?:\.\d{2})?)"));

static TIMELINE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(concat!(
        r"q[1-4]\s+\d{4}",
        r"|january|february|march|april|may|june|july|august|september|october|november|december",
        r"|\d{1,2}/\d{1,2}/\d{2,4}",
        r"|(?:week|month|quarter|year)s?\s+\d+",
        r"|timeline:|deadline:",
        r"|by\s+\w+\s+\d+",
    ))
});

const CITATION_MARKERS: [&str; 5] = ["source:", "according to", "reference:", "http://", "https://"];

const RISK_KEYWORDS: [&str; 6] = [
    "risk",
    "threat",
    "challenge",
    "concern",
    "mitigation",
    "contingency",
];

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Bounds the number of whitespace-separated words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordCount {
    pub min: usize,
    pub max: usize,
}

impl WordCount {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }
}

impl Default for WordCount {
    fn default() -> Self {
        Self::new(100, 5000)
    }
}

impl Guardrail for WordCount {
    fn name(&self) -> &str {
        "word_count"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        let count = word_count(text);
        if count < self.min {
            return GuardrailResult::Fail(format!(
                "Content too short: {count} words. Minimum required: {}",
                self.min
            ));
        }
        if count > self.max {
            return GuardrailResult::Fail(format!(
                "Content too long: {count} words. Maximum allowed: {}",
                self.max
            ));
        }
        GuardrailResult::Pass(text.to_string())
    }
}

/// Requires each section to appear as a markdown heading (`## Timeline`) or a
/// label (`Timeline:`), ignoring case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsSections {
    sections: Vec<String>,
}

impl ContainsSections {
    pub fn new<I, S>(sections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            sections: sections.into_iter().map(|s| s.as_ref().to_string()).collect(),
        }
    }

    fn has_header(content: &str, section: &str) -> bool {
        if section.is_empty() {
            return false;
        }
        content.match_indices(section).any(|(pos, _)| {
            let heading = content[..pos].trim_end().ends_with('#');
            let label = content[pos + section.len()..].trim_start().starts_with(':');
            heading || label
        })
    }
}

impl Guardrail for ContainsSections {
    fn name(&self) -> &str {
        "contains_sections"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        let content = text.to_lowercase();
        let missing: Vec<&str> = self
            .sections
            .iter()
            .filter(|section| !Self::has_header(&content, &section.to_lowercase()))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            GuardrailResult::Pass(text.to_string())
        } else {
            GuardrailResult::Fail(format!("Missing required sections: {}", missing.join(", ")))
        }
    }
}

/// Requires a citation: a bracketed reference, a URL, or an attribution phrase.
#[derive(Debug, Clone, Copy, Default)]
pub struct HasDataSources;

impl Guardrail for HasDataSources {
    fn name(&self) -> &str {
        "has_data_sources"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        let content = text.to_lowercase();
        let cited = BRACKETED.is_match(&content)
            || CITATION_MARKERS.iter().any(|marker| content.contains(marker));

        if cited {
            GuardrailResult::Pass(text.to_string())
        } else {
            GuardrailResult::Fail("Output must include data sources, citations, or references".to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HasMetrics;

impl Guardrail for HasMetrics {
    fn name(&self) -> &str {
        "has_metrics"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        if METRIC.is_match(text) {
            GuardrailResult::Pass(text.to_string())
        } else {
            GuardrailResult::Fail(
                "Output must include quantitative metrics (numbers, percentages, or financial figures)"
                    .to_string(),
            )
        }
    }
}

/// Bounds the length of the executive summary section, which runs from its
/// heading to the next markdown heading or the end of the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutiveSummaryLength {
    pub min: usize,
    pub max: usize,
}

impl Default for ExecutiveSummaryLength {
    fn default() -> Self {
        Self { min: 100, max: 300 }
    }
}

impl ExecutiveSummaryLength {
    fn section(content: &str) -> Option<&str> {
        let heading = SUMMARY_HEADING.find(content)?;
        let end = NEXT_HEADING
            .find(&content[heading.end()..])
            .map(|next| heading.end() + next.start())
            .unwrap_or(content.len());
        Some(&content[heading.start()..end])
    }
}

impl Guardrail for ExecutiveSummaryLength {
    fn name(&self) -> &str {
        "executive_summary_length"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        let content = text.to_lowercase();
        let Some(summary) = Self::section(&content) else {
            return GuardrailResult::Fail("Must include an 'Executive Summary' section".to_string());
        };

        let count = word_count(summary);
        if count < self.min {
            return GuardrailResult::Fail(format!(
                "Executive summary too short: {count} words. Minimum {} words.",
                self.min
            ));
        }
        if count > self.max {
            return GuardrailResult::Fail(format!(
                "Executive summary too long: {count} words. Maximum {} words.",
                self.max
            ));
        }
        GuardrailResult::Pass(text.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl Guardrail for JsonFormat {
    fn name(&self) -> &str {
        "json_format"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(_) => GuardrailResult::Pass(text.to_string()),
            Err(e) => GuardrailResult::Fail(format!("Invalid JSON format: {e}")),
        }
    }
}

/// Caps the sum of all dollar amounts (`$1,250.00` style) in the text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetCompliance {
    pub max_budget: f64,
}

impl BudgetCompliance {
    pub fn new(max_budget: f64) -> Self {
        Self { max_budget }
    }

    pub fn amounts(text: &str) -> Vec<f64> {
        CURRENCY
            .captures_iter(text)
            .filter_map(|caps| caps[1].replace(',', "").parse::<f64>().ok())
            .collect()
    }
}

impl Guardrail for BudgetCompliance {
    fn name(&self) -> &str {
        "budget_compliance"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        let amounts = Self::amounts(text);
        if amounts.is_empty() {
            return GuardrailResult::Fail("Must include budget/cost estimates with dollar amounts".to_string());
        }

        let total: f64 = amounts.iter().sum();
        if total > self.max_budget {
            return GuardrailResult::Fail(format!(
                "Total budget {} exceeds maximum allowed {}",
                format_currency(total),
                format_currency(self.max_budget)
            ));
        }
        GuardrailResult::Pass(text.to_string())
    }
}

/// Formats an amount as `$1,234,567.89`.
pub fn format_currency(amount: f64) -> String {
    let formatted = format!("{:.2}", amount.abs());
    let (whole, cents) = formatted.split_once('.').unwrap_or((&formatted, "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if amount < 0.0 { "-" } else { "" };
    format!("{sign}${grouped}.{cents}")
}

/// Requires a date, quarter, month, relative period, or deadline marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimelinePresent;

impl Guardrail for TimelinePresent {
    fn name(&self) -> &str {
        "timeline_present"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        if TIMELINE.is_match(&text.to_lowercase()) {
            GuardrailResult::Pass(text.to_string())
        } else {
            GuardrailResult::Fail("Output must include timeline, deadlines, or time-based milestones".to_string())
        }
    }
}

/// Requires at least two distinct risk-related keywords.
#[derive(Debug, Clone, Copy, Default)]
pub struct RiskAssessment;

impl RiskAssessment {
    const MIN_KEYWORDS: usize = 2;

    pub fn keyword_hits(text: &str) -> usize {
        let content = text.to_lowercase();
        RISK_KEYWORDS.iter().filter(|k| content.contains(*k)).count()
    }
}

impl Guardrail for RiskAssessment {
    fn name(&self) -> &str {
        "risk_assessment"
    }

    fn validate(&self, text: &str) -> GuardrailResult {
        if Self::keyword_hits(text) < Self::MIN_KEYWORDS {
            GuardrailResult::Fail("Output must include risk assessment with mitigation strategies".to_string())
        } else {
            GuardrailResult::Pass(text.to_string())
        }
    }
}
