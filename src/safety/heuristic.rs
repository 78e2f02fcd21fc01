//! Regex-based safety heuristics.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use super::SafetyPolicy;
use crate::types::{Request, SafetyStage, SafetyVerdict};
use crate::{HeimdallError, Result};

/// Built-in input rules: (category, pattern).
const INPUT_RULES: &[(&str, &str)] = &[
    ("self-harm", r"\bself[-\s]?harm"),
    ("self-harm", r"\bsuicid"),
    ("self-harm", r"\bkill\s+(?:myself|yourself)\b"),
    ("hate", r"\bhate\s+(?:speech|crimes?)\b"),
    ("hate", r"\bgenocide\b"),
    ("hate", r"\bracial\s+slurs?\b"),
    ("violence", r"\b(?:build|make)\s+(?:a\s+)?bomb\b"),
    ("violence", r"\b(?:murder|shoot|stab)\s+(?:him|her|them|someone|people)\b"),
    ("pii-solicitation", r"\bsocial\s+security\s+numbers?\b"),
    ("pii-solicitation", r"\bcredit\s+card\s+(?:numbers?|details)\b"),
    ("pii-solicitation", r"\bbank\s+(?:account|routing)\s+numbers?\b"),
];

/// Built-in output rules: (category, pattern).
const OUTPUT_RULES: &[(&str, &str)] = &[
    ("unsafe-markup", r"<\s*script\b"),
    ("unsafe-markup", r"javascript\s*:"),
    ("unsafe-markup", r"\bon(?:error|load|click|mouseover)\s*="),
    ("unsafe-markup", r"<\s*iframe\b"),
];

/// A compiled pattern that flags `category` at one stage.
#[derive(Debug, Clone)]
pub struct SafetyRule {
    category: String,
    stage: SafetyStage,
    pattern: Regex,
}

impl SafetyRule {
    /// Compile a case-insensitive rule.
    pub fn new(category: impl Into<String>, stage: SafetyStage, pattern: &str) -> Result<Self> {
        let category = category.into();
        let pattern = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| HeimdallError::Configuration(format!("safety rule '{category}': {e}")))?;
        Ok(Self {
            category,
            stage,
            pattern,
        })
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn stage(&self) -> SafetyStage {
        self.stage
    }
}

/// Keyword and pattern screen.
///
/// Input categories: `self-harm`, `hate`, `violence`, `pii-solicitation`.
/// Output category: `unsafe-markup` (script tags, `javascript:` URLs, inline
/// event handlers, iframes).
///
/// ```rust
/// # use heimdall::safety::HeuristicPolicy;
/// # use heimdall::SafetyStage;
/// let policy = HeuristicPolicy::new();
/// let verdict = policy.screen(SafetyStage::Post, "<script>alert(1)</script>");
/// assert!(!verdict.allowed);
/// assert_eq!(verdict.flags, vec!["unsafe-markup"]);
/// ```
#[derive(Debug, Clone)]
pub struct HeuristicPolicy {
    rules: Vec<SafetyRule>,
}

impl HeuristicPolicy {
    /// Policy with the built-in rules.
    pub fn new() -> Self {
        let builtin = INPUT_RULES
            .iter()
            .map(|(category, pattern)| (SafetyStage::Pre, category, pattern))
            .chain(
                OUTPUT_RULES
                    .iter()
                    .map(|(category, pattern)| (SafetyStage::Post, category, pattern)),
            );
        let rules = builtin
            .map(|(stage, category, pattern)| {
                SafetyRule::new(*category, stage, pattern).expect("built-in safety rules compile")
            })
            .collect();
        Self { rules }
    }

    /// Policy with no rules at all; add your own with [`with_rule`](Self::with_rule).
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Add a custom rule.
    pub fn with_rule(
        mut self,
        category: impl Into<String>,
        stage: SafetyStage,
        pattern: &str,
    ) -> Result<Self> {
        self.rules.push(SafetyRule::new(category, stage, pattern)?);
        Ok(self)
    }

    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    /// Run the rules for `stage` against `text`.
    ///
    /// Flags come back in rule order without duplicates.
    pub fn screen(&self, stage: SafetyStage, text: &str) -> SafetyVerdict {
        let mut flags: Vec<String> = Vec::new();
        for rule in self.rules.iter().filter(|rule| rule.stage == stage) {
            if !flags.iter().any(|f| f == &rule.category) && rule.pattern.is_match(text) {
                flags.push(rule.category.clone());
            }
        }
        if flags.is_empty() {
            SafetyVerdict::allow()
        } else {
            debug!(%stage, ?flags, "heuristic safety rule matched");
            SafetyVerdict::block(flags)
        }
    }
}

impl Default for HeuristicPolicy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SafetyPolicy for HeuristicPolicy {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn pre_check(&self, request: &Request) -> SafetyVerdict {
        match request.screened_text() {
            Some(text) => self.screen(SafetyStage::Pre, text),
            None => SafetyVerdict::allow(),
        }
    }

    async fn post_check(&self, output: &str) -> SafetyVerdict {
        self.screen(SafetyStage::Post, output)
    }
}
