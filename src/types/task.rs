//! Task enumeration

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::model::ModelKind;
use crate::HeimdallError;

/// The category of model operation a feature service asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Task {
    /// Extract structured fields from free text (CVs, job posts).
    Parse,
    /// Free-form text generation.
    Generate,
    /// Score how well two documents fit each other.
    Match,
    /// Draft a cover letter.
    CoverLetter,
    /// Suggest keywords or phrasing.
    Suggest,
    /// Produce embedding vectors.
    Embed,
    /// Screen content against a moderation model.
    Moderate,
}

impl Task {
    /// Every task, in declaration order.
    pub const ALL: [Task; 7] = [
        Task::Parse,
        Task::Generate,
        Task::Match,
        Task::CoverLetter,
        Task::Suggest,
        Task::Embed,
        Task::Moderate,
    ];

    /// Wire name, as used in config files and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Task::Parse => "parse",
            Task::Generate => "generate",
            Task::Match => "match",
            Task::CoverLetter => "coverLetter",
            Task::Suggest => "suggest",
            Task::Embed => "embed",
            Task::Moderate => "moderate",
        }
    }

    /// Kind of model that serves this task.
    pub fn model_kind(&self) -> ModelKind {
        match self {
            Task::Embed => ModelKind::Embed,
            Task::Moderate => ModelKind::Moderate,
            _ => ModelKind::Chat,
        }
    }

    /// Whether the model is expected to answer with a JSON document.
    pub fn expects_json(&self) -> bool {
        matches!(self, Task::Parse | Task::Match | Task::Suggest)
    }

    /// Whether responses for this task may be served from the cache.
    ///
    /// Moderation verdicts are always computed fresh.
    pub fn is_cacheable(&self) -> bool {
        !matches!(self, Task::Moderate)
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Task {
    type Err = HeimdallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Task::ALL
            .into_iter()
            .find(|task| task.as_str().eq_ignore_ascii_case(s) || snake(task) == s)
            .ok_or_else(|| HeimdallError::InvalidInput(format!("unknown task '{s}'")))
    }
}

/// `cover_letter` is accepted alongside `coverLetter`.
fn snake(task: &Task) -> &'static str {
    match task {
        Task::CoverLetter => "cover_letter",
        other => other.as_str(),
    }
}
