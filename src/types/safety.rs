//! Safety verdict types

use std::fmt;

use serde::{Deserialize, Serialize};

/// Outcome of a safety screen.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub allowed: bool,
    /// Category labels that matched, in match order, without duplicates.
    #[serde(default)]
    pub flags: Vec<String>,
}

impl SafetyVerdict {
    /// Content passed the screen.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            flags: Vec::new(),
        }
    }

    /// Content was rejected for the given categories.
    pub fn block<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: false,
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }
}

/// Where in the pipeline a screen ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SafetyStage {
    /// Before dispatch, on the request input.
    Pre,
    /// After dispatch, on the model output.
    Post,
}

impl SafetyStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SafetyStage::Pre => "pre",
            SafetyStage::Post => "post",
        }
    }
}

impl fmt::Display for SafetyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
