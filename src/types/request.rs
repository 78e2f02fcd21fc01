//! Gateway request type

use serde::{Deserialize, Serialize};

use super::task::Task;

/// A model-inference request from a feature service.
///
/// Built with chained setters; the gateway only ever borrows it.
///
/// ```rust
/// # use heimdall::{Request, Task};
/// let request = Request::new(Task::Generate)
///     .system("You are a concise assistant.")
///     .prompt("Say hello")
///     .temperature(0.2)
///     .max_tokens(64);
/// assert_eq!(request.screened_text(), Some("Say hello"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub task: Task,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Raw inputs for [`Task::Embed`].
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub texts: Vec<String>,
    /// Content for [`Task::Moderate`]; also what the safety pre-check screens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_to_check: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop: Vec<String>,
    /// Caller-chosen cache identity, replacing the content-derived one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
}

impl Request {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            system: None,
            prompt: None,
            texts: Vec::new(),
            content_to_check: None,
            temperature: None,
            max_tokens: None,
            stop: Vec::new(),
            cache_key: None,
        }
    }

    /// Shorthand for an embedding request over `texts`.
    pub fn embed<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Task::Embed).texts(texts)
    }

    /// Shorthand for a moderation request over `content`.
    pub fn moderate(content: impl Into<String>) -> Self {
        Self::new(Task::Moderate).content_to_check(content)
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn texts<I, S>(mut self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.texts = texts.into_iter().map(Into::into).collect();
        self
    }

    pub fn content_to_check(mut self, content: impl Into<String>) -> Self {
        self.content_to_check = Some(content.into());
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn stop(mut self, stop: Vec<String>) -> Self {
        self.stop = stop;
        self
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = Some(key.into());
        self
    }

    /// Text the safety pre-check looks at: `content_to_check`, else `prompt`.
    pub fn screened_text(&self) -> Option<&str> {
        self.content_to_check
            .as_deref()
            .or(self.prompt.as_deref())
    }
}
