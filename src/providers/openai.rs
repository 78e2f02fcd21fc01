//! OpenAI-compatible HTTP provider for chat, embeddings and moderation.
//!
//! Speaks the `/v1/chat/completions`, `/v1/embeddings` and `/v1/moderations`
//! endpoints, which most hosted and self-hosted inference servers mirror.
//! See: <https://platform.openai.com/docs/api-reference>

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::traits::{Payload, Provider, RawOutput};
use crate::types::{ModelKind, ModelRef};
use crate::{HeimdallError, Result};

/// Default base URL for the OpenAI API
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Client for OpenAI-compatible inference APIs.
///
/// The endpoint is picked from [`ModelRef::kind`]:
/// - `chat` → chat completions (text or JSON mode)
/// - `embed` → embeddings, one vector per input text
/// - `moderate` → moderation verdict
#[derive(Clone)]
pub struct OpenAiClient {
    name: String,
    api_key: String,
    http: Client,
    base_url: String,
}

impl OpenAiClient {
    /// Create a client for api.openai.com, registered as `openai`.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Create a client with a custom base URL (self-hosted servers, wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| HeimdallError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "openai".to_string(),
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Register the client under a different provider id.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    async fn chat(&self, model: &str, payload: &Payload) -> Result<RawOutput> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &payload.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        if let Some(prompt) = &payload.prompt {
            messages.push(ChatMessage {
                role: "user",
                content: prompt,
            });
        }
        if messages.is_empty() {
            return Err(HeimdallError::InvalidInput(
                "chat request needs a system prompt or a prompt".into(),
            ));
        }

        let body = ChatRequest {
            model,
            messages,
            temperature: payload.temperature,
            max_tokens: payload.max_tokens,
            stop: (!payload.stop.is_empty()).then_some(payload.stop.as_slice()),
            response_format: payload.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        };
        let result: ChatResponse = self.post("/v1/chat/completions", model, &body).await?;

        let text = result
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(HeimdallError::EmptyResponse)?;
        let mut output = RawOutput::text(text);
        if let Some(usage) = result.usage {
            output = output.with_usage(usage.prompt_tokens, usage.completion_tokens);
        }
        Ok(output)
    }

    async fn embed(&self, model: &str, payload: &Payload) -> Result<RawOutput> {
        if payload.texts.is_empty() {
            return Err(HeimdallError::InvalidInput("no texts to embed".into()));
        }

        let body = EmbedRequest {
            model,
            input: &payload.texts,
        };
        let result: EmbedResponse = self.post("/v1/embeddings", model, &body).await?;

        // The API may return data out of order; restore input order.
        let mut data = result.data;
        data.sort_by_key(|d| d.index);
        let vectors = data.into_iter().map(|d| d.embedding).collect();

        let mut output = RawOutput::embeddings(vectors);
        if let Some(usage) = result.usage {
            output = output.with_usage(usage.prompt_tokens, 0);
        }
        Ok(output)
    }

    async fn moderate(&self, model: &str, payload: &Payload) -> Result<RawOutput> {
        let input = payload
            .content
            .as_deref()
            .ok_or_else(|| HeimdallError::InvalidInput("no content to moderate".into()))?;

        let body = ModerationRequest { model, input };
        let result: ModerationResponse = self.post("/v1/moderations", model, &body).await?;

        let verdict = result
            .results
            .into_iter()
            .next()
            .ok_or(HeimdallError::EmptyResponse)?;
        let categories = verdict
            .categories
            .into_iter()
            .filter(|(_, flagged)| *flagged)
            .map(|(category, _)| category);
        Ok(RawOutput::moderation(verdict.flagged, categories))
    }

    async fn post<B, R>(&self, path: &str, model: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!(provider = %self.name, %url, model, "sending request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| HeimdallError::Http(e.to_string()))?;

        self.handle_response_errors(&response, model)?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| HeimdallError::Http(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| HeimdallError::MalformedResponse(e.to_string()))
    }

    /// Check response status and map to appropriate error.
    fn handle_response_errors(&self, response: &reqwest::Response, model: &str) -> Result<()> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        match status.as_u16() {
            401 | 403 => Err(HeimdallError::AuthenticationFailed),
            404 => Err(HeimdallError::ModelNotFound(model.to_string())),
            429 => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs);
                Err(HeimdallError::RateLimited { retry_after })
            }
            code => Err(HeimdallError::Api {
                status: code,
                message: format!("{} API error: {}", self.name, status),
            }),
        }
    }
}

#[async_trait]
impl Provider for OpenAiClient {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(
        &self,
        model: &ModelRef,
        payload: &Payload,
        cancel: &CancellationToken,
    ) -> Result<RawOutput> {
        let call = async {
            match model.kind {
                ModelKind::Chat => self.chat(&model.model, payload).await,
                ModelKind::Embed => self.embed(&model.model, payload).await,
                ModelKind::Moderate => self.moderate(&model.model, payload).await,
            }
        };
        tokio::select! {
            _ = cancel.cancelled() => Err(HeimdallError::Cancelled),
            result = call => result,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct EmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
}
