//! Language-model access: the [`ChatModel`] seam, an OpenAI-compatible
//! implementation, and the [`StageRunner`] that turns one prompt pair into
//! one raw completion.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use repoviz_shared::{OpenAiConfig, ReasoningEffort, RepoVizError, Result, resolve_api_key};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("RepoViz/", env!("CARGO_PKG_VERSION"));

/// Longest slice of an error body echoed into an error message.
const ERROR_BODY_PREVIEW: usize = 300;

// ---------------------------------------------------------------------------
// Request / trait
// ---------------------------------------------------------------------------

/// One system/user exchange with its tuning knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// Reasoning effort for reasoning-capable models; omitted when `None`.
    pub effort: Option<ReasoningEffort>,
    pub max_output_tokens: u32,
    /// Sampling temperature; omitted when `None`.
    pub temperature: Option<f32>,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a single exchange. `Ok(None)` means the provider answered without text.
    async fn complete(&self, request: &ChatRequest) -> Result<Option<String>>;

    /// Identifier of the underlying model, for logging.
    fn model_id(&self) -> &str;
}

// ---------------------------------------------------------------------------
// OpenAI-compatible backend
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct WireRequest<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    max_completion_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning_effort: Option<ReasoningEffort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Client for any `/chat/completions` endpoint speaking the OpenAI schema.
#[derive(Clone)]
pub struct OpenAiChatModel {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiChatModel {
    /// Build a client from explicit settings.
    pub fn new(config: &OpenAiConfig, api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RepoVizError::config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            model: config.model.clone(),
        })
    }

    /// Build a client, reading the API key from the configured env var.
    pub fn from_config(config: &OpenAiConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        Self::new(config, api_key)
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    #[instrument(skip_all, fields(model = %self.model, max_tokens = request.max_output_tokens))]
    async fn complete(&self, request: &ChatRequest) -> Result<Option<String>> {
        let body = WireRequest {
            model: &self.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: &request.user_prompt,
                },
            ],
            max_completion_tokens: request.max_output_tokens,
            reasoning_effort: request.effort,
            temperature: request.temperature,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RepoVizError::upstream(format!("model request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let preview: String = text.chars().take(ERROR_BODY_PREVIEW).collect();
            return Err(RepoVizError::upstream(format!(
                "model API returned HTTP {status}: {preview}"
            )));
        }

        let parsed: WireResponse = response
            .json()
            .await
            .map_err(|e| RepoVizError::upstream(format!("invalid model response: {e}")))?;

        if let Some(usage) = &parsed.usage {
            debug!(
                tokens_in = usage.prompt_tokens,
                tokens_out = usage.completion_tokens,
                latency_ms = started.elapsed().as_millis() as u64,
                "model call complete"
            );
        }

        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ---------------------------------------------------------------------------
// StageRunner
// ---------------------------------------------------------------------------

/// Runs exactly one model call per invocation; no history, no retries.
#[derive(Clone)]
pub struct StageRunner {
    model: Arc<dyn ChatModel>,
}

impl StageRunner {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Run one exchange with the given effort and output budget.
    pub async fn run(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        effort: Option<ReasoningEffort>,
        max_output_tokens: u32,
    ) -> Result<String> {
        self.run_request(&ChatRequest {
            system_prompt: system_prompt.to_string(),
            user_prompt: user_prompt.to_string(),
            effort,
            max_output_tokens,
            temperature: None,
        })
        .await
    }

    /// Run a fully specified request. Fails when the model returns no text.
    pub async fn run_request(&self, request: &ChatRequest) -> Result<String> {
        match self.model.complete(request).await? {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(RepoVizError::upstream(format!(
                "no content returned from {}",
                self.model.model_id()
            ))),
        }
    }
}
