//! Language model abstraction and implementations.
//!
//! The agent loop only needs one thing from a model: given the whole
//! conversation, return the text of exactly one step object.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ModelConfig;
use crate::error::{Result, StepwiseError};
use crate::message::Message;

/// Output constraint passed along with every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// The reply must be a single JSON object.
    JsonObject,
}

impl ResponseFormat {
    fn to_openai(self) -> Value {
        match self {
            ResponseFormat::JsonObject => json!({ "type": "json_object" }),
        }
    }
}

/// Minimal abstraction around a chat completion provider.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete_chat(&self, messages: &[Message], format: ResponseFormat) -> Result<String>;
}

#[async_trait]
impl<M: LanguageModel + ?Sized> LanguageModel for Arc<M> {
    async fn complete_chat(&self, messages: &[Message], format: ResponseFormat) -> Result<String> {
        (**self).complete_chat(messages, format).await
    }
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> StepwiseError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return StepwiseError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    StepwiseError::LanguageModel(format!("{provider} request failed with {}: {body}", status))
}

#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
    organization: Option<String>,
}

impl OpenAIClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            StepwiseError::LanguageModel("missing OpenAI API key in model config".into())
        })?;
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
        Ok(Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .map_err(|err| StepwiseError::LanguageModel(format!("http client error: {err}")))?,
            model: cfg.model.clone(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            organization: cfg.organization.clone(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn complete_chat(&self, messages: &[Message], format: ResponseFormat) -> Result<String> {
        let payload = json!({
            "model": self.model,
            "messages": messages,
            "response_format": format.to_openai(),
        });

        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            );
        if let Some(org) = &self.organization {
            builder = builder.header("OpenAI-Organization", org);
        }
        let resp = builder
            .json(&payload)
            .send()
            .await
            .map_err(|err| StepwiseError::LanguageModel(format!("OpenAI request error: {err}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "openai"));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            StepwiseError::LanguageModel(format!("OpenAI response parse error: {err}"))
        })?;

        let first = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| StepwiseError::LanguageModel("OpenAI returned no choices".into()))?;

        first
            .message
            .content
            .ok_or_else(|| StepwiseError::LanguageModel("OpenAI returned an empty message".into()))
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// A deterministic model used for tests and demos. Replies are handed out in
/// order and every request is recorded.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<Vec<Message>>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Every message sequence the model has been asked to complete, in order.
    pub fn requests(&self) -> Vec<Vec<Message>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn complete_chat(&self, messages: &[Message], _format: ResponseFormat) -> Result<String> {
        self.requests
            .lock()
            .map_err(|_| StepwiseError::LanguageModel("stub model poisoned".into()))?
            .push(messages.to_vec());

        let mut locked = self
            .responses
            .lock()
            .map_err(|_| StepwiseError::LanguageModel("stub model poisoned".into()))?;
        locked.pop_front().ok_or_else(|| {
            StepwiseError::LanguageModel("StubModel ran out of scripted responses".into())
        })
    }
}

/// Build the model named by `cfg.provider`.
pub fn build_model(cfg: &ModelConfig, scripted: Vec<String>) -> Result<Arc<dyn LanguageModel>> {
    match cfg.provider.to_ascii_lowercase().as_str() {
        "openai" => Ok(Arc::new(OpenAIClient::from_config(cfg)?)),
        "stub" => Ok(StubModel::new(scripted)),
        other => Err(StepwiseError::Config(format!(
            "unknown model provider `{other}`"
        ))),
    }
}
