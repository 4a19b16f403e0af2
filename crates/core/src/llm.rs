//! Model invocation over an ordered chain of LLM backends.
//!
//! Each [`ModelSpec`] pairs an [`LlmProvider`] (how to reach and authenticate
//! against a chat-completions endpoint) with a model name and sampling
//! parameters. [`Invoker::invoke`] tries the specs in order, retrying each one
//! under its own [`RetryPolicy`], and returns the first usable answer.
//!
//! # Example
//!
//! ```rust,no_run
//! use precis_core::{InvokeConfig, Invoker, LlmProvider, ModelSpec};
//!
//! # async fn run() {
//! let spec = ModelSpec {
//!     name: "gpt4o_mini_openrouter".to_string(),
//!     provider: LlmProvider::OpenAiCompatible {
//!         url: "https://openrouter.ai/api/v1/chat/completions".to_string(),
//!         api_keys: vec!["sk-...".to_string()],
//!     },
//!     model: "openai/gpt-4o-mini".to_string(),
//!     temperature: 0.3,
//!     top_p: 0.9,
//! };
//! let invoker = Invoker::new(reqwest::Client::new(), InvokeConfig::default());
//! let answer = invoker.invoke(&[spec], "Summarise.", "<article>...</article>", None, None).await;
//! # }
//! ```

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::fetch::check_status;
use crate::retry::RetryPolicy;
use crate::tools::{self, ToolCall};
use crate::{PrecisError, Result};

pub const DEFAULT_AZURE_API_VERSION: &str = "2024-05-01-preview";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// How a backend is addressed and authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    /// Bearer-token endpoint. One key is picked at random per request.
    OpenAiCompatible { url: String, api_keys: Vec<String> },
    /// Azure OpenAI: `api-key` header, model as deployment name in the path.
    Azure { endpoint: String, api_key: String, api_version: String },
}

impl LlmProvider {
    pub fn kind(&self) -> &'static str {
        match self {
            LlmProvider::OpenAiCompatible { .. } => "openai_compatible",
            LlmProvider::Azure { .. } => "azure",
        }
    }

    /// Full request URL for `model`.
    pub fn url(&self, model: &str) -> String {
        match self {
            LlmProvider::OpenAiCompatible { url, .. } => url.clone(),
            LlmProvider::Azure { endpoint, api_version, .. } => format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                endpoint.trim_end_matches('/'),
                model,
                api_version
            ),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self {
            LlmProvider::OpenAiCompatible { api_keys, .. } => match api_keys.choose(&mut rand::thread_rng()) {
                Some(key) => request.bearer_auth(key),
                None => request,
            },
            LlmProvider::Azure { api_key, .. } => request.header("api-key", api_key),
        }
    }

    /// Azure takes the model from the URL, everyone else from the body.
    fn model_in_body(&self) -> bool {
        matches!(self, LlmProvider::OpenAiCompatible { .. })
    }
}

/// A backend plus the fixed model and sampling parameters used with it.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Name this spec is referred to by in configuration and logs.
    pub name: String,
    pub provider: LlmProvider,
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
}

/// A named chain of models with optional structured-output and tool specs.
#[derive(Debug, Clone, PartialEq)]
pub struct Assistant {
    pub name: String,
    pub models: Vec<ModelSpec>,
    pub response_format: Option<Value>,
    pub tools: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct InvokeConfig {
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Retry schedule applied to each model spec independently.
    pub retry: RetryPolicy,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self { timeout: 180, retry: RetryPolicy::default() }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    temperature: f64,
    top_p: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a Value>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

/// Turn a parsed response into an answer, or say why it is unusable.
fn answer_from(provider: &str, response: ChatResponse) -> Result<String> {
    let bad = |reason: &str| PrecisError::BadResponse { provider: provider.to_string(), reason: reason.to_string() };

    let message = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .ok_or_else(|| bad("missing choices[0].message"))?;

    match message.tool_calls {
        Some(calls) if !calls.is_empty() => tools::execute(&calls).ok_or_else(|| bad("no tool call succeeded")),
        _ => message
            .content
            .filter(|content| !content.is_empty())
            .ok_or_else(|| bad("empty content")),
    }
}

/// The model invocation chain.
#[derive(Debug, Clone)]
pub struct Invoker {
    client: Client,
    config: InvokeConfig,
}

impl Invoker {
    pub fn new(client: Client, config: InvokeConfig) -> Self {
        Self { client, config }
    }

    /// One attempt against `spec`.
    pub async fn complete(
        &self,
        spec: &ModelSpec,
        messages: &[Message],
        response_format: Option<&Value>,
        tools: Option<&Value>,
    ) -> Result<String> {
        let url = spec.provider.url(&spec.model);
        let body = ChatRequest {
            messages,
            model: spec.provider.model_in_body().then_some(spec.model.as_str()),
            temperature: spec.temperature,
            top_p: spec.top_p,
            response_format,
            tools,
        };

        debug!(model = %spec.name, url = %url, body = %serde_json::to_string(&body).unwrap_or_default(), "sending request");

        let request = self.client.post(&url).timeout(Duration::from_secs(self.config.timeout)).json(&body);
        let response = spec.provider.authorize(request).send().await.map_err(|e| {
            if e.is_timeout() { PrecisError::Timeout { timeout: self.config.timeout } } else { PrecisError::HttpError(e) }
        })?;
        let response = check_status(&spec.name, response)?;
        let raw = response.text().await?;

        debug!(model = %spec.name, response = %raw, "received response");

        answer_from(&spec.name, serde_json::from_str(&raw)?)
    }

    /// Ask each spec in `chain` in turn until one answers.
    ///
    /// The system + user conversation is built once and sent unchanged to
    /// every backend. Returns `None` when the whole chain is exhausted.
    pub async fn invoke(
        &self,
        chain: &[ModelSpec],
        system_message: &str,
        user_message: &str,
        response_format: Option<&Value>,
        tools: Option<&Value>,
    ) -> Option<String> {
        let conversation = [Message::system(system_message), Message::user(user_message)];

        for spec in chain {
            let messages = &conversation;
            let answer = self
                .config
                .retry
                .run(&spec.name, move |_| self.complete(spec, messages, response_format, tools))
                .await;

            if let Some(answer) = answer {
                info!(model = %spec.name, provider = spec.provider.kind(), "model answered");
                return Some(answer);
            }
        }

        warn!(models = chain.len(), "every model in the chain failed");
        None
    }

    /// Run `assistant`'s chain with its own response format and tools.
    pub async fn ask(&self, assistant: &Assistant, system_message: &str, user_message: &str) -> Option<String> {
        self.invoke(
            &assistant.models,
            system_message,
            user_message,
            assistant.response_format.as_ref(),
            assistant.tools.as_ref(),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> ChatResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_message_serialization() {
        let value = serde_json::to_value(Message::system("be brief")).unwrap();
        assert_eq!(value, json!({ "role": "system", "content": "be brief" }));
    }

    #[test]
    fn test_azure_url() {
        let provider = LlmProvider::Azure {
            endpoint: "https://example.openai.azure.com/".to_string(),
            api_key: "k".to_string(),
            api_version: DEFAULT_AZURE_API_VERSION.to_string(),
        };
        assert_eq!(
            provider.url("mini"),
            "https://example.openai.azure.com/openai/deployments/mini/chat/completions?api-version=2024-05-01-preview"
        );
        assert!(!provider.model_in_body());
    }

    #[test]
    fn test_request_omits_empty_options() {
        let messages = [Message::user("hi")];
        let body = ChatRequest {
            messages: &messages,
            model: Some("m"),
            temperature: 0.3,
            top_p: 0.9,
            response_format: None,
            tools: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("response_format").is_none());
        assert!(value.get("tools").is_none());
        assert_eq!(value["model"], "m");
    }

    #[test]
    fn test_answer_from_content() {
        let response = parse(json!({ "choices": [{ "message": { "role": "assistant", "content": "summary" } }] }));
        assert_eq!(answer_from("m", response).unwrap(), "summary");
    }

    #[test]
    fn test_answer_from_malformed() {
        assert!(answer_from("m", parse(json!({}))).is_err());
        assert!(answer_from("m", parse(json!({ "choices": [{}] }))).is_err());
        assert!(answer_from("m", parse(json!({ "choices": [{ "message": { "content": "" } }] }))).is_err());
    }

    #[test]
    fn test_answer_from_tool_calls() {
        let response = parse(json!({
            "choices": [{ "message": {
                "content": null,
                "tool_calls": [{ "id": "1", "type": "function",
                    "function": { "name": "purify", "arguments": "{\"text\": \"<i>x</i>\"}" } }]
            } }]
        }));
        let answer = answer_from("m", response).unwrap();
        assert!(answer.starts_with(tools::REPORT_HEADER));
    }

    #[test]
    fn test_failed_tool_calls_do_not_fall_back_to_content() {
        let response = parse(json!({
            "choices": [{ "message": {
                "content": "ignored",
                "tool_calls": [{ "function": { "name": "unknown", "arguments": "{}" } }]
            } }]
        }));
        assert!(answer_from("m", response).is_err());
    }

    #[test]
    fn test_invoke_config_default() {
        let config = InvokeConfig::default();
        assert_eq!(config.timeout, 180);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
