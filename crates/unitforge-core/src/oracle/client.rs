//! OpenAI-compatible chat-completions oracle.
//!
//! Posts `{model, messages: [system, user]}` to `<endpoint>/chat/completions`
//! with a bearer token and returns the content of the first choice verbatim.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CodeTransformOracle, OracleError, OracleRequest};
use crate::config::OracleConfig;

/// Chat message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Chat completion request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponseChoice {
    message: ChatResponseMessage,
}

/// Chat completion response body (only the fields we read).
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatResponseChoice>,
}

impl ChatResponse {
    /// Content of the first choice.
    pub fn into_content(self) -> Result<String, OracleError> {
        self.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(OracleError::EmptyResponse)
    }
}

/// HTTP client for a chat-completions endpoint.
#[derive(Debug, Clone)]
pub struct HttpOracle {
    url: String,
    model: String,
    token: Option<String>,
    client: reqwest::Client,
}

impl HttpOracle {
    /// Create a client for `endpoint` (the `/chat/completions` suffix is
    /// appended).
    pub fn new(
        endpoint: &str,
        model: impl Into<String>,
        token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, OracleError> {
        if endpoint.trim().is_empty() {
            return Err(OracleError::NotConfigured("endpoint is empty".to_string()));
        }
        let mut builder = reqwest::Client::builder().user_agent(concat!(
            "unitforge/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            url: chat_completions_url(endpoint),
            model: model.into(),
            token,
            client: builder.build()?,
        })
    }

    /// Build a client from the `[oracle]` config section.
    pub fn from_config(config: &OracleConfig) -> Result<Self, OracleError> {
        let endpoint = config
            .endpoint
            .as_deref()
            .ok_or_else(|| OracleError::NotConfigured("no oracle endpoint set".to_string()))?;
        let timeout = (config.request_timeout_secs > 0)
            .then(|| Duration::from_secs(config.request_timeout_secs));
        Self::new(endpoint, config.model.clone(), config.token.clone(), timeout)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn chat_request(&self, request: &OracleRequest) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: Role::System,
                    content: request.system.clone(),
                },
                ChatMessage {
                    role: Role::User,
                    content: request.user.clone(),
                },
            ],
        }
    }
}

#[async_trait]
impl CodeTransformOracle for HttpOracle {
    async fn transform(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let body = self.chat_request(request);
        let mut call = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            call = call.bearer_auth(token);
        }

        debug!(url = %self.url, model = %self.model, prompt_len = request.user.len(), "oracle request");
        let resp = call.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(OracleError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let response: ChatResponse = resp.json().await?;
        response.into_content()
    }
}

fn chat_completions_url(endpoint: &str) -> String {
    let base = endpoint.trim().trim_end_matches('/');
    if base.ends_with("/chat/completions") {
        base.to_string()
    } else {
        format!("{base}/chat/completions")
    }
}
