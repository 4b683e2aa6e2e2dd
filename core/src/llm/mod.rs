pub mod auditor;

pub use auditor::PromptAuditor;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// One turn of an OpenAI-compatible chat exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// The remote JSON oracle. Implementations return the assistant's text
/// content; callers parse it. Tests substitute a scripted implementation.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(
        &self,
        agent_name: &str,
        task_id: &str,
        messages: &[ChatMessage],
        json_reply: bool,
    ) -> Result<String>;
}

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint. Every
/// exchange is mirrored to the prompt auditor.
pub struct OpenAiChatClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    auditor: Arc<PromptAuditor>,
}

impl OpenAiChatClient {
    pub fn new(
        api_base: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        auditor: Arc<PromptAuditor>,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .expect("failed to build LLM http client");
        Self {
            http,
            api_base: api_base.into(),
            api_key: api_key.into(),
            model: model.into(),
            auditor,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    fn request_body(&self, messages: &[ChatMessage], json_reply: bool) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if json_reply {
            body["response_format"] = json!({"type": "json_object"});
        }
        body
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: String,
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn chat(
        &self,
        agent_name: &str,
        task_id: &str,
        messages: &[ChatMessage],
        json_reply: bool,
    ) -> Result<String> {
        debug!("LLM call | agent: {} | task: {}", agent_name, task_id);
        let reply: ChatCompletionReply = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&self.request_body(messages, json_reply))
            .send()
            .await
            .context("LLM request failed")?
            .error_for_status()
            .context("LLM endpoint returned an error status")?
            .json()
            .await
            .context("LLM reply was not valid JSON")?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .context("LLM reply contained no choices")?;

        let prompt_dump = serde_json::to_string(messages).unwrap_or_default();
        self.auditor.record(agent_name, task_id, &prompt_dump, &content);

        Ok(content)
    }
}
