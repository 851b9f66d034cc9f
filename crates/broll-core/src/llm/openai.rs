use async_trait::async_trait;
use broll_common::ClassifierError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use super::{classify_transport_error, mask_key, retry_after, ClassifierReply, TagClassifier};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolCall {
    function: ToolFunction,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolFunction {
    #[serde(default)]
    name: String,
    /// JSON encoded as a string, as the chat API sends it
    arguments: String,
}

pub struct OpenAIClassifier {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAIClassifier {
    pub fn new(api_key: String, model: String, base_url: Option<String>, timeout: Duration) -> Self {
        let actual_base_url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        tracing::debug!(
            "OpenAIClassifier initialized: api_key={}, model={}, base_url={}",
            mask_key(&api_key),
            model,
            actual_base_url
        );

        Self {
            client,
            api_key,
            base_url: actual_base_url,
            model,
        }
    }
}

#[async_trait]
impl TagClassifier for OpenAIClassifier {
    async fn classify(&self, prompt: &str) -> Result<ClassifierReply, ClassifierError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let req = ChatRequest {
            model: self.model.clone(),
            messages: vec![Message { role: "user".to_string(), content: prompt.to_string() }],
            temperature: 0.1,
            response_format: Some(json!({ "type": "json_object" })),
        };

        let res = self.client.post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&req)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = res.status();
        let wait = retry_after(res.headers());
        let body = res.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            tracing::warn!("OpenAI API failed: status={}", status);
            return Err(ClassifierError::from_status(status.as_u16(), wait, body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Malformed(format!("Failed to parse OpenAI response: {} - body: {}", e, body)))?;

        let message = parsed.choices.into_iter().next()
            .map(|c| c.message)
            .ok_or_else(|| ClassifierError::Malformed("No choices in OpenAI response".into()))?;

        // Arguments that do not parse are left to the reply parser: the
        // content is used if present, otherwise the raw argument string.
        let mut text = message.content;
        let mut structured = None;
        if let Some(call) = message.tool_calls.into_iter().next() {
            tracing::debug!("OpenAI answered through tool call {}", call.function.name);
            match serde_json::from_str::<serde_json::Value>(&call.function.arguments) {
                Ok(value) => structured = Some(value),
                Err(e) => {
                    tracing::debug!("Tool call arguments are not valid JSON: {}", e);
                    if text.as_deref().map_or(true, |t| t.trim().is_empty()) {
                        text = Some(call.function.arguments);
                    }
                }
            }
        }

        let reply = ClassifierReply { text, structured };
        if reply.text.is_none() && reply.structured.is_none() {
            return Err(ClassifierError::Malformed("No content in OpenAI response".into()));
        }
        Ok(reply)
    }
}

#[cfg(test)]
#[path = "openai_tests.rs"]
mod openai_tests;
