use async_trait::async_trait;
use broll_common::ClassifierError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use super::{classify_transport_error, mask_key, retry_after, ClassifierReply, TagClassifier};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClassifier {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl GeminiClassifier {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, DEFAULT_BASE_URL.to_string(), Duration::from_secs(60))
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String, timeout: Duration) -> Self {
        let api_key = api_key.trim().to_string();
        tracing::debug!(
            "GeminiClassifier initialized: api_key={}, model={}, base_url={}",
            mask_key(&api_key),
            model,
            base_url
        );
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }
}

// ============== Generate API Structures ==============

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: FunctionCall,
    },
    Other(serde_json::Value),
}

#[derive(Serialize, Deserialize)]
struct FunctionCall {
    #[serde(default)]
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Deserialize)]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[async_trait]
impl TagClassifier for GeminiClassifier {
    async fn classify(&self, prompt: &str) -> Result<ClassifierReply, ClassifierError> {
        if self.api_key.is_empty() {
            return Err(ClassifierError::Fatal("Gemini API key is empty".into()));
        }

        let clean_model = self.model.trim_start_matches("models/");
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            clean_model
        );

        let request = GenerateRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::Text { text: prompt.to_string() }],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json",
                temperature: 0.2,
            },
        };

        tracing::debug!("Gemini classify request to: {}", url);

        let response = self.client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = response.status();
        let wait = retry_after(response.headers());
        let body = response.text().await.map_err(classify_transport_error)?;

        if !status.is_success() {
            tracing::warn!("Gemini API failed: status={}", status);
            return Err(ClassifierError::from_status(status.as_u16(), wait, body));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| ClassifierError::Malformed(format!("Failed to parse Gemini response: {} - body: {}", e, body)))?;

        if let Some(err) = parsed.error {
            return Err(ClassifierError::Server { status: status.as_u16(), message: err.message });
        }

        let parts = parsed.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .unwrap_or_default();

        let mut reply = ClassifierReply::default();
        for part in parts {
            match part {
                Part::FunctionCall { function_call } if reply.structured.is_none() => {
                    tracing::debug!("Gemini answered through function call {}", function_call.name);
                    reply.structured = Some(function_call.args);
                }
                Part::Text { text } => {
                    reply.text.get_or_insert_with(String::new).push_str(&text);
                }
                _ => {}
            }
        }

        if reply.text.is_none() && reply.structured.is_none() {
            return Err(ClassifierError::Malformed("No content in Gemini response".into()));
        }
        Ok(reply)
    }
}

#[cfg(test)]
#[path = "gemini_tests.rs"]
mod tests;
