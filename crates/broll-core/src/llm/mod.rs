pub mod gemini;
pub mod openai;

pub use gemini::GeminiClassifier;
pub use openai::OpenAIClassifier;

use async_trait::async_trait;
use broll_common::config::{LLMConfig, LLMProvider};
use broll_common::ClassifierError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::sync::Arc;
use std::time::Duration;

pub fn create_classifier(config: &LLMConfig) -> Option<Arc<dyn TagClassifier>> {
    let api_key = config.active_key()?;
    match config.provider {
        LLMProvider::Gemini => Some(Arc::new(GeminiClassifier::with_base_url(
            api_key,
            config.model.clone(),
            config.base_url.clone().unwrap_or_else(|| gemini::DEFAULT_BASE_URL.to_string()),
            config.request_timeout(),
        ))),
        LLMProvider::OpenAI => Some(Arc::new(OpenAIClassifier::new(
            api_key,
            config.model.clone(),
            config.base_url.clone(),
            config.request_timeout(),
        ))),
    }
}

/// Raw answer of one classification call.
///
/// `structured` is filled when the service hands back arguments through a
/// function/tool call instead of free text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifierReply {
    pub text: Option<String>,
    pub structured: Option<serde_json::Value>,
}

impl ClassifierReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), structured: None }
    }

    pub fn structured(value: serde_json::Value) -> Self {
        Self { text: None, structured: Some(value) }
    }
}

#[async_trait]
pub trait TagClassifier: Send + Sync {
    /// One round trip, no retries. Errors are already classified.
    async fn classify(&self, prompt: &str) -> Result<ClassifierReply, ClassifierError>;
}

/// Connection failures and timeouts are worth retrying; anything else
/// reqwest reports (bad URL, builder misuse) is not.
pub(crate) fn classify_transport_error(err: reqwest::Error) -> ClassifierError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ClassifierError::Server { status: 0, message: err.to_string() }
    } else if err.is_decode() {
        ClassifierError::Malformed(err.to_string())
    } else {
        ClassifierError::Fatal(err.to_string())
    }
}

/// Only the delta-seconds form of Retry-After is honoured.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

pub(crate) fn mask_key(api_key: &str) -> String {
    if api_key.chars().count() > 5 {
        format!("{}***", api_key.chars().take(5).collect::<String>())
    } else {
        "***".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_factory_requires_key() {
        let mut config = LLMConfig::default();
        assert!(create_classifier(&config).is_none());
        config.google_api_key = Some("key-123456".into());
        assert!(create_classifier(&config).is_some());
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("abcdefghij"), "abcde***");
        assert_eq!(mask_key("abc"), "***");
    }
}
