use broll_common::config::{FallbackPolicy, TaggerConfig};
use broll_common::{ClassifierError, ScoredTag};
use std::sync::Arc;
use std::time::Duration;
use crate::llm::TagClassifier;
use crate::reply::{parse_reply, validate_tags};
use crate::vocabulary::TagVocabulary;

/// Result of tagging one script.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggingOutcome {
    /// Validated tags, best first. Not yet bounded.
    pub tags: Vec<ScoredTag>,
    /// True when every attempt failed and the configured fallback was used.
    pub fallback_used: bool,
    pub attempts: u32,
}

/// Asks the classifier which vocabulary tags describe a script.
///
/// Rate limits, server errors and malformed output are retried; once the
/// attempts run out the configured fallback is returned instead of an
/// error. Only `ClassifierError::Fatal` reaches the caller.
///
/// Holds no per-call state, so one tagger can serve concurrent scripts.
pub struct ScriptTagger {
    classifier: Arc<dyn TagClassifier>,
    config: TaggerConfig,
}

impl ScriptTagger {
    pub fn new(classifier: Arc<dyn TagClassifier>, config: TaggerConfig) -> Self {
        Self { classifier, config }
    }

    pub fn config(&self) -> &TaggerConfig {
        &self.config
    }

    pub async fn tag(&self, script: &str, vocabulary: &TagVocabulary) -> Result<TaggingOutcome, ClassifierError> {
        if script.trim().is_empty() {
            return Ok(TaggingOutcome { tags: Vec::new(), fallback_used: false, attempts: 0 });
        }

        let prompt = self.build_prompt(script, vocabulary);
        let max_attempts = self.config.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            let result = match self.classifier.classify(&prompt).await {
                Ok(reply) => parse_reply(&reply).and_then(|payload| validate_tags(&payload, vocabulary)),
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(tags) => {
                    tracing::debug!("Classifier returned {} valid tags on attempt {}", tags.len(), attempt);
                    return Ok(TaggingOutcome { tags, fallback_used: false, attempts: attempt });
                }
                Err(e) if !e.is_transient() => {
                    tracing::error!("Tagging aborted on attempt {}: {}", attempt, e);
                    return Err(e);
                }
                Err(e) => e,
            };

            if attempt == max_attempts {
                tracing::warn!("Tagging attempt {}/{} failed ({}): {}", attempt, max_attempts, err.kind(), err);
                break;
            }

            let delay = self.retry_delay(&err, attempt);
            tracing::warn!(
                "Tagging attempt {}/{} failed ({}): {}. Retrying in {:?}",
                attempt, max_attempts, err.kind(), err, delay
            );
            tokio::time::sleep(delay).await;
        }

        Ok(self.fallback(vocabulary, max_attempts))
    }

    /// Delay after a failed `attempt` (1-based). Rate limits use the
    /// service's Retry-After, capped at `max_rate_limit_wait_ms`, or the
    /// configured cooldown; everything else doubles from the base delay.
    pub fn retry_delay(&self, err: &ClassifierError, attempt: u32) -> Duration {
        match err {
            ClassifierError::RateLimited { retry_after: Some(wait), .. } => {
                let cap = self.config.max_rate_limit_wait();
                if *wait > cap {
                    tracing::warn!("Retry-After of {:?} exceeds the {:?} cap", wait, cap);
                }
                (*wait).min(cap)
            }
            ClassifierError::RateLimited { retry_after: None, .. } => self.config.rate_limit_cooldown(),
            _ => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                self.config.base_delay().saturating_mul(factor)
            }
        }
    }

    pub fn build_prompt(&self, script: &str, vocabulary: &TagVocabulary) -> String {
        format!(
            r#"You are a semantic tagging system for B-roll video selection.

Rules:
- Choose ONLY from the provided tag IDs
- Prefer domain, concept, environment tags
- Avoid emotions unless clearly implied
- Return {min}-{max} tags
- Scores between 0.0 and 1.0, where 1.0 means the tag is central to the script
- Output JSON ONLY

Script:
"""
{script}
"""

Allowed tags:
{tags}

Output format:
{{
  "tags": [
    {{ "id": "ai", "score": 0.85 }}
  ]
}}
"#,
            min = self.config.min_tags,
            max = self.config.max_tags,
            script = script.trim(),
            tags = vocabulary.prompt_block(),
        )
    }

    fn fallback(&self, vocabulary: &TagVocabulary, attempts: u32) -> TaggingOutcome {
        let tags: Vec<ScoredTag> = match self.config.fallback {
            FallbackPolicy::Empty => Vec::new(),
            FallbackPolicy::Generic => {
                let mut tags: Vec<ScoredTag> = self.config.fallback_tags
                    .iter()
                    .filter(|t| vocabulary.contains(&t.id))
                    .map(|t| ScoredTag::new(t.id.clone(), t.confidence.clamp(0.0, 1.0)))
                    .collect();
                tags.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
                tags
            }
        };

        tracing::warn!(
            "Tagging fallback used after {} attempts (policy={:?}, tags={})",
            attempts,
            self.config.fallback,
            tags.len()
        );
        TaggingOutcome { tags, fallback_used: true, attempts }
    }
}
