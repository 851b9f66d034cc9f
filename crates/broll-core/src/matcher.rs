use anyhow::{Context, Result};
use broll_common::config::AppConfig;
use broll_common::{SelectionResult, TagSet};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use crate::bucketer::TagBucketer;
use crate::catalog::ClipCatalog;
use crate::llm::TagClassifier;
use crate::selector::ClipSelector;
use crate::tagger::ScriptTagger;
use crate::usage::UsageTracker;
use crate::vocabulary::TagVocabulary;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchOutcome {
    pub tags: TagSet,
    pub fallback_used: bool,
    pub selection: Option<SelectionResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceOutcome {
    pub tags: TagSet,
    pub fallback_used: bool,
    pub selections: Vec<SelectionResult>,
}

/// Script in, clip out: tag, bucket, look up, select.
///
/// Shared across sessions; per-session state lives in the `UsageTracker`
/// passed to each call.
pub struct BrollMatcher {
    vocabulary: Arc<TagVocabulary>,
    tagger: ScriptTagger,
    bucketer: TagBucketer,
    catalog: Arc<dyn ClipCatalog>,
    selector: ClipSelector,
    min_overlap: usize,
}

impl BrollMatcher {
    pub fn new(
        config: &AppConfig,
        vocabulary: Arc<TagVocabulary>,
        classifier: Arc<dyn TagClassifier>,
        catalog: Arc<dyn ClipCatalog>,
    ) -> Self {
        Self {
            vocabulary,
            tagger: ScriptTagger::new(classifier, config.tagger.clone()),
            bucketer: TagBucketer::new(config.bucketer.clone()),
            catalog,
            selector: ClipSelector::new(config.selector.clone()),
            min_overlap: config.selector.min_overlap,
        }
    }

    pub fn vocabulary(&self) -> &TagVocabulary {
        &self.vocabulary
    }

    /// Tags the script and reduces the result to a bounded `TagSet`.
    ///
    /// Fatal classifier errors come back as `ClassifierError` inside the
    /// `anyhow::Error`.
    pub async fn tag_script(&self, script: &str) -> Result<(TagSet, bool)> {
        let outcome = self.tagger.tag(script, &self.vocabulary).await?;
        if outcome.fallback_used {
            tracing::warn!("Fallback tags used after {} attempts", outcome.attempts);
        }
        Ok((self.bucketer.bucket(&outcome.tags), outcome.fallback_used))
    }

    pub async fn match_script(&self, script: &str, usage: &UsageTracker) -> Result<MatchOutcome> {
        let (tags, fallback_used) = self.tag_script(script).await?;
        if tags.is_empty() {
            tracing::info!("No usable tags for script, skipping selection");
            return Ok(MatchOutcome { tags, fallback_used, selection: None });
        }

        let candidates = self.lookup(&tags).await?;
        let selection = self.selector.select_best(&tags, &candidates, usage, &[], self.min_overlap);
        if selection.is_none() {
            tracing::info!("No clip among {} candidates met the overlap requirement", candidates.len());
        }

        Ok(MatchOutcome { tags, fallback_used, selection })
    }

    /// Up to `count` distinct clips for one script. Fewer when the catalog
    /// runs out of matching clips.
    pub async fn match_sequence(&self, script: &str, usage: &UsageTracker, count: usize) -> Result<SequenceOutcome> {
        let (tags, fallback_used) = self.tag_script(script).await?;
        if tags.is_empty() || count == 0 {
            return Ok(SequenceOutcome { tags, fallback_used, selections: Vec::new() });
        }

        let candidates = self.lookup(&tags).await?;
        let selections = self.selector.select_sequence(&tags, &candidates, usage, count, self.min_overlap);
        tracing::info!("Selected {} of {} requested clips", selections.len(), count);

        Ok(SequenceOutcome { tags, fallback_used, selections })
    }

    async fn lookup(&self, tags: &TagSet) -> Result<Vec<broll_common::Clip>> {
        let request: BTreeSet<String> = tags.ids().into_iter().collect();
        let candidates = self
            .catalog
            .lookup_by_tags(&request)
            .await
            .context("Clip catalog lookup failed")?;
        tracing::debug!("Catalog returned {} candidates", candidates.len());
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::llm::ClassifierReply;
    use async_trait::async_trait;
    use broll_common::{CatalogError, ClassifierError, Clip, Tag};

    struct FixedClassifier {
        reply: Result<String, String>,
    }

    #[async_trait]
    impl TagClassifier for FixedClassifier {
        async fn classify(&self, _prompt: &str) -> Result<ClassifierReply, ClassifierError> {
            match &self.reply {
                Ok(text) => Ok(ClassifierReply::text(text.clone())),
                Err(message) => Err(ClassifierError::Fatal(message.clone())),
            }
        }
    }

    struct DownCatalog;

    #[async_trait]
    impl ClipCatalog for DownCatalog {
        async fn lookup_by_tags(&self, _tag_ids: &BTreeSet<String>) -> Result<Vec<Clip>, CatalogError> {
            Err(CatalogError::Unavailable("metadata store offline".into()))
        }
    }

    const REPLY: &str = r#"```json
{"tags":[{"id":"coding","score":0.9},{"id":"productivity","score":0.8},{"id":"ai","score":0.3}]}
```"#;

    fn vocabulary() -> Arc<TagVocabulary> {
        let tags = ["ai", "technology", "software", "coding", "productivity", "nature"]
            .iter()
            .map(|id| Tag::new(*id, *id))
            .collect();
        Arc::new(TagVocabulary::new(tags).unwrap())
    }

    fn catalog() -> Arc<dyn ClipCatalog> {
        Arc::new(InMemoryCatalog::from_clips(vec![
            Clip::new("clips/home_office.mov", ["coding", "productivity", "home", "lifestyle"]),
            Clip::new("clips/typing.mov", ["coding", "productivity"]),
            Clip::new("clips/forest.mov", ["nature"]),
            Clip::new("clips/terminal.mov", ["coding", "software"]),
        ]))
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.tagger.base_delay_ms = 0;
        config.tagger.rate_limit_cooldown_ms = 0;
        config
    }

    fn matcher(reply: Result<&str, &str>, catalog: Arc<dyn ClipCatalog>) -> BrollMatcher {
        let classifier = Arc::new(FixedClassifier {
            reply: reply.map(str::to_string).map_err(str::to_string),
        });
        BrollMatcher::new(&config(), vocabulary(), classifier, catalog)
    }

    #[tokio::test]
    async fn test_match_script_end_to_end() -> anyhow::Result<()> {
        let matcher = matcher(Ok(REPLY), catalog());
        let usage = UsageTracker::new();

        let outcome = matcher.match_script("How I stay productive while coding", &usage).await?;
        assert_eq!(outcome.tags.ids(), vec!["coding", "productivity"]);
        assert!(!outcome.fallback_used);

        let selection = outcome.selection.expect("a clip should be selected");
        assert_eq!(selection.clip_key, "clips/typing.mov");
        assert!((selection.score - 1.9).abs() < 1e-9);
        assert_eq!(usage.get("clips/typing.mov"), 1);

        // typing.mov now scores 1.52, home_office.mov still 1.44
        let again = matcher.match_script("How I stay productive while coding", &usage).await?;
        assert_eq!(again.selection.unwrap().clip_key, "clips/typing.mov");
        let third = matcher.match_script("How I stay productive while coding", &usage).await?;
        assert_eq!(third.selection.unwrap().clip_key, "clips/home_office.mov");
        Ok(())
    }

    #[tokio::test]
    async fn test_sessions_are_independent() -> anyhow::Result<()> {
        let matcher = matcher(Ok(REPLY), catalog());
        let (alice, bob) = (UsageTracker::new(), UsageTracker::new());

        matcher.match_script("coding", &alice).await?;
        let first_for_bob = matcher.match_script("coding", &bob).await?;
        assert_eq!(first_for_bob.selection.unwrap().usage_count_at_selection, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_match_sequence_returns_distinct_clips() -> anyhow::Result<()> {
        let matcher = matcher(Ok(REPLY), catalog());
        let usage = UsageTracker::new();

        let outcome = matcher.match_sequence("coding all day", &usage, 5).await?;
        let keys: Vec<&str> = outcome.selections.iter().map(|s| s.clip_key.as_str()).collect();
        assert_eq!(keys, vec!["clips/typing.mov", "clips/home_office.mov", "clips/terminal.mov"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_script_selects_nothing() -> anyhow::Result<()> {
        let matcher = matcher(Ok(REPLY), catalog());
        let usage = UsageTracker::new();
        let outcome = matcher.match_script("   ", &usage).await?;
        assert!(outcome.tags.is_empty());
        assert!(outcome.selection.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_reply_uses_fallback() -> anyhow::Result<()> {
        let matcher = matcher(Ok("I cannot help with that."), catalog());
        let usage = UsageTracker::new();

        let outcome = matcher.match_script("coding", &usage).await?;
        assert!(outcome.fallback_used);
        // ai 0.60 is the only support tag; the weak ones are dropped
        assert_eq!(outcome.tags.ids(), vec!["ai"]);
        assert!(outcome.selection.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_fatal_and_catalog_errors_propagate() {
        let usage = UsageTracker::new();

        let fatal = matcher(Err("invalid api key"), catalog());
        let err = fatal.match_script("coding", &usage).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ClassifierError>(), Some(ClassifierError::Fatal(_))));

        let down = matcher(Ok(REPLY), Arc::new(DownCatalog));
        let err = down.match_script("coding", &usage).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<CatalogError>(), Some(CatalogError::Unavailable(_))));
        assert!(usage.snapshot().is_empty());
    }
}
