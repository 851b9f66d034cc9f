use broll_common::config::BucketerConfig;
use broll_common::{ScoredTag, TagSet};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    Core,
    Support,
    Weak,
}

/// Reduces raw classifier scores to a small, root-unique `TagSet`.
///
/// Tiers never mix downward: weak tags are used only when there is no core
/// and no support tag at all.
#[derive(Debug, Clone, Default)]
pub struct TagBucketer {
    config: BucketerConfig,
}

impl TagBucketer {
    pub fn new(config: BucketerConfig) -> Self {
        Self { config }
    }

    pub fn tier(&self, confidence: f64) -> Option<ConfidenceTier> {
        if confidence >= self.config.core_threshold {
            Some(ConfidenceTier::Core)
        } else if confidence >= self.config.support_threshold {
            Some(ConfidenceTier::Support)
        } else if confidence >= self.config.weak_threshold {
            Some(ConfidenceTier::Weak)
        } else {
            None
        }
    }

    pub fn bucket(&self, scored: &[ScoredTag]) -> TagSet {
        let mut sorted: Vec<&ScoredTag> = scored.iter().collect();
        sorted.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let (mut core, mut support, mut weak) = (Vec::new(), Vec::new(), Vec::new());
        for tag in sorted {
            match self.tier(tag.confidence) {
                Some(ConfidenceTier::Core) => core.push(tag),
                Some(ConfidenceTier::Support) => support.push(tag),
                Some(ConfidenceTier::Weak) => weak.push(tag),
                None => {}
            }
        }

        let selected: Vec<&ScoredTag> = if !core.is_empty() {
            let k = self.config.max_support_with_core;
            core.into_iter().chain(support.into_iter().take(k)).collect()
        } else if !support.is_empty() {
            support.into_iter().take(self.config.max_support_only).collect()
        } else {
            weak.into_iter().take(self.config.max_weak).collect()
        };

        // Highest confidence comes first, so the first of each root wins.
        let mut roots = HashSet::new();
        let deduped: Vec<&ScoredTag> = selected
            .into_iter()
            .filter(|t| roots.insert(t.family_root()))
            .collect();

        let (generic, specific): (Vec<&ScoredTag>, Vec<&ScoredTag>) = deduped
            .into_iter()
            .partition(|t| self.is_generic(&t.id));

        let mut result: Vec<ScoredTag> = specific
            .into_iter()
            .chain(generic.into_iter().take(self.config.generic_cap))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
        result.truncate(self.config.max_tags);

        tracing::debug!(
            "Bucketed {} scored tags into {}: {:?}",
            scored.len(),
            result.len(),
            result.iter().map(|t| t.id.as_str()).collect::<Vec<_>>()
        );
        TagSet::from_ordered(result)
    }

    fn is_generic(&self, tag_id: &str) -> bool {
        self.config.generic_tags.iter().any(|g| g == tag_id)
    }
}
