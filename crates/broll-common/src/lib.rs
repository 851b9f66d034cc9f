use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub mod config;
pub mod error;
pub mod plan;

pub use error::{CatalogError, ClassifierError, PlanError, VocabularyError};
pub use plan::{CompositionPlan, Insertion};

/// A vocabulary entry. `text` is the human description the classifier sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub id: String,
    #[serde(alias = "displayText", alias = "display_text")]
    pub text: String,
}

impl Tag {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredTag {
    pub id: String,
    pub confidence: f64,
}

impl ScoredTag {
    pub fn new(id: impl Into<String>, confidence: f64) -> Self {
        Self { id: id.into(), confidence }
    }

    pub fn family_root(&self) -> &str {
        family_root(&self.id)
    }
}

/// Everything before the first underscore: `office_interior` -> `office`.
/// Tags sharing a root are treated as alternatives of one another.
pub fn family_root(tag_id: &str) -> &str {
    tag_id.split('_').next().unwrap_or(tag_id)
}

/// Bounded, root-unique tag set ordered by descending confidence.
///
/// Only the bucketer builds these; the invariants are checked on construction
/// in debug builds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagSet {
    tags: Vec<ScoredTag>,
}

impl TagSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Caller guarantees ordering and root uniqueness.
    pub fn from_ordered(tags: Vec<ScoredTag>) -> Self {
        debug_assert!(tags.windows(2).all(|w| w[0].confidence >= w[1].confidence));
        debug_assert!({
            let mut roots = HashSet::new();
            tags.iter().all(|t| roots.insert(t.family_root().to_string()))
        });
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredTag> {
        self.tags.iter()
    }

    pub fn confidence(&self, tag_id: &str) -> Option<f64> {
        self.tags.iter().find(|t| t.id == tag_id).map(|t| t.confidence)
    }

    pub fn contains(&self, tag_id: &str) -> bool {
        self.confidence(tag_id).is_some()
    }

    pub fn ids(&self) -> Vec<String> {
        self.tags.iter().map(|t| t.id.clone()).collect()
    }

    pub fn as_slice(&self) -> &[ScoredTag] {
        &self.tags
    }
}

/// A pre-tagged clip from the corpus. `key` is the opaque storage key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clip {
    #[serde(alias = "s3_key")]
    pub key: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Clip {
    pub fn new<I, S>(key: impl Into<String>, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            tags: tags.into_iter().map(Into::into).collect(),
        }
    }

    /// Tags with duplicates removed, first occurrence kept.
    pub fn distinct_tags(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.tags
            .iter()
            .map(String::as_str)
            .filter(|t| seen.insert(*t))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionResult {
    pub clip_key: String,
    pub matched_tags: Vec<String>,
    pub score: f64,
    pub precision: f64,
    pub usage_count_at_selection: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_root() {
        assert_eq!(family_root("office_interior"), "office");
        assert_eq!(family_root("office_interior_night"), "office");
        assert_eq!(family_root("coding"), "coding");
        assert_eq!(family_root(""), "");
    }

    #[test]
    fn test_tag_set_lookup() {
        let set = TagSet::from_ordered(vec![
            ScoredTag::new("coding", 0.9),
            ScoredTag::new("productivity", 0.8),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.confidence("coding"), Some(0.9));
        assert!(!set.contains("ai"));
        assert_eq!(set.ids(), vec!["coding", "productivity"]);
    }

    #[test]
    fn test_clip_accepts_storage_key_field() {
        let clip: Clip = serde_json::from_str(r#"{"s3_key": "clips/a.mov", "tags": ["coding", "coding", "desk"]}"#).unwrap();
        assert_eq!(clip.key, "clips/a.mov");
        assert_eq!(clip.distinct_tags(), vec!["coding", "desk"]);
    }

    #[test]
    fn test_selection_result_wire_names() {
        let result = SelectionResult {
            clip_key: "a".into(),
            matched_tags: vec!["coding".into()],
            score: 1.0,
            precision: 0.5,
            usage_count_at_selection: 0,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["clipKey"], "a");
        assert_eq!(json["usageCountAtSelection"], 0);
    }
}
