use broll_common::{Tag, VocabularyError};
use std::collections::HashSet;
use std::path::Path;

/// The closed set of tag ids a classifier may answer with.
#[derive(Debug, Clone)]
pub struct TagVocabulary {
    tags: Vec<Tag>,
    ids: HashSet<String>,
}

impl TagVocabulary {
    pub fn new(tags: Vec<Tag>) -> Result<Self, VocabularyError> {
        let mut ids = HashSet::with_capacity(tags.len());
        for (idx, tag) in tags.iter().enumerate() {
            if tag.id.trim().is_empty() {
                return Err(VocabularyError::EmptyId(idx));
            }
            if !ids.insert(tag.id.clone()) {
                return Err(VocabularyError::Duplicate(tag.id.clone()));
            }
        }
        Ok(Self { tags, ids })
    }

    /// Reads a JSON array of `{"id": ..., "text": ...}` objects.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, VocabularyError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let tags: Vec<Tag> = serde_json::from_str(&raw)?;
        let vocabulary = Self::new(tags)?;
        tracing::info!("Loaded {} tags from {:?}", vocabulary.len(), path.as_ref());
        Ok(vocabulary)
    }

    pub fn contains(&self, tag_id: &str) -> bool {
        self.ids.contains(tag_id)
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Pretty JSON block embedded in the classification prompt.
    pub fn prompt_block(&self) -> String {
        serde_json::to_string_pretty(&self.tags).unwrap_or_else(|_| "[]".to_string())
    }
}
