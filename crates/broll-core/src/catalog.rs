use async_trait::async_trait;
use broll_common::{CatalogError, Clip};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// Tag-indexed clip lookup.
///
/// Implementations must return matches in the same order on every call;
/// selection breaks score ties by that order.
#[async_trait]
pub trait ClipCatalog: Send + Sync {
    /// Clips sharing at least one tag with `tag_ids`. Empty request, empty result.
    async fn lookup_by_tags(&self, tag_ids: &BTreeSet<String>) -> Result<Vec<Clip>, CatalogError>;
}

/// Catalog held in memory, ordered by first insertion.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    clips: Vec<Clip>,
    positions: HashMap<String, usize>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_clips(clips: impl IntoIterator<Item = Clip>) -> Self {
        let mut catalog = Self::new();
        for clip in clips {
            catalog.upsert(clip);
        }
        catalog
    }

    /// Loads a JSON array of `{"s3_key": ..., "tags": [...]}` records.
    /// Records without a key or a tag list are skipped with a warning.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let catalog = Self::from_json(&raw)?;
        tracing::info!("Loaded {} clips from {:?}", catalog.len(), path.as_ref());
        Ok(catalog)
    }

    pub fn from_json(raw: &str) -> Result<Self, CatalogError> {
        let records: Vec<Value> = serde_json::from_str(raw)?;
        let mut catalog = Self::new();

        for (idx, record) in records.into_iter().enumerate() {
            match serde_json::from_value::<Clip>(record) {
                Ok(clip) if !clip.key.trim().is_empty() && !clip.tags.is_empty() => catalog.upsert(clip),
                Ok(clip) => tracing::warn!("Skipping clip entry {} ({:?}): missing key or tags", idx, clip.key),
                Err(e) => tracing::warn!("Skipping invalid clip entry {}: {}", idx, e),
            }
        }
        Ok(catalog)
    }

    /// Replaces the tags of an existing key in place, otherwise appends.
    pub fn upsert(&mut self, clip: Clip) {
        match self.positions.get(&clip.key) {
            Some(&idx) => self.clips[idx].tags = clip.tags,
            None => {
                self.positions.insert(clip.key.clone(), self.clips.len());
                self.clips.push(clip);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Clip> {
        self.positions.get(key).map(|&idx| &self.clips[idx])
    }

    pub fn all(&self) -> &[Clip] {
        &self.clips
    }

    pub fn unique_tags(&self) -> BTreeSet<&str> {
        self.clips.iter().flat_map(|c| c.tags.iter().map(String::as_str)).collect()
    }

    pub fn len(&self) -> usize {
        self.clips.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }
}

#[async_trait]
impl ClipCatalog for InMemoryCatalog {
    async fn lookup_by_tags(&self, tag_ids: &BTreeSet<String>) -> Result<Vec<Clip>, CatalogError> {
        if tag_ids.is_empty() {
            return Ok(Vec::new());
        }
        let matches: Vec<Clip> = self.clips
            .iter()
            .filter(|clip| clip.tags.iter().any(|t| tag_ids.contains(t)))
            .cloned()
            .collect();
        tracing::debug!("Found {} clips matching {} tags", matches.len(), tag_ids.len());
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn request(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_lookup_any_overlap_in_stable_order() -> anyhow::Result<()> {
        let catalog = InMemoryCatalog::from_clips(vec![
            Clip::new("c1", ["coding", "desk"]),
            Clip::new("c2", ["nature"]),
            Clip::new("c3", ["productivity"]),
        ]);

        let first = catalog.lookup_by_tags(&request(&["productivity", "coding"])).await?;
        let keys: Vec<&str> = first.iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["c1", "c3"]);

        let second = catalog.lookup_by_tags(&request(&["coding", "productivity"])).await?;
        assert_eq!(first, second);

        assert!(catalog.lookup_by_tags(&BTreeSet::new()).await?.is_empty());
        Ok(())
    }

    #[test]
    fn test_upsert_keeps_position() {
        let mut catalog = InMemoryCatalog::from_clips(vec![
            Clip::new("c1", ["coding"]),
            Clip::new("c2", ["nature"]),
        ]);
        catalog.upsert(Clip::new("c1", ["cooking"]));

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.all()[0].key, "c1");
        assert_eq!(catalog.get("c1").unwrap().tags, vec!["cooking"]);
        assert_eq!(catalog.unique_tags().into_iter().collect::<Vec<_>>(), vec!["cooking", "nature"]);
    }

    #[test]
    fn test_load_skips_invalid_entries() -> anyhow::Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"[
                {{"s3_key": "clips/a.mov", "tags": ["coding", "desk"]}},
                {{"s3_key": "clips/b.mov"}},
                {{"tags": ["nature"]}},
                {{"s3_key": 12, "tags": ["x"]}},
                {{"key": "clips/c.mov", "tags": ["ai"]}}
            ]"#
        )?;

        let catalog = InMemoryCatalog::from_path(file.path())?;
        assert_eq!(catalog.len(), 2);
        assert!(catalog.get("clips/a.mov").is_some());
        assert!(catalog.get("clips/c.mov").is_some());
        Ok(())
    }

    #[test]
    fn test_load_rejects_non_array() {
        assert!(matches!(InMemoryCatalog::from_json("{\"videos\": []}"), Err(CatalogError::Parse(_))));
    }
}
