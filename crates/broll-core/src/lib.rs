pub mod bucketer;
pub mod catalog;
pub mod llm;
pub mod matcher;
pub mod reply;
pub mod selector;
pub mod tagger;
pub mod usage;
pub mod vocabulary;

pub use bucketer::{ConfidenceTier, TagBucketer};
pub use catalog::{ClipCatalog, InMemoryCatalog};
pub use llm::{create_classifier, ClassifierReply, GeminiClassifier, OpenAIClassifier, TagClassifier};
pub use matcher::{BrollMatcher, MatchOutcome, SequenceOutcome};
pub use selector::{ClipScore, ClipSelector};
pub use tagger::{ScriptTagger, TaggingOutcome};
pub use usage::UsageTracker;
pub use vocabulary::TagVocabulary;

// Re-export common types for convenience
pub use broll_common::{Clip, CompositionPlan, ScoredTag, SelectionResult, Tag, TagSet};
