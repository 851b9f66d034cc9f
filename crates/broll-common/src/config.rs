use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use config::{Config, ConfigError, File, Environment};
use crate::ScoredTag;

// --- Constants for Default Configuration ---
pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_LLM_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_TAGGER_MAX_ATTEMPTS: u32 = 4;
pub const DEFAULT_TAGGER_BASE_DELAY_MS: u64 = 1500;
pub const DEFAULT_TAGGER_RATE_LIMIT_COOLDOWN_MS: u64 = 10_000;
pub const DEFAULT_TAGGER_MAX_RATE_LIMIT_WAIT_MS: u64 = 60_000;
pub const DEFAULT_TAGGER_MIN_TAGS: usize = 7;
pub const DEFAULT_TAGGER_MAX_TAGS: usize = 10;

pub const DEFAULT_CORE_THRESHOLD: f64 = 0.75;
pub const DEFAULT_SUPPORT_THRESHOLD: f64 = 0.60;
pub const DEFAULT_WEAK_THRESHOLD: f64 = 0.45;
pub const DEFAULT_MAX_SUPPORT_WITH_CORE: usize = 3;
pub const DEFAULT_MAX_SUPPORT_ONLY: usize = 4;
pub const DEFAULT_MAX_WEAK: usize = 1;
pub const DEFAULT_MAX_TAGS: usize = 10;
pub const DEFAULT_GENERIC_CAP: usize = 2;
pub const DEFAULT_GENERIC_TAGS: &[&str] = &["technology", "business", "people", "lifestyle", "abstract"];

pub const DEFAULT_MISMATCH_PENALTY: f64 = 0.05;
pub const DEFAULT_MATCH_BONUS: f64 = 0.10;
pub const DEFAULT_BONUS_CAP: f64 = 0.40;
pub const DEFAULT_LOW_PRECISION_THRESHOLD: f64 = 0.4;
pub const DEFAULT_LOW_PRECISION_FACTOR: f64 = 0.6;
pub const DEFAULT_MID_PRECISION_THRESHOLD: f64 = 0.6;
pub const DEFAULT_MID_PRECISION_FACTOR: f64 = 0.8;
pub const DEFAULT_USAGE_PENALTY_RATE: f64 = 0.20;
pub const DEFAULT_USAGE_FLOOR: f64 = 0.25;
pub const DEFAULT_MIN_OVERLAP: usize = 1;

pub const DEFAULT_VOCABULARY_PATH: &str = "tags.json";
pub const DEFAULT_METADATA_PATH: &str = "video_metadata.json";

pub const DEFAULT_SERVER_BIND_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_SESSION_TTL_SECS: u64 = 3600;
pub const DEFAULT_MAX_SESSIONS: u64 = 10_000;
pub const DEFAULT_MAX_SEQUENCE_LEN: usize = 5;
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LLMProvider {
    OpenAI,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LLMConfig {
    pub provider: LLMProvider,
    pub openai_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub model: String,
    pub base_url: Option<String>,
    pub request_timeout_secs: u64,
}

/// What the tagger returns once every attempt has failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// The configured `fallback_tags`
    Generic,
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggerConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub rate_limit_cooldown_ms: u64,
    /// Upper bound on a service-provided Retry-After
    pub max_rate_limit_wait_ms: u64,
    pub min_tags: usize,
    pub max_tags: usize,
    pub fallback: FallbackPolicy,
    pub fallback_tags: Vec<ScoredTag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketerConfig {
    pub core_threshold: f64,
    pub support_threshold: f64,
    pub weak_threshold: f64,
    pub max_support_with_core: usize,
    pub max_support_only: usize,
    pub max_weak: usize,
    pub max_tags: usize,
    pub generic_tags: Vec<String>,
    pub generic_cap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    pub mismatch_penalty: f64,
    pub match_bonus: f64,
    pub bonus_cap: f64,
    pub low_precision_threshold: f64,
    pub low_precision_factor: f64,
    pub mid_precision_threshold: f64,
    pub mid_precision_factor: f64,
    pub usage_penalty_rate: f64,
    pub usage_floor: f64,
    pub min_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub vocabulary_path: String,
    pub metadata_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub session_ttl_secs: u64,
    pub max_sessions: u64,
    pub max_sequence_len: usize,
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub llm: LLMConfig,
    #[serde(default)]
    pub tagger: TaggerConfig,
    #[serde(default)]
    pub bucketer: BucketerConfig,
    #[serde(default)]
    pub selector: SelectorConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            provider: LLMProvider::Gemini,
            openai_api_key: None,
            google_api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            base_url: None,
            request_timeout_secs: DEFAULT_LLM_TIMEOUT_SECS,
        }
    }
}

impl LLMConfig {
    pub fn active_key(&self) -> Option<String> {
        let key = match self.provider {
            LLMProvider::OpenAI => self.openai_api_key.as_ref(),
            LLMProvider::Gemini => self.google_api_key.as_ref(),
        };
        key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_TAGGER_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_TAGGER_BASE_DELAY_MS,
            rate_limit_cooldown_ms: DEFAULT_TAGGER_RATE_LIMIT_COOLDOWN_MS,
            max_rate_limit_wait_ms: DEFAULT_TAGGER_MAX_RATE_LIMIT_WAIT_MS,
            min_tags: DEFAULT_TAGGER_MIN_TAGS,
            max_tags: DEFAULT_TAGGER_MAX_TAGS,
            fallback: FallbackPolicy::Generic,
            fallback_tags: vec![
                ScoredTag::new("ai", 0.60),
                ScoredTag::new("technology", 0.55),
                ScoredTag::new("software", 0.50),
            ],
        }
    }
}

impl TaggerConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_millis(self.rate_limit_cooldown_ms)
    }

    pub fn max_rate_limit_wait(&self) -> Duration {
        Duration::from_millis(self.max_rate_limit_wait_ms)
    }
}

impl Default for BucketerConfig {
    fn default() -> Self {
        Self {
            core_threshold: DEFAULT_CORE_THRESHOLD,
            support_threshold: DEFAULT_SUPPORT_THRESHOLD,
            weak_threshold: DEFAULT_WEAK_THRESHOLD,
            max_support_with_core: DEFAULT_MAX_SUPPORT_WITH_CORE,
            max_support_only: DEFAULT_MAX_SUPPORT_ONLY,
            max_weak: DEFAULT_MAX_WEAK,
            max_tags: DEFAULT_MAX_TAGS,
            generic_tags: DEFAULT_GENERIC_TAGS.iter().map(|s| s.to_string()).collect(),
            generic_cap: DEFAULT_GENERIC_CAP,
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            mismatch_penalty: DEFAULT_MISMATCH_PENALTY,
            match_bonus: DEFAULT_MATCH_BONUS,
            bonus_cap: DEFAULT_BONUS_CAP,
            low_precision_threshold: DEFAULT_LOW_PRECISION_THRESHOLD,
            low_precision_factor: DEFAULT_LOW_PRECISION_FACTOR,
            mid_precision_threshold: DEFAULT_MID_PRECISION_THRESHOLD,
            mid_precision_factor: DEFAULT_MID_PRECISION_FACTOR,
            usage_penalty_rate: DEFAULT_USAGE_PENALTY_RATE,
            usage_floor: DEFAULT_USAGE_FLOOR,
            min_overlap: DEFAULT_MIN_OVERLAP,
        }
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            vocabulary_path: DEFAULT_VOCABULARY_PATH.into(),
            metadata_path: DEFAULT_METADATA_PATH.into(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_SERVER_BIND_ADDR.into(),
            session_ttl_secs: DEFAULT_SESSION_TTL_SECS,
            max_sessions: DEFAULT_MAX_SESSIONS,
            max_sequence_len: DEFAULT_MAX_SEQUENCE_LEN,
            allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.into()],
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(env_source())
    }

    fn load_with(environment: Environment) -> Result<Self, ConfigError> {
        let google_key = env::var("GEMINI_API_KEY")
            .or_else(|_| env::var("GOOGLE_API_KEY"))
            .ok();

        let s = Config::builder()
            // Default settings
            .set_default("llm.provider", "gemini")?
            .set_default("llm.model", DEFAULT_LLM_MODEL)?
            .set_default("tagger.max_attempts", DEFAULT_TAGGER_MAX_ATTEMPTS)?
            .set_default("tagger.base_delay_ms", DEFAULT_TAGGER_BASE_DELAY_MS)?
            .set_default("tagger.fallback", "generic")?
            .set_default("catalog.vocabulary_path", DEFAULT_VOCABULARY_PATH)?
            .set_default("catalog.metadata_path", DEFAULT_METADATA_PATH)?
            .set_default("server.bind_addr", DEFAULT_SERVER_BIND_ADDR)?

            // File: config.toml
            .add_source(File::with_name("config").required(false))

            .add_source(environment)

            // Conventional key variables
            .set_override_option("llm.google_api_key", google_key)?
            .set_override_option("llm.openai_api_key", env::var("OPENAI_API_KEY").ok())?
            .set_override_option("llm.model", env::var("LLM_MODEL").ok())?

            .build()?;

        s.try_deserialize()
    }
}

/// BROLL_SELECTOR__USAGE_PENALTY_RATE=0.3 -> selector.usage_penalty_rate=0.3
fn env_source() -> Environment {
    Environment::with_prefix("BROLL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("bucketer.generic_tags")
        .with_list_parse_key("server.allowed_origins")
}
