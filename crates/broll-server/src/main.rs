use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use broll_common::{config::AppConfig, CatalogError, ClassifierError, ScoredTag, SelectionResult};
use broll_core::{create_classifier, BrollMatcher, InMemoryCatalog, TagVocabulary, UsageTracker};
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const DEFAULT_SESSION: &str = "default";

struct AppState {
    matcher: BrollMatcher,
    sessions: Cache<String, Arc<UsageTracker>>,
    config: AppConfig,
}

impl AppState {
    fn new(config: AppConfig, matcher: BrollMatcher) -> Self {
        let sessions = Cache::builder()
            .time_to_idle(std::time::Duration::from_secs(config.server.session_ttl_secs))
            .max_capacity(config.server.max_sessions)
            .build();
        Self { matcher, sessions, config }
    }

    async fn session(&self, session_id: Option<&str>) -> Arc<UsageTracker> {
        let key = session_key(session_id);
        self.sessions.get_with(key, async { Arc::new(UsageTracker::new()) }).await
    }
}

/// Trimmed id; missing or blank ids share the default session.
fn session_key(session_id: Option<&str>) -> String {
    session_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    match dotenvy::dotenv() {
        Ok(path) => tracing::info!("Loaded .env from: {:?}", path),
        Err(e) => tracing::warn!("Failed to load .env file: {}. Using system environment variables.", e),
    }

    let config = AppConfig::load().context("Failed to load configuration")?;
    tracing::info!("Using LLM Provider: {:?}", config.llm.provider);
    tracing::info!("Using LLM Model: {}", config.llm.model);

    let vocabulary = TagVocabulary::from_path(&config.catalog.vocabulary_path)
        .with_context(|| format!("Failed to load tag vocabulary from {}", config.catalog.vocabulary_path))?;
    let catalog = InMemoryCatalog::from_path(&config.catalog.metadata_path)
        .with_context(|| format!("Failed to load clip metadata from {}", config.catalog.metadata_path))?;
    let classifier = create_classifier(&config.llm)
        .context("Fatal: API Key is required for the configured LLM provider")?;

    let matcher = BrollMatcher::new(&config, Arc::new(vocabulary), classifier, Arc::new(catalog));
    let state = Arc::new(AppState::new(config.clone(), matcher));
    let app = router(state);

    let http_addr: SocketAddr = config
        .server
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.server.bind_addr))?;
    tracing::info!("HTTP API listening on {}", http_addr);
    let listener = tokio::net::TcpListener::bind(http_addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to install CTRL+C handler: {}", e);
            }
            tracing::info!("Shutdown signal received.");
        })
        .await?;

    tracing::info!("B-roll server stopped.");
    Ok(())
}

fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/get-broll", post(get_broll))
        .route("/api/get-broll/sequence", post(get_broll_sequence))
        .route("/api/sessions/:session_id/usage", delete(reset_session))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(&state.config.server.allowed_origins))
                .into_inner(),
        )
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "vocabularySize": state.matcher.vocabulary().len(),
        "activeSessions": state.sessions.entry_count(),
    }))
}

#[derive(Deserialize)]
struct BrollRequest {
    script: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct SequenceRequest {
    script: String,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default = "default_count")]
    count: usize,
}

fn default_count() -> usize {
    3
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClipView {
    video_key: Option<String>,
    matched_tags: Vec<String>,
    score: f64,
    precision: f64,
}

impl From<Option<SelectionResult>> for ClipView {
    fn from(selection: Option<SelectionResult>) -> Self {
        match selection {
            Some(s) => Self {
                video_key: Some(s.clip_key),
                matched_tags: s.matched_tags,
                score: s.score,
                precision: s.precision,
            },
            None => Self { video_key: None, matched_tags: Vec::new(), score: 0.0, precision: 0.0 },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BrollResponse {
    #[serde(flatten)]
    clip: ClipView,
    tags: Vec<ScoredTag>,
    fallback_used: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SequenceResponse {
    clips: Vec<ClipView>,
    tags: Vec<ScoredTag>,
    fallback_used: bool,
}

async fn get_broll(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BrollRequest>,
) -> axum::response::Response {
    if payload.script.trim().is_empty() {
        return bad_request("script must not be empty");
    }

    let usage = state.session(payload.session_id.as_deref()).await;
    match state.matcher.match_script(&payload.script, &usage).await {
        Ok(outcome) => Json(BrollResponse {
            clip: outcome.selection.into(),
            tags: outcome.tags.as_slice().to_vec(),
            fallback_used: outcome.fallback_used,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn get_broll_sequence(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<SequenceRequest>,
) -> axum::response::Response {
    if payload.script.trim().is_empty() {
        return bad_request("script must not be empty");
    }

    let count = payload.count.min(state.config.server.max_sequence_len);
    let usage = state.session(payload.session_id.as_deref()).await;
    match state.matcher.match_sequence(&payload.script, &usage, count).await {
        Ok(outcome) => Json(SequenceResponse {
            clips: outcome.selections.into_iter().map(|s| ClipView::from(Some(s))).collect(),
            tags: outcome.tags.as_slice().to_vec(),
            fallback_used: outcome.fallback_used,
        })
        .into_response(),
        Err(e) => error_response(e),
    }
}

async fn reset_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    let session_id = session_key(Some(&session_id));
    let existed = match state.sessions.get(&session_id).await {
        Some(usage) => {
            usage.reset_all();
            true
        }
        None => false,
    };
    tracing::info!("Usage reset requested for session {} (existed={})", session_id, existed);
    Json(serde_json::json!({ "status": "reset", "sessionId": session_id, "existed": existed }))
}

fn bad_request(message: &str) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response()
}

fn error_response(err: anyhow::Error) -> axum::response::Response {
    let status = if err.downcast_ref::<CatalogError>().is_some() {
        StatusCode::SERVICE_UNAVAILABLE
    } else if err.downcast_ref::<ClassifierError>().is_some() {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    tracing::error!("Request failed ({}): {:#}", status, err);
    (status, Json(serde_json::json!({ "error": format!("{:#}", err) }))).into_response()
}
