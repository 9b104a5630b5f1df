use anyhow::{Context, Result};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use docsearch::persist;
use docsearch::{EnvVersion, QueryEngine, ScoringConfig};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub index_path: PathBuf,
    pub admin_token: Option<String>,
    pub load_timeout: Duration,
    pub scoring: ScoringConfig,
}

impl ServerConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            admin_token: None,
            load_timeout: Duration::from_secs(30),
            scoring: ScoringConfig::default(),
        }
    }
}

/// The served index. Reloading swaps the whole engine; queries already running keep their snapshot.
#[derive(Clone)]
pub struct IndexHandle {
    path: PathBuf,
    scoring: ScoringConfig,
    engine: Arc<RwLock<Arc<QueryEngine>>>,
}

impl IndexHandle {
    pub fn new(path: PathBuf, scoring: ScoringConfig, engine: QueryEngine) -> Self {
        Self { path, scoring, engine: Arc::new(RwLock::new(Arc::new(engine))) }
    }

    pub fn engine(&self) -> Arc<QueryEngine> {
        self.engine.read().clone()
    }

    /// Load the index file from disk, bounded by `timeout`.
    pub async fn load(path: PathBuf, scoring: ScoringConfig, timeout: Duration) -> Result<QueryEngine> {
        let task = tokio::task::spawn_blocking(move || persist::open_engine(&path, scoring));
        tokio::time::timeout(timeout, task)
            .await
            .context("timed out loading index")?
            .context("index loader panicked")?
    }

    /// Replace the served engine with a fresh load. On failure the current engine stays.
    pub async fn reload(&self, timeout: Duration) -> Result<usize> {
        let engine = Self::load(self.path.clone(), self.scoring, timeout).await?;
        let num_docs = engine.index().num_docs();
        *self.engine.write() = Arc::new(engine);
        tracing::info!(path = %self.path.display(), num_docs, "index reloaded");
        Ok(num_docs)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub index: IndexHandle,
    pub admin_token: Option<String>,
    pub load_timeout: Duration,
}

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
    pub objects: Vec<ObjectResult>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: u32,
    pub name: String,
    pub filename: String,
    pub title: String,
    pub score: f32,
    pub matched_terms: usize,
}

#[derive(Serialize)]
pub struct ObjectResult {
    pub name: String,
    pub doc_id: u32,
    pub filename: String,
    pub anchor: String,
    pub kind: String,
    pub score: i32,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, msg: impl std::fmt::Display) -> ApiError {
    (status, Json(serde_json::json!({ "error": msg.to_string() })))
}

pub async fn build_app(config: ServerConfig) -> Result<Router> {
    // Load index at startup
    let engine = IndexHandle::load(config.index_path.clone(), config.scoring, config.load_timeout).await?;
    tracing::info!(path = %config.index_path.display(), num_docs = engine.index().num_docs(), "index loaded");
    let state = AppState {
        index: IndexHandle::new(config.index_path, config.scoring, engine),
        admin_token: config.admin_token,
        load_timeout: config.load_timeout,
    };
    Ok(router(state))
}

pub fn router(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/stats", get(stats_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn search_handler(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Result<Json<SearchResponse>, ApiError> {
    let start = Instant::now();
    let engine = state.index.engine();
    let hits = engine.search(&params.q).map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;
    let k = params.k.clamp(1, 100);
    let total_hits = hits.len();
    let docs = &engine.index().docs;

    let results = hits
        .into_iter()
        .take(k)
        .filter_map(|hit| {
            let doc = docs.resolve(hit.doc_id)?;
            Some(SearchHit {
                doc_id: hit.doc_id,
                name: doc.name.clone(),
                filename: doc.filename.clone(),
                title: doc.title.clone(),
                score: hit.score,
                matched_terms: hit.matched_terms,
            })
        })
        .collect();
    let objects = engine
        .search_objects(&params.q)
        .into_iter()
        .take(k)
        .filter_map(|hit| {
            let doc = docs.resolve(hit.doc_id)?;
            Some(ObjectResult {
                name: hit.name,
                doc_id: hit.doc_id,
                filename: doc.filename.clone(),
                anchor: hit.anchor,
                kind: hit.display,
                score: hit.score,
            })
        })
        .collect();

    let elapsed = start.elapsed();
    Ok(Json(SearchResponse { query: params.q, took_s: elapsed.as_secs_f64(), total_hits, results, objects }))
}

pub async fn doc_handler(State(state): State<AppState>, Path(doc_id): Path<u32>) -> Result<Json<serde_json::Value>, ApiError> {
    let engine = state.index.engine();
    let doc = engine
        .index()
        .docs
        .resolve(doc_id)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "not found"))?;
    Ok(Json(serde_json::json!({
        "doc_id": doc.id,
        "name": doc.name,
        "filename": doc.filename,
        "title": doc.title,
    })))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let engine = state.index.engine();
    let index = engine.index();
    let envversion = match &index.envversion {
        EnvVersion::Single(v) => serde_json::json!(v),
        EnvVersion::PerSubsystem(map) => serde_json::json!(map),
    };
    Json(serde_json::json!({
        "num_docs": index.num_docs(),
        "num_terms": index.terms.num_terms(),
        "num_title_terms": index.titleterms.num_terms(),
        "num_objects": index.objects.len(),
        "envversion": envversion,
    }))
}

// --- Admin endpoints ---
async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    authorize(&state, &headers)?;
    let num_docs = state.index.reload(state.load_timeout).await.map_err(|e| {
        tracing::error!(error = %format!("{e:#}"), "reload failed");
        api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
    })?;
    Ok(Json(serde_json::json!({ "reloaded": true, "num_docs": num_docs })))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err(api_error(StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set")),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err(api_error(StatusCode::UNAUTHORIZED, "invalid admin token"))
    }
}
