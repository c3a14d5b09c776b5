//! HTTP query server.
//!
//! Exposes the discovery index via a JSON HTTP API suitable for integration
//! with Cursor, Claude, and other MCP-compatible AI tools.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/tools/list` | Describe the query tool and its parameter schema |
//! | `POST` | `/tools/find_service` | Resolve a capability description to a server |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! Error responses carry a machine-readable code and a message:
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "description must not be empty" } }
//! ```
//!
//! A query that matches nothing is not an error: it returns `200` with
//! `"status": "not_found"`.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted to support browser-based
//! clients and cross-origin MCP tool calls.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use crate::database::Database;
use crate::docs::fetch_readme;
use crate::models::SearchHit;
use crate::search::promote_documented;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
struct AppState {
    db: Arc<Database>,
}

/// Starts the HTTP server over an already-initialized database.
///
/// Binds to the address configured in `[server].bind` and runs until the
/// process is terminated.
pub async fn run_server(db: Database) -> anyhow::Result<()> {
    let bind_addr = db.config().server.bind.clone();
    let state = AppState { db: Arc::new(db) };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/tools/list", get(handle_list_tools))
        .route("/tools/find_service", post(handle_find_service))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state);

    info!(addr = bind_addr, "listening");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    entries: usize,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        entries: state.db.catalog().entry_count(),
    })
}

// ============ GET /tools/list ============

#[derive(Serialize)]
struct ToolInfo {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize)]
struct ToolListResponse {
    tools: Vec<ToolInfo>,
}

async fn handle_list_tools() -> Json<ToolListResponse> {
    let tools = vec![ToolInfo {
        name: "find_service".to_string(),
        description: "Find an MCP server matching a capability description"
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "What the desired server should be able to do",
                },
                "example_question": {
                    "type": "string",
                    "description": "An example question the server should answer",
                },
            },
            "required": ["description"],
        }),
    }];
    Json(ToolListResponse { tools })
}

// ============ POST /tools/find_service ============

#[derive(Deserialize)]
struct FindServiceRequest {
    description: String,
    #[serde(default)]
    example_question: Option<String>,
}

#[derive(Serialize)]
struct ServiceMatch {
    name: String,
    description: String,
    url: String,
    category: String,
    source: String,
    score: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    readme: Option<String>,
}

impl ServiceMatch {
    fn from_hit(hit: &SearchHit, readme: Option<String>) -> Self {
        Self {
            name: hit.entry.name.clone(),
            description: hit.entry.description.clone(),
            url: hit.entry.url.clone(),
            category: hit.entry.category.clone(),
            source: hit.entry.source.clone(),
            score: hit.score,
            readme,
        }
    }
}

#[derive(Serialize)]
struct FindServiceResponse {
    status: String,
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ServiceMatch>,
    alternatives: Vec<ServiceMatch>,
}

/// Handler for `POST /tools/find_service`.
///
/// Combines the description and example question into one query, searches
/// the index, then probes for documentation among the top candidates: a
/// near-tied candidate with a reachable README is promoted to primary. The
/// primary match carries its README text; alternatives carry metadata only.
async fn handle_find_service(
    State(state): State<AppState>,
    Json(request): Json<FindServiceRequest>,
) -> Result<Json<FindServiceResponse>, AppError> {
    if request.description.trim().is_empty() {
        return Err(bad_request("description must not be empty"));
    }

    let query = match request.example_question.as_deref() {
        Some(q) if !q.trim().is_empty() => {
            format!("{} {}", request.description.trim(), q.trim())
        }
        _ => request.description.trim().to_string(),
    };

    let search = &state.db.config().search;
    let mut hits = state.db.search(&query, search.max_alternatives + 1);
    debug!(query, hits = hits.len(), "find_service query");

    if hits.is_empty() {
        return Ok(Json(FindServiceResponse {
            status: "not_found".to_string(),
            query,
            result: None,
            alternatives: Vec::new(),
        }));
    }

    let readmes = probe_readmes(&state, &hits, search.promote_window).await;
    let has_docs: Vec<bool> = hits
        .iter()
        .map(|h| readmes.contains_key(&h.entry.url))
        .collect();
    promote_documented(&mut hits, &has_docs, search.promote_window, search.promote_margin);

    let mut readmes = readmes;
    let primary = hits.remove(0);
    let readme = readmes.remove(&primary.entry.url);

    let alternatives = hits
        .iter()
        .take(search.max_alternatives)
        .map(|h| ServiceMatch::from_hit(h, None))
        .collect();

    Ok(Json(FindServiceResponse {
        status: "found".to_string(),
        query,
        result: Some(ServiceMatch::from_hit(&primary, readme)),
        alternatives,
    }))
}

/// Fetch READMEs for promotion candidates, keyed by entry URL.
///
/// When the top hit is documented no promotion can occur, so the rest of
/// the window is not probed.
async fn probe_readmes(
    state: &AppState,
    hits: &[SearchHit],
    window: usize,
) -> HashMap<String, String> {
    let mut readmes = HashMap::new();
    let probe = hits.len().min(window.max(1));
    if probe == 0 {
        return readmes;
    }

    if let Some(text) = fetch_readme(state.db.client(), &hits[0].entry.url).await {
        readmes.insert(hits[0].entry.url.clone(), text);
        return readmes;
    }

    for hit in &hits[1..probe] {
        if let Some(text) = fetch_readme(state.db.client(), &hit.entry.url).await {
            readmes.insert(hit.entry.url.clone(), text);
        }
    }
    readmes
}
