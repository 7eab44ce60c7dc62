//! HTTP handlers for the memory API
//!
//! - POST   /memory/context       context to inject before a message
//! - POST   /memory/process       count an exchanged message
//! - POST   /memory/checkpoint    curate and store memories
//! - GET    /memory/stats         store and session statistics
//! - GET    /memory/sessions      live sessions
//! - DELETE /memory/sessions/:id  drop a session's state

use super::coordinator::{ContextKind, SessionCoordinator};
use crate::config::SelectionMode;
use crate::curator::{CurationSource, CurationTrigger};
use crate::retrieval::{SelectedMemory, SelectionTier};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Shared state for memory handlers
#[derive(Clone)]
pub struct MemoryState {
    pub coordinator: Arc<SessionCoordinator>,
}

/// Create the memory API router
pub fn memory_router(state: MemoryState) -> Router {
    Router::new()
        .route("/memory/context", post(get_context))
        .route("/memory/process", post(process_message))
        .route("/memory/checkpoint", post(checkpoint))
        .route("/memory/stats", get(stats))
        .route("/memory/sessions", get(list_sessions))
        .route("/memory/sessions/:id", delete(close_session))
        .with_state(state)
}

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ContextRequest {
    pub session_id: String,
    pub project_id: String,
    #[serde(default)]
    pub current_message: String,
    #[serde(default)]
    pub max_memories: Option<usize>,
    #[serde(default)]
    pub mode: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub session_id: String,
    pub message_count: u64,
    pub context_text: String,
    pub has_memories: bool,
    pub kind: ContextKind,
    pub memories_count: usize,
    pub memories: Vec<InjectedMemory>,
}

/// One injected memory and why it was picked
#[derive(Debug, Serialize)]
pub struct InjectedMemory {
    pub id: Uuid,
    pub tier: SelectionTier,
    pub score: f32,
    pub reasoning: String,
}

impl From<&SelectedMemory> for InjectedMemory {
    fn from(selected: &SelectedMemory) -> Self {
        Self {
            id: selected.record.id,
            tier: selected.tier,
            score: selected.score,
            reasoning: selected.reasoning.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub session_id: String,
    pub project_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckpointRequest {
    pub session_id: String,
    pub project_id: String,
    #[serde(default)]
    pub trigger: Option<String>,
    /// Agent CLI session to resume for curation
    #[serde(default)]
    pub claude_session_id: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub transcript_path: Option<String>,
}

impl CheckpointRequest {
    /// Resuming the agent session wins over reading a transcript
    fn source(&self) -> Option<CurationSource> {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        if let Some(handle) = non_empty(&self.claude_session_id) {
            return Some(CurationSource::Session {
                handle,
                cwd: non_empty(&self.cwd).map(PathBuf::from),
            });
        }
        non_empty(&self.transcript_path).map(|p| CurationSource::Transcript(PathBuf::from(p)))
    }
}

#[derive(Debug, Serialize)]
pub struct CheckpointResponse {
    pub success: bool,
    pub trigger: CurationTrigger,
    pub memories_curated: usize,
    pub message: String,
}

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(serde_json::json!({"error": {"code": code, "message": message.into()}})),
    )
        .into_response()
}

fn require_ids(session_id: &str, project_id: &str) -> Option<Response> {
    if session_id.trim().is_empty() || project_id.trim().is_empty() {
        return Some(error_response(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "session_id and project_id are required",
        ));
    }
    None
}

// =============================================================================
// Handlers
// =============================================================================

/// POST /memory/context
async fn get_context(
    State(state): State<MemoryState>,
    Json(request): Json<ContextRequest>,
) -> Response {
    if let Some(resp) = require_ids(&request.session_id, &request.project_id) {
        return resp;
    }
    let mode = match request.mode.as_deref().map(str::parse::<SelectionMode>) {
        None => None,
        Some(Ok(mode)) => Some(mode),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, "BAD_REQUEST", e.to_string()),
    };

    let result = state
        .coordinator
        .get_context(
            &request.session_id,
            &request.project_id,
            &request.current_message,
            request.max_memories,
            mode,
        )
        .await;

    Json(ContextResponse {
        has_memories: result.has_memories(),
        memories_count: result.memories.len(),
        memories: result.memories.iter().map(InjectedMemory::from).collect(),
        session_id: result.session_id,
        message_count: result.message_count,
        context_text: result.context_text,
        kind: result.kind,
    })
    .into_response()
}

/// POST /memory/process
async fn process_message(
    State(state): State<MemoryState>,
    Json(request): Json<ProcessRequest>,
) -> Response {
    if let Some(resp) = require_ids(&request.session_id, &request.project_id) {
        return resp;
    }
    let count = state
        .coordinator
        .track_message(&request.session_id, &request.project_id)
        .await;
    Json(serde_json::json!({"success": true, "message_count": count})).into_response()
}

/// POST /memory/checkpoint
async fn checkpoint(
    State(state): State<MemoryState>,
    Json(request): Json<CheckpointRequest>,
) -> Response {
    if let Some(resp) = require_ids(&request.session_id, &request.project_id) {
        return resp;
    }
    let trigger = CurationTrigger::from_label(request.trigger.as_deref().unwrap_or_default());
    let source = request.source();
    let has_source = source.is_some();

    let outcome = state
        .coordinator
        .checkpoint(&request.session_id, &request.project_id, trigger, source)
        .await;

    let message = match (has_source, outcome.memories_curated) {
        (false, _) => "No curation source provided".to_string(),
        (true, 0) => "No memories curated".to_string(),
        (true, n) => format!("Curated {} memories", n),
    };
    Json(CheckpointResponse {
        success: true,
        trigger,
        memories_curated: outcome.memories_curated,
        message,
    })
    .into_response()
}

/// GET /memory/stats
async fn stats(State(state): State<MemoryState>) -> Response {
    match state.coordinator.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE", e.to_string()),
    }
}

/// GET /memory/sessions
async fn list_sessions(State(state): State<MemoryState>) -> impl IntoResponse {
    Json(state.coordinator.list_sessions().await)
}

/// DELETE /memory/sessions/:id
async fn close_session(State(state): State<MemoryState>, Path(id): Path<String>) -> Response {
    if state.coordinator.close_session(&id).await {
        Json(serde_json::json!({"closed": true, "session_id": id})).into_response()
    } else {
        error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("Session '{}' not found", id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoriaConfig;
    use crate::curator::testing::ScriptedAgent;
    use crate::memory::{FileMemoryStore, HashingEmbedder};
    use axum::body::Body;
    use axum::http::Request;
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    const REPLY: &str = r#"{"session_summary": "Set up CI", "memories": [
        {"content": "CI runs on every push to main", "importance_weight": 0.8,
         "trigger_phrases": ["ci pipeline"], "semantic_tags": ["ci"]}]}"#;

    async fn make_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FileMemoryStore::open(dir.path().to_path_buf()).await.unwrap());
        let coordinator = SessionCoordinator::new(
            &MemoriaConfig::default(),
            store,
            Arc::new(HashingEmbedder::new(384)),
            ScriptedAgent::replying(REPLY),
            CancellationToken::new(),
        )
        .unwrap();
        let state = MemoryState {
            coordinator: Arc::new(coordinator),
        };
        (memory_router(state), dir)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 64).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_context_first_session_is_empty() {
        let (app, _dir) = make_app().await;
        let resp = app
            .oneshot(post_json(
                "/memory/context",
                serde_json::json!({"session_id": "s1", "project_id": "p", "current_message": "hi"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["has_memories"], false);
        assert_eq!(json["kind"], "empty");
        assert_eq!(json["context_text"], "");
    }

    #[tokio::test]
    async fn test_context_rejects_bad_mode() {
        let (app, _dir) = make_app().await;
        let resp = app
            .oneshot(post_json(
                "/memory/context",
                serde_json::json!({"session_id": "s1", "project_id": "p", "mode": "lavish"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_missing_ids() {
        let (app, _dir) = make_app().await;
        let resp = app
            .oneshot(post_json(
                "/memory/process",
                serde_json::json!({"session_id": "", "project_id": "p"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_checkpoint_flow() {
        let (app, _dir) = make_app().await;

        let resp = app
            .clone()
            .oneshot(post_json(
                "/memory/checkpoint",
                serde_json::json!({
                    "session_id": "s1", "project_id": "p",
                    "trigger": "pre_compact", "claude_session_id": "cli-1"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["success"], true);
        assert_eq!(json["trigger"], "pre_compact");
        assert_eq!(json["memories_curated"], 1);

        let resp = app
            .clone()
            .oneshot(post_json(
                "/memory/context",
                serde_json::json!({"session_id": "s2", "project_id": "p", "current_message": "hi"}),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["kind"], "primer");
        assert!(json["context_text"].as_str().unwrap().contains("Set up CI"));

        let resp = app
            .clone()
            .oneshot(post_json(
                "/memory/process",
                serde_json::json!({"session_id": "s2", "project_id": "p"}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(resp).await["message_count"], 1);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/memory/stats").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["total_curated_memories"], 1);
        assert_eq!(json["active_sessions"], 1);
    }

    #[tokio::test]
    async fn test_context_lists_injected_memories() {
        let (app, _dir) = make_app().await;
        app.clone()
            .oneshot(post_json(
                "/memory/checkpoint",
                serde_json::json!({"session_id": "s1", "project_id": "p", "claude_session_id": "cli-1"}),
            ))
            .await
            .unwrap();

        // Past the first message, so retrieval runs instead of the primer
        app.clone()
            .oneshot(post_json(
                "/memory/process",
                serde_json::json!({"session_id": "s2", "project_id": "p"}),
            ))
            .await
            .unwrap();
        let resp = app
            .oneshot(post_json(
                "/memory/context",
                serde_json::json!({
                    "session_id": "s2", "project_id": "p",
                    "current_message": "the ci pipeline is failing again"
                }),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["kind"], "memories");
        assert_eq!(json["memories_count"], 1);
        let memory = &json["memories"][0];
        assert!(memory["id"].is_string());
        assert!(memory["score"].as_f64().unwrap() >= 0.3);
        assert!(memory["reasoning"]
            .as_str()
            .unwrap()
            .contains("Strong trigger phrase match"));
    }

    #[tokio::test]
    async fn test_checkpoint_without_source() {
        let (app, _dir) = make_app().await;
        let resp = app
            .oneshot(post_json(
                "/memory/checkpoint",
                serde_json::json!({"session_id": "s1", "project_id": "p", "trigger": "whenever"}),
            ))
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json["trigger"], "session_end");
        assert_eq!(json["memories_curated"], 0);
    }

    #[tokio::test]
    async fn test_sessions_list_and_close() {
        let (app, _dir) = make_app().await;
        app.clone()
            .oneshot(post_json(
                "/memory/process",
                serde_json::json!({"session_id": "s1", "project_id": "p"}),
            ))
            .await
            .unwrap();

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/memory/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = body_json(resp).await;
        assert_eq!(json[0]["session_id"], "s1");
        assert_eq!(json[0]["message_count"], 1);

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri("/memory/sessions/s1")
                .body(Body::empty())
                .unwrap()
        };
        let resp = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let resp = app.oneshot(delete()).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_checkpoint_source_priority() {
        let request = CheckpointRequest {
            session_id: "s".into(),
            project_id: "p".into(),
            trigger: None,
            claude_session_id: Some("  ".into()),
            cwd: None,
            transcript_path: Some("/tmp/t.jsonl".into()),
        };
        assert_eq!(
            request.source(),
            Some(CurationSource::Transcript(PathBuf::from("/tmp/t.jsonl")))
        );
    }
}
