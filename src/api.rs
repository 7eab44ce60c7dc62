//! Unified API router for Memoria
//!
//! ## Endpoint Map
//!
//! | Path                      | Description                          |
//! |---------------------------|--------------------------------------|
//! | `/health`                 | Liveness check                       |
//! | `/memory/context`         | Context to inject before a message   |
//! | `/memory/process`         | Message counter                      |
//! | `/memory/checkpoint`      | Curation and storage                 |
//! | `/memory/stats`           | Store and session statistics         |
//! | `/memory/sessions[/:id]`  | Live sessions                        |

use crate::session::{memory_router, MemoryState, SessionCoordinator};
use axum::{
    http::{header, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the complete HTTP application
pub fn build_app(coordinator: Arc<SessionCoordinator>, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .merge(memory_router(MemoryState { coordinator }))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(cors_origins))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_check() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// CORS
// =============================================================================

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() {
        cors.allow_origin(Any)
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MemoriaConfig;
    use crate::curator::testing::ScriptedAgent;
    use crate::memory::{HashingEmbedder, InMemoryStore};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    fn make_app() -> Router {
        let coordinator = SessionCoordinator::new(
            &MemoriaConfig::default(),
            Arc::new(InMemoryStore::new()),
            Arc::new(HashingEmbedder::new(64)),
            ScriptedAgent::failing(),
            CancellationToken::new(),
        )
        .unwrap();
        build_app(Arc::new(coordinator), &[])
    }

    #[tokio::test]
    async fn test_health_check() {
        let resp = make_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 64).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_memory_routes_are_mounted() {
        let resp = make_app()
            .oneshot(Request::builder().uri("/memory/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[test]
    fn test_build_cors_with_origins() {
        let _cors = build_cors(&["http://localhost:3000".to_string()]);
        let _any = build_cors(&[]);
    }
}
