//! HTTP surface for graph viewers.
//!
//! Serves the whole graph as one JSON document. Store calls block on SQLite,
//! so every handler moves them onto the blocking thread pool.
//!
//! Usage: `callgraph-db serve --bind 127.0.0.1:8080`

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;

use crate::error::Result;
use crate::graph::store::GraphStore;
use crate::types::{GraphResponse, GraphStats};

type HandlerResult<T> = std::result::Result<Json<T>, (StatusCode, String)>;

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Routes: `/api/graph` (full graph), `/api/stats`, `/api/health`.
pub fn router(store: Arc<GraphStore>) -> Router {
    Router::new()
        .route("/api/graph", get(get_graph))
        .route("/api/stats", get(get_stats))
        .route("/api/health", get(health))
        .with_state(store)
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(store: Arc<GraphStore>, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;
    tracing::info!("graph API listening on http://{}/api/graph", local);
    eprintln!("Call graph available at http://{}/api/graph", local);

    axum::serve(listener, router(store))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down HTTP server");
        })
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_graph(State(store): State<Arc<GraphStore>>) -> HandlerResult<GraphResponse> {
    blocking(store, |store| store.get_all_data()).await
}

async fn get_stats(State(store): State<Arc<GraphStore>>) -> HandlerResult<GraphStats> {
    blocking(store, |store| store.stats()).await
}

async fn health() -> &'static str {
    "OK"
}

async fn blocking<T, F>(store: Arc<GraphStore>, f: F) -> HandlerResult<T>
where
    T: Send + 'static,
    F: FnOnce(&GraphStore) -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || f(&store)).await {
        Ok(Ok(value)) => Ok(Json(value)),
        Ok(Err(e)) => {
            tracing::warn!("graph request failed: {e}");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
        Err(e) => Err((StatusCode::INTERNAL_SERVER_ERROR, format!("worker failed: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
