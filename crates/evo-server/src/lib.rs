//! # evo-server
//!
//! JSON-over-HTTP boundary for the evolution engine. The change-event relay
//! posts to `/api/evolution/track`; operators manage agents under
//! `/api/agents` and read the ledger under `/api/applications/:app`.

pub mod error;
pub mod routes;

use axum::routing::{get, post};
use axum::Router;
use evo_engine::EvolutionEngine;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::{ApiError, ApiResult};

/// Shared application state
pub struct AppState {
    pub engine: EvolutionEngine,
}

pub type SharedState = Arc<AppState>;

/// Build the router over an engine
pub fn router(engine: EvolutionEngine) -> Router {
    let state = Arc::new(AppState { engine });

    Router::new()
        .route("/api/health", get(routes::health))
        .route("/api/agents/analyze", post(routes::analyze))
        .route("/api/agents/reset", post(routes::reset_agents))
        .route(
            "/api/agents/:id",
            get(routes::get_agent)
                .patch(routes::update_agent)
                .delete(routes::delete_agent),
        )
        .route("/api/agents/:id/memory", get(routes::agent_memory))
        .route("/api/agents/:id/reset", post(routes::reset_agent_status))
        .route("/api/applications/:app/agents", get(routes::list_agents))
        .route("/api/applications/:app/ecosystem", get(routes::ecosystem))
        .route("/api/applications/:app/history", get(routes::history))
        .route("/api/applications/:app/suggestions", get(routes::suggestions))
        .route("/api/evolution/track", post(routes::track))
        .route("/api/evolution/apply", post(routes::apply))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until ctrl-c
pub async fn serve(engine: EvolutionEngine, addr: &str) -> anyhow::Result<()> {
    let app = router(engine);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("evo-server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;
    Ok(())
}
