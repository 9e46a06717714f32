//! Route handlers

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use evo_core::{
    AgentMemory, AgentRecord, AgentUpdate, ApplyRequest, ApplyResult, ChangeEventRequest,
    EcosystemSnapshot, Evolution, ProjectAnalysis, SuggestionRecord,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;
use crate::SharedState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedAgents {
    pub application_id: String,
    pub created_count: usize,
    pub created: Vec<AgentRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /api/health
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "evo-server"
    }))
}

/// POST /api/agents/analyze
pub async fn analyze(
    State(state): State<SharedState>,
    body: Result<Json<ProjectAnalysis>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<CreatedAgents>)> {
    let Json(analysis) = body?;
    let created = state.engine.create_agents_from_analysis(&analysis).await?;
    info!("{} agent(s) created for {}", created.len(), analysis.application_id);

    let status = if created.is_empty() {
        StatusCode::OK
    } else {
        StatusCode::CREATED
    };
    Ok((
        status,
        Json(CreatedAgents {
            application_id: analysis.application_id,
            created_count: created.len(),
            created,
        }),
    ))
}

/// POST /api/agents/reset
pub async fn reset_agents(
    State(state): State<SharedState>,
    body: Result<Json<ProjectAnalysis>, JsonRejection>,
) -> ApiResult<Json<CreatedAgents>> {
    let Json(analysis) = body?;
    let created = state.engine.reset_agents(&analysis).await?;

    Ok(Json(CreatedAgents {
        application_id: analysis.application_id,
        created_count: created.len(),
        created,
    }))
}

/// GET /api/applications/:app/agents
pub async fn list_agents(
    State(state): State<SharedState>,
    Path(app): Path<String>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<AgentRecord>>> {
    let Query(query) = query?;
    let agents = state.engine.list_agents(&app, query.include_inactive).await?;
    Ok(Json(agents))
}

/// GET /api/applications/:app/ecosystem
pub async fn ecosystem(
    State(state): State<SharedState>,
    Path(app): Path<String>,
) -> ApiResult<Json<EcosystemSnapshot>> {
    Ok(Json(state.engine.ecosystem(&app).await?))
}

/// GET /api/agents/:id
pub async fn get_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentRecord>> {
    Ok(Json(state.engine.get_agent(&id).await?))
}

/// PATCH /api/agents/:id
pub async fn update_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    body: Result<Json<AgentUpdate>, JsonRejection>,
) -> ApiResult<Json<AgentRecord>> {
    let Json(update) = body?;
    Ok(Json(state.engine.update_agent(&id, &update).await?))
}

/// DELETE /api/agents/:id
pub async fn delete_agent(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.delete_agent(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/agents/:id/memory
pub async fn agent_memory(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentMemory>> {
    Ok(Json(state.engine.get_agent_memory(&id).await?))
}

/// POST /api/agents/:id/reset
pub async fn reset_agent_status(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> ApiResult<Json<AgentRecord>> {
    Ok(Json(state.engine.reset_agent_status(&id).await?))
}

/// POST /api/evolution/track
pub async fn track(
    State(state): State<SharedState>,
    body: Result<Json<ChangeEventRequest>, JsonRejection>,
) -> ApiResult<Json<Evolution>> {
    let Json(request) = body?;
    let event = request.into_event()?;
    Ok(Json(state.engine.track(event).await?))
}

/// GET /api/applications/:app/history
pub async fn history(
    State(state): State<SharedState>,
    Path(app): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<Evolution>>> {
    let Query(query) = query?;
    Ok(Json(state.engine.history(&app, query.limit).await?))
}

/// GET /api/applications/:app/suggestions
pub async fn suggestions(
    State(state): State<SharedState>,
    Path(app): Path<String>,
    query: Result<Query<LimitQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<SuggestionRecord>>> {
    let Query(query) = query?;
    Ok(Json(state.engine.suggest(&app, query.limit).await?))
}

/// POST /api/evolution/apply
pub async fn apply(
    State(state): State<SharedState>,
    body: Result<Json<ApplyRequest>, JsonRejection>,
) -> ApiResult<Json<ApplyResult>> {
    let Json(request) = body?;
    Ok(Json(state.engine.apply(&request).await?))
}
