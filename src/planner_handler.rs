//! Planner sessions over HTTP.

use crate::errors::AppError;
use crate::handlers::{json_body, AppState};
use crate::models::{AffordabilityForm, AffordabilityProjection, Goal};
use crate::planner::{AffordabilityPlanner, PlanSnapshot};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct CreatePlanRequest {
    #[serde(default)]
    pub goal: Option<Goal>,
}

#[derive(Debug, Deserialize)]
pub struct GoalRequest {
    pub goal: Goal,
}

#[derive(Debug, Deserialize)]
pub struct LocationRequest {
    pub location: String,
}

async fn find_plan(state: &AppState, id: Uuid) -> Result<Arc<AffordabilityPlanner>, AppError> {
    state
        .plans
        .get(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", id)))
}

/// POST /api/v1/plans
pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<CreatePlanRequest>>,
) -> Result<(StatusCode, Json<PlanSnapshot>), AppError> {
    let request = payload.map(|Json(r)| r).unwrap_or_default();
    let planner = Arc::new(state.new_planner());

    if let Some(goal) = request.goal {
        planner.select_goal(goal).await?;
    }

    state.plans.insert(planner.id(), planner.clone()).await;
    tracing::info!(plan = %planner.id(), "Plan session created");

    Ok((StatusCode::CREATED, Json(planner.snapshot().await)))
}

/// GET /api/v1/plans/:id
pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanSnapshot>, AppError> {
    let planner = find_plan(&state, id).await?;
    Ok(Json(planner.snapshot().await))
}

/// POST /api/v1/plans/:id/goal
pub async fn select_goal(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<GoalRequest>, JsonRejection>,
) -> Result<Json<PlanSnapshot>, AppError> {
    let request = json_body(payload)?;
    let planner = find_plan(&state, id).await?;
    planner.select_goal(request.goal).await?;
    Ok(Json(planner.snapshot().await))
}

/// POST /api/v1/plans/:id/analysis
///
/// Answers once the projection is ready; the house search continues in the
/// background and shows up in later snapshots.
pub async fn submit_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<AffordabilityForm>, JsonRejection>,
) -> Result<Json<AffordabilityProjection>, AppError> {
    let form = json_body(payload)?;
    let planner = find_plan(&state, id).await?;
    Ok(Json(planner.submit_analysis(&form).await?))
}

/// PUT /api/v1/plans/:id/location
pub async fn edit_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    payload: Result<Json<LocationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PlanSnapshot>), AppError> {
    let request = json_body(payload)?;
    let planner = find_plan(&state, id).await?;
    planner.edit_location(&request.location).await?;
    Ok((StatusCode::ACCEPTED, Json(planner.snapshot().await)))
}

/// POST /api/v1/plans/:id/reset
pub async fn reset_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanSnapshot>, AppError> {
    let planner = find_plan(&state, id).await?;
    planner.back_to_selection().await;
    Ok(Json(planner.snapshot().await))
}

/// DELETE /api/v1/plans/:id
pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let planner = state
        .plans
        .remove(&id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Plan {} not found", id)))?;
    planner.back_to_selection().await;
    tracing::info!(plan = %id, "Plan session deleted");
    Ok(StatusCode::NO_CONTENT)
}
