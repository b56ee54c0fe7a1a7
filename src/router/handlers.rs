//! Request handlers for the mission submission/halt entry surface

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;
use uuid::Uuid;

use crate::error::{Result, SubmissionError};
use crate::mission::payload;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitMissionRequest {
    pub image: String,
    pub mission_payload: Value,
    pub issuer_id: String,
}

/// `POST /missions`: validate the payload shape at the boundary (spec §1
/// "payload shape validation" is out of the core's scope, performed here),
/// then delegate to `ProcessManager::schedule`.
pub async fn submit_mission(
    State(state): State<AppState>,
    Json(request): Json<SubmitMissionRequest>,
) -> Result<Json<Value>> {
    payload::validate(&request.mission_payload)
        .map_err(SubmissionError::InvalidPayload)?;

    let id = state
        .manager
        .schedule(request.image, request.mission_payload, request.issuer_id)
        .await
        .map_err(|err| match err {
            crate::mission::ManagerError::DuplicateOperation(op) => {
                SubmissionError::DuplicateOperation(op)
            }
            other => SubmissionError::Internal(other.to_string()),
        })?;

    match id {
        Some(id) => Ok(Json(json!({ "id": id }))),
        None => Ok(Json(json!({ "id": null, "reason": "image unavailable" }))),
    }
}

/// `POST /missions/:id/halt`.
pub async fn halt_mission(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>> {
    let halted = state.manager.halt(id);
    if !halted {
        warn!(id = %id, "halt requested for a process that is not active");
    }
    Ok(Json(json!({ "halted": halted })))
}

/// `GET /missions`: `processes_info()` (spec §4.5).
pub async fn list_processes(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.manager.processes_info()))
}

#[derive(Debug, Deserialize)]
pub struct QueueQuery {
    pub issuer_id: String,
}

/// `GET /missions/queue?issuer_id=...`: `get_queue_for` (spec §4.5).
pub async fn list_queue_for(
    State(state): State<AppState>,
    Query(query): Query<QueueQuery>,
) -> Json<Value> {
    let items: Vec<_> = state
        .manager
        .get_queue_for(&query.issuer_id)
        .into_iter()
        .map(|item| {
            json!({
                "id": item.id,
                "effective_start_time": item.effective_start_time,
                "image": item.image,
            })
        })
        .collect();
    Json(json!(items))
}
