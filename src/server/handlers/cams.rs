use axum::extract::{Json, Path, State};

use super::system::{parse_day, AppState};
use crate::cluster::{Origin, PeerRequest, PeerResponse};
use crate::error::CamError;
use crate::storage::{CameraAssignment, CameraId};

pub async fn list_days(
    State(state): State<AppState>,
    origin: Origin,
) -> Result<PeerResponse, CamError> {
    state.coordinator.handle(PeerRequest::ListDays, origin).await
}

pub async fn get_day_assignments(
    State(state): State<AppState>,
    origin: Origin,
    Path(day): Path<String>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state.coordinator.handle(PeerRequest::GetAssignments { day }, origin).await
}

pub async fn get_assignment(
    State(state): State<AppState>,
    origin: Origin,
    Path((day, camera_id)): Path<(String, CameraId)>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state
        .coordinator
        .handle(PeerRequest::GetAssignment { day, camera_id }, origin)
        .await
}

pub async fn post_assignment(
    State(state): State<AppState>,
    origin: Origin,
    Path((day, camera_id)): Path<(String, CameraId)>,
    Json(body): Json<CameraAssignment>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state
        .coordinator
        .handle(PeerRequest::PostAssignment { day, camera_id, body }, origin)
        .await
}
