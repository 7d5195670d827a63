use axum::extract::{Json, Path, State};

use super::system::{parse_day, AppState};
use crate::cluster::{Origin, PeerRequest, PeerResponse};
use crate::error::CamError;
use crate::storage::{MatId, MatPatch};

pub async fn get_mats(
    State(state): State<AppState>,
    origin: Origin,
    Path(day): Path<String>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state.coordinator.handle(PeerRequest::GetMats { day }, origin).await
}

pub async fn get_mat(
    State(state): State<AppState>,
    origin: Origin,
    Path((day, mat_id)): Path<(String, MatId)>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state.coordinator.handle(PeerRequest::GetMat { day, mat_id }, origin).await
}

pub async fn patch_mat(
    State(state): State<AppState>,
    origin: Origin,
    Path((day, mat_id)): Path<(String, MatId)>,
    Json(patch): Json<MatPatch>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state
        .coordinator
        .handle(PeerRequest::PatchMat { day, mat_id, patch }, origin)
        .await
}
