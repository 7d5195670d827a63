use axum::extract::{Path, State};

use super::system::{parse_day, AppState};
use crate::cluster::{Origin, PeerRequest, PeerResponse};
use crate::error::CamError;
use crate::storage::CameraId;

pub async fn list_day_chunks(
    State(state): State<AppState>,
    origin: Origin,
    Path(day): Path<String>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state
        .coordinator
        .handle(PeerRequest::GetChunks { day, camera_id: None }, origin)
        .await
}

pub async fn list_camera_chunks(
    State(state): State<AppState>,
    origin: Origin,
    Path((day, camera_id)): Path<(String, CameraId)>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    let request = PeerRequest::GetChunks { day, camera_id: Some(camera_id) };
    state.coordinator.handle(request, origin).await
}

/// Irreversible: removes the day's recordings here and on every peer.
pub async fn delete_day_chunks(
    State(state): State<AppState>,
    origin: Origin,
    Path(day): Path<String>,
) -> Result<PeerResponse, CamError> {
    let day = parse_day(&day)?;
    state.coordinator.handle(PeerRequest::DeleteChunks { day }, origin).await
}
