use axum::extract::{Json, Path, State};

use super::system::AppState;
use crate::cluster::transport::RecordingBody;
use crate::cluster::{Claim, Origin, PeerRequest, PeerResponse};
use crate::error::CamError;
use crate::storage::CameraId;

pub async fn get_recording(
    State(state): State<AppState>,
    origin: Origin,
) -> Result<PeerResponse, CamError> {
    state.coordinator.handle(PeerRequest::GetRecording, origin).await
}

pub async fn put_recording(
    State(state): State<AppState>,
    origin: Origin,
    Json(body): Json<RecordingBody>,
) -> Result<PeerResponse, CamError> {
    let request = PeerRequest::PutRecording { recording: body.recording };
    state.coordinator.handle(request, origin).await
}

pub async fn get_claim(
    State(state): State<AppState>,
    origin: Origin,
    Path(camera_id): Path<CameraId>,
) -> Result<PeerResponse, CamError> {
    state.coordinator.handle(PeerRequest::GetClaim { camera_id }, origin).await
}

pub async fn put_claim(
    State(state): State<AppState>,
    origin: Origin,
    Path(camera_id): Path<CameraId>,
    Json(claim): Json<Claim>,
) -> Result<PeerResponse, CamError> {
    if claim.srvid.is_none() {
        return Err(CamError::BadRequest("srvid is required".to_string()));
    }
    state.coordinator.handle(PeerRequest::PutClaim { camera_id, claim }, origin).await
}
