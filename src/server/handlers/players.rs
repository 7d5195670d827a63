use axum::extract::{Json, Path, State};

use super::system::AppState;
use crate::cluster::{Origin, PeerRequest, PeerResponse};
use crate::error::CamError;
use crate::storage::{Player, PlayerId};

pub async fn list_players(
    State(state): State<AppState>,
    origin: Origin,
) -> Result<PeerResponse, CamError> {
    state.coordinator.handle(PeerRequest::ListPlayers, origin).await
}

pub async fn get_player(
    State(state): State<AppState>,
    origin: Origin,
    Path(player_id): Path<PlayerId>,
) -> Result<PeerResponse, CamError> {
    state.coordinator.handle(PeerRequest::GetPlayer { player_id }, origin).await
}

pub async fn post_player(
    State(state): State<AppState>,
    origin: Origin,
    Path(player_id): Path<PlayerId>,
    Json(body): Json<Player>,
) -> Result<PeerResponse, CamError> {
    state
        .coordinator
        .handle(PeerRequest::PostPlayer { player_id, body }, origin)
        .await
}
