use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use std::convert::Infallible;

use crate::cluster::transport::RecordingBody;
use crate::cluster::{NodeId, Origin, PeerResponse, PEER_ORIGIN_HEADER};

impl IntoResponse for PeerResponse {
    fn into_response(self) -> Response {
        match self {
            PeerResponse::Recording(recording) => Json(RecordingBody { recording }).into_response(),
            PeerResponse::Claim(claim) => Json(claim).into_response(),
            PeerResponse::Days(days) => Json(days).into_response(),
            PeerResponse::Assignments(table) => Json(table).into_response(),
            PeerResponse::Assignment(entry) => Json(entry).into_response(),
            PeerResponse::Chunks(chunks) => Json(chunks).into_response(),
            PeerResponse::Players(players) => Json(players).into_response(),
            PeerResponse::Player(player) => Json(player).into_response(),
            PeerResponse::Mats(mats) => Json(mats).into_response(),
            PeerResponse::Mat(mat) => Json(mat).into_response(),
            PeerResponse::Done => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Requests carrying `X-Peer-Origin: <node id>` come from a peer; anything
/// else is external.
impl<S> FromRequestParts<S> for Origin
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let origin = parts
            .headers
            .get(PEER_ORIGIN_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<NodeId>().ok())
            .map(Origin::Peer)
            .unwrap_or(Origin::External);
        Ok(origin)
    }
}
