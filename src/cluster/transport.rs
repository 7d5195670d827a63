use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use super::node::{Claim, NodeId};
use crate::storage::{
    CameraAssignment, CameraId, Day, DayAssignments, DayMats, Mat, MatId, MatPatch, Player,
    PlayerId, PlayerTable,
};

/// Header a node sets on every call to a peer. Requests carrying it are never
/// re-replicated.
pub const PEER_ORIGIN_HEADER: &str = "X-Peer-Origin";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingBody {
    pub recording: bool,
}

/// One `{srvid, camid, ts}` row of a chunk listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkListing {
    pub srvid: NodeId,
    pub camid: CameraId,
    pub ts: Vec<String>,
}

/// Every operation of the `/api/v1` surface.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerRequest {
    GetRecording,
    PutRecording { recording: bool },
    GetClaim { camera_id: CameraId },
    PutClaim { camera_id: CameraId, claim: Claim },
    ListDays,
    GetAssignments { day: Day },
    GetAssignment { day: Day, camera_id: CameraId },
    PostAssignment { day: Day, camera_id: CameraId, body: CameraAssignment },
    GetChunks { day: Day, camera_id: Option<CameraId> },
    DeleteChunks { day: Day },
    ListPlayers,
    GetPlayer { player_id: PlayerId },
    PostPlayer { player_id: PlayerId, body: Player },
    GetMats { day: Day },
    GetMat { day: Day, mat_id: MatId },
    PatchMat { day: Day, mat_id: MatId, patch: MatPatch },
}

impl PeerRequest {
    pub fn method(&self) -> Method {
        match self {
            PeerRequest::PutRecording { .. } | PeerRequest::PutClaim { .. } => Method::PUT,
            PeerRequest::PostAssignment { .. } | PeerRequest::PostPlayer { .. } => Method::POST,
            PeerRequest::PatchMat { .. } => Method::PATCH,
            PeerRequest::DeleteChunks { .. } => Method::DELETE,
            _ => Method::GET,
        }
    }

    /// Path below the API base URL.
    pub fn path(&self) -> String {
        match self {
            PeerRequest::GetRecording | PeerRequest::PutRecording { .. } => "/recording".to_string(),
            PeerRequest::GetClaim { camera_id } | PeerRequest::PutClaim { camera_id, .. } => {
                format!("/recording/{}", camera_id)
            }
            PeerRequest::ListDays => "/cams".to_string(),
            PeerRequest::GetAssignments { day } => format!("/cams/{}", day),
            PeerRequest::GetAssignment { day, camera_id }
            | PeerRequest::PostAssignment { day, camera_id, .. } => {
                format!("/cams/{}/{}", day, camera_id)
            }
            PeerRequest::GetChunks { day, camera_id: None } | PeerRequest::DeleteChunks { day } => {
                format!("/chunks/{}", day)
            }
            PeerRequest::GetChunks { day, camera_id: Some(camera_id) } => {
                format!("/chunks/{}/{}", day, camera_id)
            }
            PeerRequest::ListPlayers => "/players".to_string(),
            PeerRequest::GetPlayer { player_id } | PeerRequest::PostPlayer { player_id, .. } => {
                format!("/players/{}", player_id)
            }
            PeerRequest::GetMats { day } => format!("/mats/{}", day),
            PeerRequest::GetMat { day, mat_id } | PeerRequest::PatchMat { day, mat_id, .. } => {
                format!("/mats/{}/{}", day, mat_id)
            }
        }
    }

    pub fn body(&self) -> Option<serde_json::Value> {
        let value = match self {
            PeerRequest::PutRecording { recording } => {
                serde_json::to_value(RecordingBody { recording: *recording })
            }
            PeerRequest::PutClaim { claim, .. } => serde_json::to_value(claim),
            PeerRequest::PostAssignment { body, .. } => serde_json::to_value(body),
            PeerRequest::PostPlayer { body, .. } => serde_json::to_value(body),
            PeerRequest::PatchMat { patch, .. } => serde_json::to_value(patch),
            _ => return None,
        };
        value.ok()
    }

    /// Decode the answer to this request from a response body.
    pub fn decode(&self, body: &[u8]) -> Result<PeerResponse, serde_json::Error> {
        let response = match self {
            PeerRequest::GetRecording => {
                PeerResponse::Recording(serde_json::from_slice::<RecordingBody>(body)?.recording)
            }
            PeerRequest::GetClaim { .. } => PeerResponse::Claim(serde_json::from_slice(body)?),
            PeerRequest::ListDays => PeerResponse::Days(serde_json::from_slice(body)?),
            PeerRequest::GetAssignments { .. } => {
                PeerResponse::Assignments(serde_json::from_slice(body)?)
            }
            PeerRequest::GetAssignment { .. } => {
                PeerResponse::Assignment(serde_json::from_slice(body)?)
            }
            PeerRequest::GetChunks { .. } => PeerResponse::Chunks(serde_json::from_slice(body)?),
            PeerRequest::ListPlayers => PeerResponse::Players(serde_json::from_slice(body)?),
            PeerRequest::GetPlayer { .. } => PeerResponse::Player(serde_json::from_slice(body)?),
            PeerRequest::GetMats { .. } => PeerResponse::Mats(serde_json::from_slice(body)?),
            PeerRequest::GetMat { .. } => PeerResponse::Mat(serde_json::from_slice(body)?),
            _ => PeerResponse::Done,
        };
        Ok(response)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerResponse {
    Recording(bool),
    Claim(Claim),
    Days(Vec<Day>),
    Assignments(DayAssignments),
    Assignment(CameraAssignment),
    Chunks(Vec<ChunkListing>),
    Players(PlayerTable),
    Player(Player),
    Mats(DayMats),
    Mat(Mat),
    /// Writes answer with no body
    Done,
}

impl PeerResponse {
    fn unexpected(&self, wanted: &'static str) -> PeerError {
        PeerError::UnexpectedResponse(format!("expected {}, got {:?}", wanted, self))
    }

    pub fn into_recording(self) -> Result<bool, PeerError> {
        match self {
            PeerResponse::Recording(recording) => Ok(recording),
            other => Err(other.unexpected("recording")),
        }
    }

    pub fn into_claim(self) -> Result<Claim, PeerError> {
        match self {
            PeerResponse::Claim(claim) => Ok(claim),
            other => Err(other.unexpected("claim")),
        }
    }

    pub fn into_days(self) -> Result<Vec<Day>, PeerError> {
        match self {
            PeerResponse::Days(days) => Ok(days),
            other => Err(other.unexpected("days")),
        }
    }

    pub fn into_assignments(self) -> Result<DayAssignments, PeerError> {
        match self {
            PeerResponse::Assignments(table) => Ok(table),
            other => Err(other.unexpected("assignments")),
        }
    }

    pub fn into_chunks(self) -> Result<Vec<ChunkListing>, PeerError> {
        match self {
            PeerResponse::Chunks(chunks) => Ok(chunks),
            other => Err(other.unexpected("chunks")),
        }
    }

    pub fn into_players(self) -> Result<PlayerTable, PeerError> {
        match self {
            PeerResponse::Players(players) => Ok(players),
            other => Err(other.unexpected("players")),
        }
    }

    pub fn into_mats(self) -> Result<DayMats, PeerError> {
        match self {
            PeerResponse::Mats(mats) => Ok(mats),
            other => Err(other.unexpected("mats")),
        }
    }
}

/// Why a call to a peer failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PeerError {
    #[error("srv{0} unreachable: {1}")]
    Unreachable(NodeId, String),

    #[error("srv{0} timed out")]
    Timeout(NodeId),

    #[error("srv{0} answered with status {1}")]
    Status(NodeId, u16),

    #[error("srv{0} sent an undecodable body: {1}")]
    Decode(NodeId, String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl PeerError {
    /// A failure of the peer itself. A 4xx answer only rejects the request:
    /// the peer is alive and keeps receiving fan-outs.
    pub fn is_peer_failure(&self) -> bool {
        match self {
            PeerError::Unreachable(..) | PeerError::Timeout(_) | PeerError::Decode(..) => true,
            PeerError::Status(_, code) => *code >= 500,
            PeerError::UnexpectedResponse(_) => false,
        }
    }
}

/// Point-to-point calls to other nodes.
#[async_trait::async_trait]
pub trait PeerTransport: Send + Sync {
    async fn call(
        &self,
        to: NodeId,
        request: PeerRequest,
        timeout: Duration,
    ) -> Result<PeerResponse, PeerError>;
}

/// HTTP+JSON transport against `http://srv{id}:5000/api/v1`.
pub struct HttpTransport {
    client: reqwest::Client,
    local_id: NodeId,
    url_template: String,
}

impl HttpTransport {
    pub fn new(local_id: NodeId, url_template: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            local_id,
            url_template: url_template.into(),
        }
    }

    fn url(&self, to: NodeId, request: &PeerRequest) -> String {
        format!(
            "{}{}",
            self.url_template.replace("{id}", &to.to_string()),
            request.path()
        )
    }
}

#[async_trait::async_trait]
impl PeerTransport for HttpTransport {
    async fn call(
        &self,
        to: NodeId,
        request: PeerRequest,
        timeout: Duration,
    ) -> Result<PeerResponse, PeerError> {
        let mut builder = self
            .client
            .request(request.method(), self.url(to, &request))
            .header(PEER_ORIGIN_HEADER, self.local_id.to_string())
            .timeout(timeout);
        if let Some(body) = request.body() {
            builder = builder.json(&body);
        }

        let transport_error = |e: reqwest::Error| {
            if e.is_timeout() {
                PeerError::Timeout(to)
            } else {
                PeerError::Unreachable(to, e.to_string())
            }
        };

        let response = builder.send().await.map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(PeerError::Status(to, response.status().as_u16()));
        }

        let body = response.bytes().await.map_err(transport_error)?;
        request
            .decode(&body)
            .map_err(|e| PeerError::Decode(to, e.to_string()))
    }
}
