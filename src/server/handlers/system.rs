use axum::{extract::State, response::Json};
use std::str::FromStr;

use crate::cluster::{ClusterStatus, Coordinator};
use crate::error::CamResult;
use crate::storage::Day;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
}

/// Parse a `YYYY-MM-DD` path segment.
pub fn parse_day(raw: &str) -> CamResult<Day> {
    Day::from_str(raw)
}

pub async fn cluster_status(State(state): State<AppState>) -> Json<ClusterStatus> {
    Json(state.coordinator.status())
}
