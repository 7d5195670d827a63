use axum::{
    routing::get,
    Router,
};
use tower_http::trace::TraceLayer;

use super::handlers::*;
use crate::cluster::Coordinator;

pub fn create_router(coordinator: Coordinator) -> Router {
    let state = AppState { coordinator };

    Router::new()
        // Recording flag and camera claims
        .route("/api/v1/recording", get(get_recording).put(put_recording))
        .route("/api/v1/recording/{camera_id}", get(get_claim).put(put_claim))
        // Camera assignments
        .route("/api/v1/cams", get(list_days))
        .route("/api/v1/cams/{day}", get(get_day_assignments))
        .route("/api/v1/cams/{day}/{camera_id}", get(get_assignment).post(post_assignment))
        // Recorded chunks
        .route("/api/v1/chunks/{day}", get(list_day_chunks).delete(delete_day_chunks))
        .route("/api/v1/chunks/{day}/{camera_id}", get(list_camera_chunks))
        // Players and mats
        .route("/api/v1/players", get(list_players))
        .route("/api/v1/players/{player_id}", get(get_player).post(post_player))
        .route("/api/v1/mats/{day}", get(get_mats))
        .route("/api/v1/mats/{day}/{mat_id}", get(get_mat).patch(patch_mat))
        // Node status
        .route("/api/v1/status", get(cluster_status))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
