use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CamError {
    #[error("Day '{0}' not found")]
    DayNotFound(String),

    #[error("Camera {0} not found")]
    CameraNotFound(u32),

    #[error("Mat {0} not found")]
    MatNotFound(u8),

    #[error("Player '{0}' not found")]
    PlayerNotFound(String),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Persist error: {0}")]
    PersistError(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type CamResult<T> = Result<T, CamError>;

impl serde::Serialize for CamError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl CamError {
    pub fn status(&self) -> StatusCode {
        match self {
            CamError::DayNotFound(_)
            | CamError::CameraNotFound(_)
            | CamError::MatNotFound(_)
            | CamError::PlayerNotFound(_) => StatusCode::NOT_FOUND,
            CamError::BadRequest(_) | CamError::JsonError(_) => StatusCode::BAD_REQUEST,
            CamError::PersistError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CamError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CamError::DayNotFound("2024-10-09".to_string());
        assert_eq!(err.to_string(), "Day '2024-10-09' not found");

        let err = CamError::CameraNotFound(7);
        assert_eq!(err.to_string(), "Camera 7 not found");

        let err = CamError::MatNotFound(3);
        assert_eq!(err.to_string(), "Mat 3 not found");

        let err = CamError::BadRequest("mat out of range".to_string());
        assert_eq!(err.to_string(), "Bad Request: mat out of range");

        let err = CamError::PersistError("disk full".to_string());
        assert_eq!(err.to_string(), "Persist error: disk full");
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(CamError::DayNotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(CamError::PlayerNotFound("p1".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(CamError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            CamError::PersistError("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_serializes_as_message() {
        let err = CamError::CameraNotFound(12);
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Camera 12 not found\"");
    }

    #[tokio::test]
    async fn test_into_response_body() {
        let response = CamError::MatNotFound(9).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["code"], 404);
        assert_eq!(value["error"], "Mat 9 not found");
    }
}
