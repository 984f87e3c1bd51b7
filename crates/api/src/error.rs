use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sniper_execution::error::QueueError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Queue(QueueError::Payload(_)) => StatusCode::BAD_REQUEST,
            Self::Queue(QueueError::Halted(_)) => StatusCode::CONFLICT,
            Self::Queue(QueueError::StoreMissing(_) | QueueError::Store(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
        };

        let body = serde_json::json!({
            "error": self.to_string(),
            "code": status.as_u16()
        });

        (status, Json(body)).into_response()
    }
}
