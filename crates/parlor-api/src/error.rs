use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use parlor_chat::ChatError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Missing or invalid user identity")]
    Unauthorized,

    #[error("Models not configured")]
    SetupRequired,

    #[error("Persistence error: {0}")]
    Persist(#[from] parlor_persist::PersistError),

    #[error("Chat error: {0}")]
    Chat(#[from] ChatError),

    #[error("Internal server error")]
    Internal,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::ThreadNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            ApiError::SetupRequired => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            ApiError::Chat(ref e) => match e {
                ChatError::MissingImageExtension | ChatError::UnsupportedImage(_) => {
                    (StatusCode::BAD_REQUEST, e.to_string())
                }
                _ => {
                    tracing::error!("Chat error: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "Processing error".to_string())
                }
            },
            ApiError::Persist(ref e) => {
                tracing::error!("Persistence error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }
            ApiError::Internal => {
                tracing::error!("Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_required_maps_to_503() {
        let response = ApiError::SetupRequired.into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn unsupported_image_maps_to_400() {
        let response = ApiError::Chat(ChatError::UnsupportedImage("GIF".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn thread_not_found_maps_to_404() {
        let response = ApiError::ThreadNotFound("t1".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
