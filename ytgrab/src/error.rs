use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response}
};

#[derive(Debug)]
pub struct AppError {
    pub message: String,
    pub status: StatusCode
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::NOT_FOUND
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: StatusCode::BAD_REQUEST
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!("handler error: {}", self.message);
        (self.status, Json(serde_json::json!({ "error": self.message }))).into_response()
    }
}

// Extraction, filesystem and template failures all surface as 400 with the error text.
impl<E: std::error::Error> From<E> for AppError {
    fn from(err: E) -> Self {
        AppError::bad_request(err.to_string())
    }
}
