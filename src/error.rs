use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// The six error kinds of the portal, each mapped to a fixed HTTP status and
/// a generic client-facing message: backend/provider detail never leaks out.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("insufficient role")]
    Forbidden,

    #[error("login failed")]
    LoginFailed,

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::ConfigInvalid(_) | AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::LoginFailed => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            AppError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) | AppError::Io(_) | AppError::Network(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to return to the client; never echoes upstream/internal detail.
    fn public_message(&self) -> String {
        match self {
            AppError::ConfigInvalid(msg) | AppError::BadRequest(msg) => msg.clone(),
            AppError::Unauthenticated => "authentication required".into(),
            AppError::Forbidden => "insufficient role".into(),
            AppError::LoginFailed => "invalid credentials".into(),
            AppError::NotFound(msg) => msg.clone(),
            AppError::RateLimited => "too many requests".into(),
            AppError::UpstreamError(_) => "upstream request failed".into(),
            AppError::Internal(_) | AppError::Io(_) | AppError::Network(_) => {
                "internal error".into()
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR || status == StatusCode::BAD_GATEWAY {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}
