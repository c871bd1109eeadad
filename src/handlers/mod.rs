pub mod traffic;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::service::ServiceError;

// ─── Unified error type ──────────────────────────────────────────

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Unavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Closed => Self::Unavailable(e.to_string()),
            ServiceError::Config(_) | ServiceError::InvalidRange => {
                Self::BadRequest(e.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
        };

        let body = serde_json::json!({
            "error":  message,
            "status": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::ConfigError;

    #[test]
    fn service_errors_map_to_status_codes() {
        let resp = AppError::from(ServiceError::InvalidRange).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(ServiceError::Config(ConfigError::ZeroCompressionRatio))
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = AppError::from(ServiceError::Closed).into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
