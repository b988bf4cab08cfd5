use crate::error::{service_error, ServiceError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

pub struct AppError(anyhow::Error);

impl AppError {
    fn status(&self) -> StatusCode {
        match service_error(&self.0) {
            Some(ServiceError::NotFound(_)) => StatusCode::NOT_FOUND,
            Some(ServiceError::Validation(_)) => StatusCode::BAD_REQUEST,
            Some(ServiceError::Conflict(_)) => StatusCode::CONFLICT,
            Some(ServiceError::Forbidden) => StatusCode::FORBIDDEN,
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body for the REST API.
    pub fn into_json_response(self) -> Response {
        json_error(self.0)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match service_error(&self.0) {
            Some(err) => (status, err.to_string()).into_response(),
            None => {
                tracing::error!("Application error: {:?}", self.0);
                (status, "Internal server error").into_response()
            }
        }
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// `{"error", "message"}` bodies, or the field map for validation failures.
pub fn json_error(err: anyhow::Error) -> Response {
    let body = match service_error(&err) {
        Some(ServiceError::Validation(fields)) => serde_json::json!({
            "error": "Validation failed",
            "fields": fields,
        }),
        Some(ServiceError::NotFound(what)) => serde_json::json!({
            "error": "Not Found",
            "message": format!("{} not found", what),
        }),
        Some(ServiceError::Conflict(msg)) => serde_json::json!({
            "error": "Conflict",
            "message": msg,
        }),
        Some(ServiceError::Forbidden) => serde_json::json!({
            "error": "Forbidden",
            "message": "You do not have permission to perform this action",
        }),
        None => {
            tracing::error!("API error: {:?}", err);
            serde_json::json!({"error": "Internal server error"})
        }
    };
    (AppError(err).status(), Json(body)).into_response()
}
