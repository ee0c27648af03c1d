use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Failure reported by a [`Datastore`](crate::health::datastore::Datastore) driver.
#[derive(Debug, thiserror::Error)]
pub enum DatastoreError {
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("{0}")]
    Driver(String),
}

/// Failure reported by an [`ObjectCache`](crate::health::cache::ObjectCache) backend.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("cache value could not be encoded: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("{0}")]
    Backend(String),
}

/// A failure severe enough to abort the remaining probes.
///
/// Carries the HTTP status the evaluation should answer with.
#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("{message}")]
    Fatal { status: StatusCode, message: String },
}

impl HealthError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        HealthError::Fatal {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            HealthError::Fatal { status, .. } => *status,
        }
    }
}

/// Route-level errors, raised before or after an evaluation runs.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Template rendering error: {0}")]
    Template(#[from] tera::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string()),
            _ => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        // Same shape as a health payload so monitors parsing `status` keep working
        let body = serde_json::json!({
            "errors": message,
            "status": "FAILURE",
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_503() {
        let err = HealthError::unavailable("could not connect to the db");
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.to_string(), "could not connect to the db");
    }

    #[test]
    fn test_unauthorized_response_status() {
        let response = AppError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_render_failure_hides_detail() {
        let response = AppError::from(tera::Error::msg("secret detail")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["errors"], "Internal server error");
        assert_eq!(body["status"], "FAILURE");
    }
}
