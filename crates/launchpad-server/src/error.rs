use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use launchpad_core::error::{ErrorKind, LaunchpadError};

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(LaunchpadError::Validation(msg.into()).into())
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Conflict | ErrorKind::State => StatusCode::CONFLICT,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::ExternalProvider => StatusCode::BAD_GATEWAY,
        ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self.0.downcast_ref::<LaunchpadError>() {
            Some(e) => {
                let status = status_for(e.kind());
                if e.is_public() {
                    (status, e.to_string())
                } else {
                    tracing::error!(error = %e, "request failed");
                    (status, "internal error".to_string())
                }
            }
            None => {
                tracing::error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
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

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    fn status(err: LaunchpadError) -> StatusCode {
        AppError(err.into()).into_response().status()
    }

    #[test]
    fn invalid_environment_maps_to_400() {
        assert_eq!(
            status(LaunchpadError::InvalidEnvironment("staging".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn service_exists_maps_to_409() {
        assert_eq!(
            status(LaunchpadError::ServiceExists("billing".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn service_not_found_maps_to_404() {
        assert_eq!(
            status(LaunchpadError::ServiceNotFound("billing".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn approval_not_pending_maps_to_404() {
        assert_eq!(
            status(LaunchpadError::ApprovalNotPending(3)),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn current_version_rollback_maps_to_409() {
        assert_eq!(
            status(LaunchpadError::AlreadyCurrentVersion("1.0.0".into())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn dispatch_failure_maps_to_502() {
        assert_eq!(
            status(LaunchpadError::DispatchFailed {
                provider: "github".into(),
                status: "404 Not Found".into(),
            }),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn storage_timeout_maps_to_500() {
        assert_eq!(
            status(LaunchpadError::StorageTimeout("finalize")),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_launchpad_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn bad_request_constructor_maps_to_400() {
        let response = AppError::bad_request("body is not valid YAML").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn response_body_is_json() {
        let response = AppError(LaunchpadError::ServiceNotFound("x".into()).into()).into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
