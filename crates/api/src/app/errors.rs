use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use jobrelay_infra::jobs::OrchestratorError;

pub fn orchestrator_error_to_response(err: OrchestratorError) -> axum::response::Response {
    match err {
        OrchestratorError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        OrchestratorError::NotFound(_) => json_error(StatusCode::NOT_FOUND, "not_found", "job not found"),
        OrchestratorError::Conflict(msg) => json_error(StatusCode::CONFLICT, "conflict", msg),
        OrchestratorError::Dispatch(e) => {
            json_error(StatusCode::BAD_GATEWAY, "dispatch_error", e.to_string())
        }
        OrchestratorError::Store(msg) => {
            tracing::error!(error = %msg, "job store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn validation_error(message: impl Into<String>) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, "validation_error", message)
}

#[cfg(test)]
mod tests {
    use jobrelay_core::JobId;
    use jobrelay_infra::DispatchError;

    use super::*;

    #[test]
    fn status_codes() {
        let cases = [
            (OrchestratorError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (OrchestratorError::NotFound(JobId::new()), StatusCode::NOT_FOUND),
            (OrchestratorError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                OrchestratorError::Dispatch(DispatchError::Unavailable("x".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (OrchestratorError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(orchestrator_error_to_response(err).status(), status);
        }
    }
}
