use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path, rejection::JsonRejection},
    response::IntoResponse,
};

use jobrelay_core::JobId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};

/// Dispatcher callback. A callback that finds the job already advanced is
/// still a 200 (`applied: false`) so the queue does not redeliver it.
pub async fn job_callback(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    body: Result<Json<dto::CallbackRequest>, JsonRejection>,
) -> axum::response::Response {
    let id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::validation_error("invalid job id"),
    };
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::validation_error(e.body_text()),
    };

    match services.orchestrator.handle_callback(id, body.into()).await {
        Ok(ack) => Json(dto::CallbackResponse::from(ack)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
