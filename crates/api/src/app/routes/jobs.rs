use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Extension, Path, Query,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::IntoResponse,
};

use jobrelay_core::JobId;
use jobrelay_infra::jobs::Pagination;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub async fn create_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    body: Result<Json<dto::CreateJobRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return errors::validation_error(e.body_text()),
    };

    match services
        .orchestrator
        .create_job(principal.owner_id().clone(), body.payload)
        .await
    {
        Ok(view) => (StatusCode::CREATED, Json(view)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    query: Result<Query<dto::ListJobsQuery>, QueryRejection>,
) -> axum::response::Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(e) => return errors::validation_error(e.body_text()),
    };
    let status = match query.status_filter() {
        Ok(s) => s,
        Err(resp) => return resp,
    };
    let pagination = Pagination::new(query.limit, query.offset);

    match services
        .orchestrator
        .list_jobs(principal.owner_id(), status, pagination)
        .await
    {
        Ok(page) => Json(dto::JobListResponse {
            items: page.items,
            total: page.total,
            limit: pagination.limit,
            offset: pagination.offset,
        })
        .into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn job_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    match services.orchestrator.job_stats(principal.owner_id()).await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let id: JobId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::validation_error("invalid job id"),
    };

    match services.orchestrator.get_job(principal.owner_id(), id).await {
        Ok(view) => Json(view).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
