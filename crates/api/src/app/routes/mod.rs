use axum::{
    Router,
    routing::{get, post},
};

pub mod callbacks;
pub mod jobs;
pub mod system;

/// Router for endpoints used by authenticated clients. Every job is scoped
/// to the calling principal.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::create_job).get(jobs::list_jobs))
        .route("/jobs/stats", get(jobs::job_stats))
        .route("/jobs/:id", get(jobs::get_job))
}

/// Router for endpoints only the task dispatcher may call.
pub fn internal_router() -> Router {
    Router::new().route("/internal/jobs/:id/callback", post(callbacks::job_callback))
}
