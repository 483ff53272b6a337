//! Service wiring: store and dispatcher construction.
//!
//! Both handles are built once here and passed into the orchestrator
//! explicitly. `DATABASE_URL` selects Postgres; `REDIS_URL` selects Redis
//! Streams (needs the `redis` feature). Anything unset falls back to the
//! in-memory adapters.

use std::sync::Arc;

use jobrelay_infra::{
    OrchestratorConfig, TaskDispatcher,
    dispatcher::InMemoryTaskDispatcher,
    jobs::{InMemoryJobStore, JobOrchestrator, JobRecordStore, PostgresJobStore},
};
use sqlx::postgres::PgPoolOptions;

use crate::config::AppConfig;

/// Orchestrator as wired by the HTTP layer.
pub type Orchestrator = JobOrchestrator<Arc<dyn JobRecordStore>, Arc<dyn TaskDispatcher>>;

const PG_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("database setup failed: {0}")]
    Database(String),

    #[error("dispatcher setup failed: {0}")]
    Dispatcher(String),
}

/// Shared application services.
pub struct AppServices {
    pub orchestrator: Arc<Orchestrator>,
}

impl AppServices {
    pub fn new(store: Arc<dyn JobRecordStore>, dispatcher: Arc<dyn TaskDispatcher>, config: OrchestratorConfig) -> Self {
        Self {
            orchestrator: Arc::new(JobOrchestrator::new(store, dispatcher, config)),
        }
    }

    /// Fully in-memory services. The dispatcher handle is returned so
    /// callers can inspect or fail enqueues.
    pub fn in_memory(config: OrchestratorConfig) -> (Self, InMemoryTaskDispatcher) {
        let dispatcher = InMemoryTaskDispatcher::new();
        let services = Self::new(
            Arc::new(InMemoryJobStore::new()),
            Arc::new(dispatcher.clone()),
            config,
        );
        (services, dispatcher)
    }
}

pub async fn build_services(config: &AppConfig) -> Result<AppServices, ServiceError> {
    let store = build_store(config).await?;
    let dispatcher = build_dispatcher(config)?;
    Ok(AppServices::new(store, dispatcher, config.orchestrator))
}

async fn build_store(config: &AppConfig) -> Result<Arc<dyn JobRecordStore>, ServiceError> {
    let Some(database_url) = config.database_url.as_deref() else {
        tracing::info!("DATABASE_URL not set; using in-memory job store");
        return Ok(Arc::new(InMemoryJobStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(PG_MAX_CONNECTIONS)
        .connect(database_url)
        .await
        .map_err(|e| ServiceError::Database(e.to_string()))?;

    let store = PostgresJobStore::new(pool);
    store
        .ensure_schema()
        .await
        .map_err(|e| ServiceError::Database(e.to_string()))?;
    tracing::info!("using postgres job store");
    Ok(Arc::new(store))
}

fn build_dispatcher(config: &AppConfig) -> Result<Arc<dyn TaskDispatcher>, ServiceError> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        tracing::info!("REDIS_URL not set; using in-memory task dispatcher");
        return Ok(Arc::new(InMemoryTaskDispatcher::new()));
    };

    #[cfg(feature = "redis")]
    {
        let dispatcher = jobrelay_infra::dispatcher::RedisTaskDispatcher::new(
            redis_url,
            Some(config.task_stream_key.clone()),
            config.callback_base_url.clone(),
        )
        .map_err(|e| ServiceError::Dispatcher(e.to_string()))?;
        tracing::info!(stream_key = %config.task_stream_key, "using redis streams task dispatcher");
        Ok(Arc::new(dispatcher))
    }

    #[cfg(not(feature = "redis"))]
    {
        let _ = redis_url;
        Err(ServiceError::Dispatcher(
            "REDIS_URL is set but the redis feature is not enabled".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_config_builds() {
        let config = AppConfig::in_memory("secret");
        let services = build_services(&config).await.unwrap();
        assert_eq!(services.orchestrator.retry_policy().max_attempts, 5);
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn redis_url_without_feature_is_an_error() {
        let mut config = AppConfig::in_memory("secret");
        config.redis_url = Some("redis://localhost:6379".to_string());
        assert!(matches!(
            build_services(&config).await,
            Err(ServiceError::Dispatcher(_))
        ));
    }
}
