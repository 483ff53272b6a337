use std::sync::Arc;

use anyhow::Context;
use jobrelay_api::app::{build_app, build_services};
use jobrelay_api::config::AppConfig;
use jobrelay_infra::workers::ReconciliationSweep;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobrelay_observability::init();

    let config = AppConfig::from_env().context("invalid configuration")?;
    let services = Arc::new(
        build_services(&config)
            .await
            .context("failed to build services")?,
    );

    let sweep = config
        .sweep
        .clone()
        .map(|c| ReconciliationSweep::new(services.orchestrator.clone(), c).spawn());

    let app = build_app(&config, services);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    if let Some(sweep) = sweep {
        sweep.shutdown().await;
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
