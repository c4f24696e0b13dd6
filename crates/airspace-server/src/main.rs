//! Airspace Server - hosts the control engine and its lease sweep.

use std::sync::Arc;

use airspace_core::{
    AirspaceControlEngine, AuditSink, FanoutAuditSink, InMemoryPriorityRegistry, TracingAuditSink,
};
use airspace_server::audit_log::JsonLinesAuditSink;
use airspace_server::config::Config;
use airspace_server::loops;
use airspace_server::state::AppState;
use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing
    let (plain, json) = if config.log_json {
        (None, Some(tracing_subscriber::fmt::layer().json()))
    } else {
        (Some(tracing_subscriber::fmt::layer()), None)
    };
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("airspace_server=debug".parse()?)
                .add_directive("airspace_core=info".parse()?)
                .add_directive("airspace::audit=info".parse()?),
        )
        .with(plain)
        .with(json)
        .init();

    tracing::info!("Starting airspace server...");

    let mut audit = FanoutAuditSink::new(vec![Arc::new(TracingAuditSink) as Arc<dyn AuditSink>]);
    if let Some(path) = &config.audit_log_path {
        audit.push(Arc::new(JsonLinesAuditSink::open(path)?));
        tracing::info!("Audit events appended to {}", path);
    }
    let audit: Arc<dyn AuditSink> = Arc::new(audit);
    let priorities = Arc::new(InMemoryPriorityRegistry::new(config.grid.default_priority));

    let engine = AirspaceControlEngine::with_collaborators(config.grid.clone(), priorities, audit)
        .context("airspace grid failed to initialize")?;
    let state = Arc::new(AppState::new(engine));

    // Start background loops
    let (shutdown_tx, _) = broadcast::channel(1);
    let sweep = tokio::spawn(loops::lease_sweep_loop::run_lease_sweep_loop(
        state.clone(),
        config.sweep_interval,
        shutdown_tx.subscribe(),
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");
    let _ = shutdown_tx.send(());
    sweep.await?;

    let counts = state.engine().status_counts();
    tracing::info!("Final cell status counts: {:?}", counts);
    Ok(())
}
