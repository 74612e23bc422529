//! QoS Adaptor - autonomic adaptation daemon
//!
//! Assesses quality-of-service events against a rule catalog, picks concrete
//! adaptation targets and hands them to an actuator. Runs with the built-in
//! simulated actuator; real back-ends plug in through `ActuatorInvoker`.

use adaptor_lib::{
    actuator::{Actuator, ActuatorInvoker, DispatcherConfig, SimulatedActuator},
    assessor::{EventAssessor, HistoryPruner},
    audit::AuditLog,
    decision::create_engine,
    health::{Component, HealthRegistry},
    listener::{ChannelListener, ClockListener, EventListener},
    observability::{AdaptorMetrics, StructuredLogger},
    rules::RuleCatalog,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const ADAPTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting qos-adaptor");

    // Load configuration
    let config = config::AdaptorConfig::load()?;
    info!(
        node_name = %config.node_name,
        rules_path = %config.rules_path.display(),
        history_length_secs = config.history_length_secs,
        decision_engine = %config.decision_engine,
        "Adaptor configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    for component in Component::ALL {
        health_registry.register(component).await;
    }
    let health = Arc::new(health_registry.clone());

    let metrics = AdaptorMetrics::new();
    let logger = StructuredLogger::new(&config.node_name);

    let rules = RuleCatalog::load(&config.rules_path)
        .with_context(|| format!("Failed to load rule catalog {}", config.rules_path.display()))?;
    if rules.is_empty() {
        warn!(path = %config.rules_path.display(), "Rule catalog is empty, nothing will fire");
    }

    let audit = Arc::new(AuditLog::from_settings(
        config.logging,
        config.audit_log_path.as_deref(),
    )?);

    // Actuation pipeline
    let invoker: Arc<dyn ActuatorInvoker> = Arc::new(SimulatedActuator::from_inventory(
        config.simulated_hosts.clone(),
        config.simulated_applications.clone(),
        config.simulated_tasks.clone(),
        config.power_limit_watts,
    ));
    let (actuator, worker) = Actuator::with_invoker_handler(
        invoker.clone(),
        DispatcherConfig {
            poll_timeout: Duration::from_secs(config.dispatcher_poll_secs.max(1)),
            backlog_limit: config.dispatcher_backlog_limit,
        },
    );
    let actuator = Arc::new(actuator);
    let (outcome_tx, mut outcome_rx) = mpsc::unbounded_channel();
    let worker = worker
        .with_outcomes(outcome_tx)
        .with_audit(audit.clone())
        .with_metrics(metrics.clone())
        .with_health(health.clone())
        .with_logger(logger.clone());

    let engine = create_engine(&config.decision_engine, Some(invoker));
    let assessor = Arc::new(
        EventAssessor::builder()
            .rules(Arc::new(rules))
            .decision_engine(engine)
            .actuator(actuator.clone())
            .retention_secs(config.history_length_secs)
            .poll_interval(Duration::from_secs(config.poll_interval_secs.max(1)))
            .threshold(config.threshold)
            .multi_action(config.multi_action)
            .max_decision_attempts(config.max_decision_attempts)
            .audit(audit)
            .metrics(metrics.clone())
            .logger(logger.clone())
            .build()?,
    );
    logger.log_startup(ADAPTOR_VERSION, assessor.engine_name(), assessor.rules().len());

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let worker_handle = tokio::spawn(worker.run());

    // Outcomes replace the decided copies in the adaptation history
    let outcome_assessor = assessor.clone();
    let outcome_handle = tokio::spawn(async move {
        while let Some(response) = outcome_rx.recv().await {
            outcome_assessor.record_outcome(response).await;
        }
    });

    let pruner = HistoryPruner::new(assessor.clone()).with_health(health.clone());
    let pruner_handle = tokio::spawn(pruner.run(shutdown_tx.subscribe()));

    // External adapters push events through `event_tx`
    let (channel_listener, event_tx) = ChannelListener::new("adapters", config.event_buffer_size);
    let mut listeners: Vec<Box<dyn EventListener>> = vec![
        Box::new(channel_listener.with_health(health.clone())),
        Box::new(ClockListener::new("clock", config.clock_triggers.clone()).with_health(health.clone())),
    ];
    let mut listener_handles = Vec::with_capacity(listeners.len());
    for mut listener in listeners.drain(..) {
        listener.set_event_assessor(assessor.clone());
        info!(listener = %listener.name(), "Starting listener");
        listener_handles.push(tokio::spawn(listener.run(shutdown_tx.subscribe())));
    }
    health_registry.set_healthy(Component::Assessor).await;

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        assessor.clone(),
    ));

    // Mark adaptor as ready after initialization
    health_registry.set_ready(true).await;

    // Start health and metrics server
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, shutdown_tx.subscribe()));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    drop(event_tx);
    for handle in listener_handles {
        let _ = handle.await;
    }
    let _ = pruner_handle.await;

    // Queued actuations finish before the worker exits
    actuator.stop();
    let _ = worker_handle.await;
    drop(assessor);
    let _ = outcome_handle.await;

    match api_handle.await {
        Ok(Err(e)) => warn!(error = %e, "API server exited with error"),
        Err(e) => warn!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }

    info!("Shutdown complete");
    Ok(())
}
