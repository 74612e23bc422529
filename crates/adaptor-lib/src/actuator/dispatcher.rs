//! Actuation dispatcher
//!
//! An unbounded FIFO of finalized responses drained by a single worker.
//! Producers never block. The worker waits a bounded time for work, drains
//! everything queued into a batch and executes each item in isolation: a
//! failing or panicking handler marks only its own response as failed.
//! After [`ActuationDispatcher::stop`] the worker finishes all queued work
//! before it exits. With a health registry attached the worker reports
//! degraded while the backlog exceeds its limit and unhealthy once it exits.

use super::ActionHandler;
use crate::audit::{AuditLog, AuditStage};
use crate::error::{AdaptError, Result};
use crate::health::{Component, ComponentHealth, HealthRegistry};
use crate::observability::{AdaptorMetrics, StructuredLogger};
use crate::response::Response;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info};

/// Configuration for the actuation dispatcher
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Longest the worker blocks waiting for work before re-checking the stop flag
    pub poll_timeout: Duration,
    /// Pending responses above which the dispatcher reports degraded
    pub backlog_limit: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(30),
            backlog_limit: 1000,
        }
    }
}

/// State shared between the producer handle and the worker
#[derive(Debug, Default)]
struct Shared {
    stop: AtomicBool,
    depth: AtomicUsize,
    wake: Notify,
    metrics: OnceLock<AdaptorMetrics>,
}

/// Producer side of the actuation queue
#[derive(Debug, Clone)]
pub struct ActuationDispatcher {
    queue: mpsc::UnboundedSender<Response>,
    shared: Arc<Shared>,
}

impl ActuationDispatcher {
    /// Create the queue and the worker that consumes it
    pub fn new(handler: Arc<dyn ActionHandler>, config: DispatcherConfig) -> (Self, DispatchWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());

        let dispatcher = Self {
            queue: tx,
            shared: shared.clone(),
        };
        let worker = DispatchWorker {
            queue: rx,
            handler,
            config,
            shared,
            outcomes: None,
            audit: None,
            health: None,
            logger: StructuredLogger::default(),
        };

        (dispatcher, worker)
    }

    /// Enqueue a response for execution; returns immediately
    pub fn enqueue(&self, response: Response) -> Result<()> {
        let depth = self.shared.depth.fetch_add(1, Ordering::SeqCst) + 1;
        if self.queue.send(response).is_err() {
            self.shared.depth.fetch_sub(1, Ordering::SeqCst);
            return Err(AdaptError::ActuatorUnavailable);
        }
        if let Some(metrics) = self.shared.metrics.get() {
            metrics.set_queue_depth(depth);
        }
        Ok(())
    }

    /// Set the stop flag. Queued work is still executed.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.stop.load(Ordering::SeqCst)
    }

    /// Responses enqueued but not yet picked up by the worker
    pub fn queue_depth(&self) -> usize {
        self.shared.depth.load(Ordering::SeqCst)
    }
}

/// Consumer side of the actuation queue
pub struct DispatchWorker {
    queue: mpsc::UnboundedReceiver<Response>,
    handler: Arc<dyn ActionHandler>,
    config: DispatcherConfig,
    shared: Arc<Shared>,
    outcomes: Option<mpsc::UnboundedSender<Response>>,
    audit: Option<Arc<AuditLog>>,
    health: Option<Arc<HealthRegistry>>,
    logger: StructuredLogger,
}

impl DispatchWorker {
    /// Forward every completed response on `tx`
    pub fn with_outcomes(mut self, tx: mpsc::UnboundedSender<Response>) -> Self {
        self.outcomes = Some(tx);
        self
    }

    pub fn with_audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Report metrics from both the worker and the producer handle
    pub fn with_metrics(self, metrics: AdaptorMetrics) -> Self {
        let _ = self.shared.metrics.set(metrics);
        self
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Run until stopped and drained, or until every producer is gone
    pub async fn run(mut self) {
        info!(
            poll_timeout_secs = self.config.poll_timeout.as_secs(),
            backlog_limit = self.config.backlog_limit,
            "Starting actuation dispatcher"
        );
        self.report(ComponentHealth::healthy()).await;
        let mut processed = 0u64;
        let mut backlogged = false;

        loop {
            if self.shared.stop.load(Ordering::SeqCst)
                && self.shared.depth.load(Ordering::SeqCst) == 0
            {
                break;
            }

            let first = tokio::select! {
                item = self.queue.recv() => match item {
                    Some(response) => Some(response),
                    None => break,
                },
                _ = self.shared.wake.notified() => None,
                _ = tokio::time::sleep(self.config.poll_timeout) => None,
            };
            let Some(first) = first else {
                if backlogged {
                    backlogged = false;
                    self.report(ComponentHealth::healthy()).await;
                }
                continue;
            };

            let mut batch = vec![first];
            while let Ok(response) = self.queue.try_recv() {
                batch.push(response);
            }
            let pending = self.shared.depth.fetch_sub(batch.len(), Ordering::SeqCst);
            if let Some(metrics) = self.shared.metrics.get() {
                metrics.set_queue_depth(pending.saturating_sub(batch.len()));
            }
            let over = pending > self.config.backlog_limit;
            if over != backlogged {
                backlogged = over;
                self.report(ComponentHealth::for_backlog(pending, self.config.backlog_limit))
                    .await;
            }
            debug!(batch = batch.len(), pending = pending, "Draining actuation batch");

            for response in batch {
                self.process(response).await;
                processed += 1;
            }
        }

        info!(processed = processed, "Actuation dispatcher stopped");
        self.report(ComponentHealth::unhealthy("actuation worker stopped"))
            .await;
    }

    async fn report(&self, health: ComponentHealth) {
        if let Some(registry) = &self.health {
            registry.report(Component::Dispatcher, health).await;
        }
    }

    async fn process(&self, response: Response) {
        let completed = if response.is_complete() {
            // Already terminal, e.g. infeasible. Pass it through.
            response
        } else {
            self.execute(response).await
        };

        if let Some(audit) = &self.audit {
            audit.record(AuditStage::Actuated, &completed, chrono::Utc::now().timestamp());
        }
        if let Some(tx) = &self.outcomes {
            let _ = tx.send(completed);
        }
    }

    async fn execute(&self, response: Response) -> Response {
        self.logger.log_dispatched(&response);

        let fallback = response.clone();
        let handler = self.handler.clone();
        let joined = tokio::spawn(async move {
            let mut response = response;
            let outcome = handler.execute(&mut response).await;
            (response, outcome)
        })
        .await;

        let (mut response, outcome) = match joined {
            Ok((response, outcome)) => (response, outcome.map_err(|e| e.to_string())),
            Err(e) => (fallback, Err(format!("action handler panicked: {}", e))),
        };

        match outcome {
            Ok(()) => {
                response.mark_performed();
                if let Some(metrics) = self.shared.metrics.get() {
                    metrics.inc_actuations_performed();
                }
                self.logger.log_actuated(&response);
            }
            Err(error) => {
                self.logger.log_actuation_failure(&response, &error);
                response.mark_failed(error);
                if let Some(metrics) = self.shared.metrics.get() {
                    metrics.inc_actuation_failures();
                }
            }
        }
        response
    }
}
