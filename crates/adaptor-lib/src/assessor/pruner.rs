//! Background history pruning
//!
//! Reports degraded while passes overrun the interval and unhealthy once
//! the loop has exited.

use super::EventAssessor;
use crate::health::{Component, ComponentHealth, ComponentStatus, HealthRegistry};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

/// Periodically drops history entries that left the retention window
pub struct HistoryPruner {
    assessor: Arc<EventAssessor>,
    interval: Duration,
    health: Option<Arc<HealthRegistry>>,
}

impl HistoryPruner {
    /// Prune at the assessor's configured poll interval
    pub fn new(assessor: Arc<EventAssessor>) -> Self {
        let interval = assessor.config().poll_interval;
        Self {
            assessor,
            interval,
            health: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    /// Run until shutdown is signaled
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting history pruner"
        );
        self.report(ComponentHealth::healthy()).await;

        let mut ticker = interval(self.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = ComponentStatus::Healthy;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.assessor.prune_history().await;
                    let elapsed = started.elapsed();

                    let health = if elapsed > self.interval {
                        warn!(
                            elapsed_ms = elapsed.as_millis() as u64,
                            interval_ms = self.interval.as_millis() as u64,
                            "History prune overran its interval"
                        );
                        ComponentHealth::degraded(format!(
                            "prune took {}ms, interval {}ms",
                            elapsed.as_millis(),
                            self.interval.as_millis()
                        ))
                    } else {
                        ComponentHealth::healthy()
                    };
                    if health.status != last {
                        last = health.status;
                        self.report(health).await;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down history pruner");
                    break;
                }
            }
        }

        self.report(ComponentHealth::unhealthy("history pruner stopped"))
            .await;
    }

    async fn report(&self, health: ComponentHealth) {
        if let Some(registry) = &self.health {
            registry.report(Component::Pruner, health).await;
        }
    }
}
