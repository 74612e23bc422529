//! In-process event hand-off

use super::{assess_and_log, EventListener};
use crate::assessor::EventAssessor;
use crate::event::Event;
use crate::health::{Component, HealthRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

/// Assesses events pushed by external adapters over an mpsc channel
pub struct ChannelListener {
    name: String,
    receiver: mpsc::Receiver<Event>,
    assessor: Option<Arc<EventAssessor>>,
    health: Option<Arc<HealthRegistry>>,
}

impl ChannelListener {
    /// Create the listener and the sender adapters push events into
    pub fn new(name: impl Into<String>, buffer_size: usize) -> (Self, mpsc::Sender<Event>) {
        let (tx, rx) = mpsc::channel(buffer_size.max(1));
        let listener = Self {
            name: name.into(),
            receiver: rx,
            assessor: None,
            health: None,
        };
        (listener, tx)
    }

    pub fn with_assessor(mut self, assessor: Arc<EventAssessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }
}

#[async_trait]
impl EventListener for ChannelListener {
    fn set_event_assessor(&mut self, assessor: Arc<EventAssessor>) {
        self.assessor = Some(assessor);
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>, mut shutdown: broadcast::Receiver<()>) {
        let Self {
            name,
            mut receiver,
            assessor,
            health,
        } = *self;

        let Some(assessor) = assessor else {
            warn!(listener = %name, "No event assessor bound, listener not started");
            if let Some(health) = &health {
                health
                    .set_unhealthy(Component::Listener, "no event assessor bound")
                    .await;
            }
            return;
        };

        info!(listener = %name, "Starting channel listener");
        if let Some(health) = &health {
            health.set_healthy(Component::Listener).await;
        }

        loop {
            tokio::select! {
                received = receiver.recv() => {
                    match received {
                        Some(event) => assess_and_log(&assessor, &name, event).await,
                        None => {
                            info!(listener = %name, "Event channel closed");
                            break;
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!(listener = %name, "Shutting down channel listener");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::event::{EventType, Operator};
    use crate::rules::RuleCatalog;
    use std::time::Duration;

    fn assessor() -> Arc<EventAssessor> {
        let rules = RuleCatalog::parse("power_usage,GT,PAUSE_APP").unwrap();
        Arc::new(
            EventAssessor::builder()
                .rules(Arc::new(rules))
                .clock(Arc::new(ManualClock::at_secs(1_700_000_000)))
                .threshold(1)
                .build()
                .unwrap(),
        )
    }

    fn breach() -> Event {
        Event::new("g-1", "power_usage", 1_700_000_000, 9.0, 5.0, EventType::Breach, Operator::Gt)
            .for_application("lammps", "7")
    }

    #[tokio::test]
    async fn test_channel_events_are_assessed() {
        let assessor = assessor();
        let (listener, tx) = ChannelListener::new("adapters", 8);
        let listener = Box::new(listener.with_assessor(assessor.clone()));
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(breach()).await.unwrap();
        tx.send(breach()).await.unwrap();
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), listener.run(shutdown_rx))
            .await
            .unwrap();

        assert_eq!(assessor.event_history().await.len(), 2);
        assert_eq!(assessor.adaptation_history().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unbound_listener_returns() {
        let (listener, _tx) = ChannelListener::new("adapters", 8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tokio::time::timeout(Duration::from_secs(1), Box::new(listener).run(shutdown_rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_stops_listener() {
        let (mut listener, _tx) = ChannelListener::new("adapters", 8);
        listener.set_event_assessor(assessor());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(Box::new(listener).run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
