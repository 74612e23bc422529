//! Periodic clock events

use super::{assess_and_log, EventListener};
use crate::assessor::EventAssessor;
use crate::event::Event;
use crate::health::{Component, HealthRegistry};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// A timer that emits a clock event for one guarantee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockTrigger {
    pub guarantee_id: String,
    pub agreement_term: String,
    pub interval_secs: u64,
    /// Attribution for the emitted events (`application`, `deployment`, `host`)
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl ClockTrigger {
    pub fn new(guarantee_id: impl Into<String>, agreement_term: impl Into<String>, interval_secs: u64) -> Self {
        Self {
            guarantee_id: guarantee_id.into(),
            agreement_term: agreement_term.into(),
            interval_secs,
            settings: BTreeMap::new(),
        }
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }

    fn event(&self, time: i64) -> Event {
        Event::clock(
            self.guarantee_id.clone(),
            self.agreement_term.clone(),
            time,
            self.settings.clone(),
        )
    }
}

/// Emits clock events for each configured trigger on its own interval
pub struct ClockListener {
    name: String,
    triggers: Vec<ClockTrigger>,
    assessor: Option<Arc<EventAssessor>>,
    health: Option<Arc<HealthRegistry>>,
}

impl ClockListener {
    pub fn new(name: impl Into<String>, triggers: Vec<ClockTrigger>) -> Self {
        Self {
            name: name.into(),
            triggers,
            assessor: None,
            health: None,
        }
    }

    pub fn with_assessor(mut self, assessor: Arc<EventAssessor>) -> Self {
        self.assessor = Some(assessor);
        self
    }

    pub fn with_health(mut self, health: Arc<HealthRegistry>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn triggers(&self) -> &[ClockTrigger] {
        &self.triggers
    }
}

#[async_trait]
impl EventListener for ClockListener {
    fn set_event_assessor(&mut self, assessor: Arc<EventAssessor>) {
        self.assessor = Some(assessor);
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(self: Box<Self>, mut shutdown: broadcast::Receiver<()>) {
        let Self {
            name,
            triggers,
            assessor,
            health,
        } = *self;

        let Some(assessor) = assessor else {
            warn!(listener = %name, "No event assessor bound, listener not started");
            return;
        };
        if triggers.is_empty() {
            info!(listener = %name, "No clock triggers configured");
            return;
        }

        info!(listener = %name, triggers = triggers.len(), "Starting clock listener");
        if let Some(health) = &health {
            health.set_healthy(Component::Listener).await;
        }

        // One ticker task per trigger feeding a single assessing loop
        let (tx, mut rx) = mpsc::channel::<usize>(triggers.len());
        let (stop_tx, _) = broadcast::channel::<()>(1);
        let mut tickers = Vec::with_capacity(triggers.len());
        for (idx, trigger) in triggers.iter().enumerate() {
            let period = trigger.period();
            let tx = tx.clone();
            let mut stop = stop_tx.subscribe();
            tickers.push(tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            if tx.send(idx).await.is_err() {
                                break;
                            }
                        }
                        _ = stop.recv() => break,
                    }
                }
            }));
        }
        drop(tx);

        loop {
            tokio::select! {
                fired = rx.recv() => {
                    let Some(idx) = fired else { break };
                    let event = triggers[idx].event(assessor.clock().now_secs());
                    assess_and_log(&assessor, &name, event).await;
                }
                _ = shutdown.recv() => {
                    info!(listener = %name, "Shutting down clock listener");
                    break;
                }
            }
        }

        let _ = stop_tx.send(());
        for ticker in tickers {
            let _ = ticker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rules::RuleCatalog;
    use crate::response::ActionType;

    #[test]
    fn test_trigger_emits_significant_clock_event() {
        let trigger = ClockTrigger::new("g-clock", "nightly", 60).with_setting("application", "lammps");
        let event = trigger.event(1_700_000_000);

        assert!(event.significant_on_own);
        assert_eq!(event.setting("application"), Some("lammps"));
        assert_eq!(event.time, 1_700_000_000);
    }

    #[test]
    fn test_trigger_deserializes_without_settings() {
        let trigger: ClockTrigger = serde_json::from_str(
            r#"{"guarantee_id":"g","agreement_term":"nightly","interval_secs":30}"#,
        )
        .unwrap();
        assert!(trigger.settings.is_empty());
        assert_eq!(trigger.period(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_clock_listener_assesses_on_interval() {
        let rules = RuleCatalog::parse("nightly,EQ,REDUCE_CLUSTER_POWER_CAP").unwrap();
        let assessor = Arc::new(
            EventAssessor::builder()
                .rules(Arc::new(rules))
                .clock(Arc::new(ManualClock::at_secs(1_700_000_000)))
                .build()
                .unwrap(),
        );
        let listener = ClockListener::new("clock", vec![ClockTrigger::new("g-clock", "nightly", 10)])
            .with_assessor(assessor.clone());
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(Box::new(listener).run(shutdown_rx));
        tokio::time::sleep(Duration::from_secs(35)).await;
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();

        // Ticks at 10s, 20s and 30s; the later two fall under the cooldown
        assert_eq!(assessor.event_history().await.len(), 3);
        let adaptations = assessor.adaptation_history().await;
        assert_eq!(adaptations.len(), 1);
        assert_eq!(adaptations[0].action_type, ActionType::ReduceClusterPowerCap);
    }

    #[tokio::test]
    async fn test_clock_listener_without_triggers_returns() {
        let rules = RuleCatalog::parse("nightly,EQ,REDUCE_CLUSTER_POWER_CAP").unwrap();
        let assessor = Arc::new(EventAssessor::builder().rules(Arc::new(rules)).build().unwrap());
        let listener = ClockListener::new("clock", Vec::new()).with_assessor(assessor);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tokio::time::timeout(Duration::from_secs(1), Box::new(listener).run(shutdown_rx))
            .await
            .unwrap();
    }
}
