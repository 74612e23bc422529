//! Event assessment
//!
//! The [`EventAssessor`] owns the live event history and the live adaptation
//! history. For each incoming event it appends to the event history, counts
//! the recent occurrences of the event's guarantee, matches the rule catalog,
//! applies the cooldown and records the fired responses. All of that runs
//! under one lock so two concurrent events for the same guarantee cannot
//! both pass the cooldown. Target resolution by the decision engine and the
//! hand-off to the actuator happen after the lock is released.

mod pruner;

pub use pruner::HistoryPruner;

use crate::actuator::Actuator;
use crate::audit::{AuditLog, AuditStage};
use crate::clock::{SystemClock, TimeSource};
use crate::decision::{create_engine, DecisionEngine, DEFAULT_ENGINE};
use crate::event::{Event, EventOrigin};
use crate::history::{relevant, History};
use crate::observability::{AdaptorMetrics, StructuredLogger};
use crate::response::Response;
use crate::rules::{FiringCriteria, RuleCatalog};
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Infeasible decisions are only retried when the retention window is longer than this
const RETRY_MIN_RETENTION_SECS: u64 = 30;

/// Configuration for the event assessor
#[derive(Debug, Clone)]
pub struct AssessorConfig {
    /// How long events and adaptations are remembered (0 = not at all)
    pub retention_secs: u64,
    /// Interval of the background history pruning
    pub poll_interval: Duration,
    /// Occurrences needed before a non-significant event fires a rule
    pub threshold: usize,
    /// Fire every matching rule instead of only the first
    pub multi_action: bool,
    /// Decision attempts per response, including the first
    pub max_decision_attempts: u32,
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            retention_secs: 300,
            poll_interval: Duration::from_secs(5),
            threshold: 2,
            multi_action: false,
            max_decision_attempts: 1,
        }
    }
}

/// Both histories, guarded together
#[derive(Debug, Default)]
struct Histories {
    events: History<Arc<Event>>,
    adaptations: History<Response>,
}

/// The orchestrator of the adaptation loop
pub struct EventAssessor {
    rules: Arc<RuleCatalog>,
    engine: Arc<dyn DecisionEngine>,
    actuator: Option<Arc<Actuator>>,
    clock: Arc<dyn TimeSource>,
    config: AssessorConfig,
    histories: Mutex<Histories>,
    audit: Arc<AuditLog>,
    metrics: Option<AdaptorMetrics>,
    logger: StructuredLogger,
}

impl EventAssessor {
    pub fn builder() -> EventAssessorBuilder {
        EventAssessorBuilder::new()
    }

    pub fn config(&self) -> &AssessorConfig {
        &self.config
    }

    pub fn rules(&self) -> &RuleCatalog {
        &self.rules
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn clock(&self) -> &dyn TimeSource {
        self.clock.as_ref()
    }

    pub fn actuator(&self) -> Option<&Arc<Actuator>> {
        self.actuator.as_ref()
    }

    /// Assess an event in first-match mode
    pub async fn assess_event(&self, event: Event) -> Option<Response> {
        self.assess_with(event, false).await.into_iter().next()
    }

    /// Assess an event firing every matching rule. The cooldown check
    /// covers the whole set.
    pub async fn assess_event_all(&self, event: Event) -> Vec<Response> {
        self.assess_with(event, true).await
    }

    /// Assess an event in the configured mode
    pub async fn assess(&self, event: Event) -> Vec<Response> {
        self.assess_with(event, self.config.multi_action).await
    }

    /// Account for an adaptation performed elsewhere so the cooldown covers it
    pub async fn add_remote_adaptation_event(&self, response: Response) {
        let mut histories = self.histories.lock().await;
        debug!(
            response_id = response.id,
            guarantee_id = %response.guarantee_id(),
            agreement_term = %response.agreement_term(),
            "Recording remote adaptation"
        );
        histories.adaptations.append(response);
        self.update_size_metrics(&histories);
    }

    /// Update the recorded copy of a response once its outcome is known.
    ///
    /// A complete entry is never replaced by an incomplete one. Returns
    /// false when the response is unknown or the update was refused.
    pub async fn record_outcome(&self, response: Response) -> bool {
        let id = response.id;
        let mut histories = self.histories.lock().await;
        let settled = histories
            .adaptations
            .iter()
            .any(|r| r.id == id && r.is_complete());
        if settled && !response.is_complete() {
            debug!(response_id = id, "Ignoring stale copy of a completed response");
            return false;
        }
        histories.adaptations.replace_where(|r| r.id == id, response)
    }

    /// Drop history entries older than the retention window.
    /// Returns `(events_dropped, adaptations_dropped)`.
    pub async fn prune_history(&self) -> (usize, usize) {
        let now = self.clock.now_secs();
        let mut histories = self.histories.lock().await;
        let events = histories
            .events
            .prune_older_than(self.config.retention_secs, now);
        let adaptations = histories
            .adaptations
            .prune_older_than(self.config.retention_secs, now);
        self.update_size_metrics(&histories);
        drop(histories);

        self.logger.log_history_pruned(events, adaptations);
        (events, adaptations)
    }

    /// Snapshot of the live event history, oldest first
    pub async fn event_history(&self) -> Vec<Arc<Event>> {
        self.histories.lock().await.events.snapshot()
    }

    /// Snapshot of the live adaptation history, oldest first
    pub async fn adaptation_history(&self) -> Vec<Response> {
        self.histories.lock().await.adaptations.snapshot()
    }

    async fn assess_with(&self, event: Event, all_matches: bool) -> Vec<Response> {
        if let Some(metrics) = &self.metrics {
            metrics.inc_events_assessed();
        }
        let event = Arc::new(self.resolve_definition(event).await);
        let proposed = self.propose(event, all_matches).await;

        let mut finalized = Vec::with_capacity(proposed.len());
        for response in proposed {
            finalized.push(self.finalize(response).await);
        }
        finalized
    }

    /// The locked part: record, count, match, cooldown, record responses
    async fn propose(&self, event: Arc<Event>, all_matches: bool) -> Vec<Response> {
        let now = self.clock.now();
        let now_secs = now.timestamp();
        let retention = self.config.retention_secs;

        let mut histories = self.histories.lock().await;
        histories.events.append(event.clone());

        let occurrences = relevant(
            &histories.events.snapshot(),
            &event.guarantee_id,
            &event.agreement_term,
            retention,
            now_secs,
        )
        .len();
        if occurrences < self.config.threshold && !event.significant_on_own {
            debug!(
                guarantee_id = %event.guarantee_id,
                agreement_term = %event.agreement_term,
                occurrences = occurrences,
                threshold = self.config.threshold,
                "Not enough evidence yet"
            );
            self.update_size_metrics(&histories);
            return Vec::new();
        }

        let rules: Vec<&FiringCriteria> = if all_matches {
            self.rules.all_matching(&event, &now)
        } else {
            self.rules.first_matching(&event, &now).into_iter().collect()
        };
        if rules.is_empty() {
            debug!(
                guarantee_id = %event.guarantee_id,
                agreement_term = %event.agreement_term,
                "No rule matched"
            );
            self.update_size_metrics(&histories);
            return Vec::new();
        }

        let recent = relevant(
            &histories.adaptations.snapshot(),
            &event.guarantee_id,
            &event.agreement_term,
            retention,
            now_secs,
        );
        if let Some(previous) = recent.last() {
            if let Some(metrics) = &self.metrics {
                metrics.inc_cooldown_suppressed();
            }
            self.logger.log_cooldown(&event, previous.id);
            return Vec::new();
        }

        let mut proposed = Vec::with_capacity(rules.len());
        for rule in rules {
            let response = Response::new(
                event.clone(),
                rule.action_type,
                rule.response_parameters().to_string(),
                now_secs,
            );
            histories.adaptations.append(response.clone());
            if let Some(metrics) = &self.metrics {
                metrics.inc_responses_fired();
            }
            self.logger.log_adaptation_fired(&response);
            proposed.push(response);
        }
        self.update_size_metrics(&histories);
        proposed
    }

    /// Resolve the target, retrying a bounded number of times, then dispatch
    async fn finalize(&self, proposed: Response) -> Response {
        let started = Instant::now();
        let mut decided = self.engine.decide(proposed.clone()).await;

        let attempts = self.config.max_decision_attempts.max(1);
        let mut attempt = 1;
        while !decided.possible_to_adapt
            && attempt < attempts
            && self.config.retention_secs > RETRY_MIN_RETENTION_SECS
        {
            attempt += 1;
            debug!(
                response_id = proposed.id,
                attempt = attempt,
                reason = decided.reason.as_deref().unwrap_or(""),
                "Retrying infeasible decision"
            );
            decided = self.engine.decide(proposed.clone()).await;
        }
        if let Some(metrics) = &self.metrics {
            metrics.observe_decision_latency(started.elapsed().as_secs_f64());
        }

        // The decided copy replaces the proposal and keeps counting for the
        // cooldown. It must land before the enqueue so the worker's outcome
        // is always the later write.
        self.record_outcome(decided.clone()).await;

        if decided.possible_to_adapt {
            match &self.actuator {
                Some(actuator) => {
                    if let Err(e) = actuator.actuate(decided.clone()) {
                        warn!(response_id = decided.id, error = %e, "Failed to enqueue response");
                        decided.mark_infeasible(format!("actuation queue unavailable: {}", e));
                        self.record_outcome(decided.clone()).await;
                    }
                }
                None => debug!(response_id = decided.id, "No actuator bound, response not dispatched"),
            }
        }
        if !decided.possible_to_adapt {
            if let Some(metrics) = &self.metrics {
                metrics.inc_decisions_infeasible();
            }
            self.logger.log_infeasible(&decided);
        }

        self.audit
            .record(AuditStage::Decided, &decided, self.clock.now_secs());
        decided
    }

    /// Attach the application definition of application events
    async fn resolve_definition(&self, event: Event) -> Event {
        if event.definition().is_some() {
            return event;
        }
        let (Some(actuator), EventOrigin::Application(scope)) = (&self.actuator, &event.origin) else {
            return event;
        };

        let lookup = actuator
            .invoker()
            .application_definition(&scope.application_id, &scope.deployment_id)
            .await;
        match lookup {
            Ok(Some(definition)) => event.with_definition(definition),
            Ok(None) => event,
            Err(e) => {
                warn!(
                    guarantee_id = %event.guarantee_id,
                    error = %e,
                    "Failed to resolve application definition"
                );
                event
            }
        }
    }

    fn update_size_metrics(&self, histories: &Histories) {
        if let Some(metrics) = &self.metrics {
            metrics.set_history_sizes(histories.events.len(), histories.adaptations.len());
        }
    }
}

impl std::fmt::Debug for EventAssessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventAssessor")
            .field("rules", &self.rules.len())
            .field("engine", &self.engine.name())
            .field("config", &self.config)
            .finish()
    }
}

/// Builder for [`EventAssessor`]
pub struct EventAssessorBuilder {
    rules: Option<Arc<RuleCatalog>>,
    engine: Option<Arc<dyn DecisionEngine>>,
    actuator: Option<Arc<Actuator>>,
    clock: Arc<dyn TimeSource>,
    config: AssessorConfig,
    audit: Arc<AuditLog>,
    metrics: Option<AdaptorMetrics>,
    logger: StructuredLogger,
}

impl EventAssessorBuilder {
    pub fn new() -> Self {
        Self {
            rules: None,
            engine: None,
            actuator: None,
            clock: Arc::new(SystemClock),
            config: AssessorConfig::default(),
            audit: Arc::new(AuditLog::default()),
            metrics: None,
            logger: StructuredLogger::default(),
        }
    }

    /// Set the rule catalog
    pub fn rules(mut self, rules: Arc<RuleCatalog>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Set the decision engine. Defaults to the registry default bound to the actuator.
    pub fn decision_engine(mut self, engine: Arc<dyn DecisionEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn actuator(mut self, actuator: Arc<Actuator>) -> Self {
        self.actuator = Some(actuator);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn TimeSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(mut self, config: AssessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn retention_secs(mut self, secs: u64) -> Self {
        self.config.retention_secs = secs;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn threshold(mut self, threshold: usize) -> Self {
        self.config.threshold = threshold;
        self
    }

    pub fn multi_action(mut self, enabled: bool) -> Self {
        self.config.multi_action = enabled;
        self
    }

    pub fn max_decision_attempts(mut self, attempts: u32) -> Self {
        self.config.max_decision_attempts = attempts;
        self
    }

    pub fn audit(mut self, audit: Arc<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn metrics(mut self, metrics: AdaptorMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Build the assessor
    pub fn build(self) -> Result<EventAssessor> {
        let rules = self
            .rules
            .ok_or_else(|| anyhow::anyhow!("Rule catalog is required"))?;
        let engine = match self.engine {
            Some(engine) => engine,
            None => create_engine(
                DEFAULT_ENGINE,
                self.actuator.as_ref().map(|a| a.invoker().clone()),
            ),
        };

        Ok(EventAssessor {
            rules,
            engine,
            actuator: self.actuator,
            clock: self.clock,
            config: self.config,
            histories: Mutex::new(Histories::default()),
            audit: self.audit,
            metrics: self.metrics,
            logger: self.logger,
        })
    }
}

impl Default for EventAssessorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
