//! Observability infrastructure for the adaptation manager
//!
//! Provides:
//! - Prometheus metrics (assessments, fired/suppressed/infeasible responses,
//!   actuation outcomes, history sizes, dispatcher queue depth)
//! - Structured JSON logging with tracing

use crate::event::Event;
use crate::response::Response;
use prometheus::{
    register_histogram, register_int_counter, register_int_gauge, Histogram, IntCounter, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for decision latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<AdaptorMetricsInner> = OnceLock::new();

struct AdaptorMetricsInner {
    events_assessed: IntCounter,
    responses_fired: IntCounter,
    cooldown_suppressed: IntCounter,
    decisions_infeasible: IntCounter,
    actuations_performed: IntCounter,
    actuation_failures: IntCounter,
    event_history_size: IntGauge,
    adaptation_history_size: IntGauge,
    dispatcher_queue_depth: IntGauge,
    decision_latency_seconds: Histogram,
}

impl AdaptorMetricsInner {
    fn new() -> Self {
        Self {
            events_assessed: register_int_counter!(
                "qos_adaptor_events_assessed_total",
                "Total number of events passed to the assessor"
            )
            .expect("Failed to register events_assessed"),

            responses_fired: register_int_counter!(
                "qos_adaptor_responses_fired_total",
                "Total number of responses created by a matching rule"
            )
            .expect("Failed to register responses_fired"),

            cooldown_suppressed: register_int_counter!(
                "qos_adaptor_cooldown_suppressed_total",
                "Total number of matches suppressed by an active cooldown"
            )
            .expect("Failed to register cooldown_suppressed"),

            decisions_infeasible: register_int_counter!(
                "qos_adaptor_decisions_infeasible_total",
                "Total number of responses the decision engine could not target"
            )
            .expect("Failed to register decisions_infeasible"),

            actuations_performed: register_int_counter!(
                "qos_adaptor_actuations_performed_total",
                "Total number of responses executed successfully"
            )
            .expect("Failed to register actuations_performed"),

            actuation_failures: register_int_counter!(
                "qos_adaptor_actuation_failures_total",
                "Total number of responses whose execution failed"
            )
            .expect("Failed to register actuation_failures"),

            event_history_size: register_int_gauge!(
                "qos_adaptor_event_history_size",
                "Number of events in the live event history"
            )
            .expect("Failed to register event_history_size"),

            adaptation_history_size: register_int_gauge!(
                "qos_adaptor_adaptation_history_size",
                "Number of responses in the live adaptation history"
            )
            .expect("Failed to register adaptation_history_size"),

            dispatcher_queue_depth: register_int_gauge!(
                "qos_adaptor_dispatcher_queue_depth",
                "Responses waiting in the actuation queue"
            )
            .expect("Failed to register dispatcher_queue_depth"),

            decision_latency_seconds: register_histogram!(
                "qos_adaptor_decision_latency_seconds",
                "Time spent in the decision engine per response",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register decision_latency_seconds"),
        }
    }
}

/// Adaptor metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Debug, Clone)]
pub struct AdaptorMetrics {
    _private: (),
}

impl Default for AdaptorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdaptorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AdaptorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AdaptorMetricsInner {
        GLOBAL_METRICS.get_or_init(AdaptorMetricsInner::new)
    }

    pub fn inc_events_assessed(&self) {
        self.inner().events_assessed.inc();
    }

    pub fn inc_responses_fired(&self) {
        self.inner().responses_fired.inc();
    }

    pub fn inc_cooldown_suppressed(&self) {
        self.inner().cooldown_suppressed.inc();
    }

    pub fn inc_decisions_infeasible(&self) {
        self.inner().decisions_infeasible.inc();
    }

    pub fn inc_actuations_performed(&self) {
        self.inner().actuations_performed.inc();
    }

    pub fn inc_actuation_failures(&self) {
        self.inner().actuation_failures.inc();
    }

    pub fn set_history_sizes(&self, events: usize, adaptations: usize) {
        self.inner().event_history_size.set(events as i64);
        self.inner().adaptation_history_size.set(adaptations as i64);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.inner().dispatcher_queue_depth.set(depth as i64);
    }

    pub fn queue_depth(&self) -> i64 {
        self.inner().dispatcher_queue_depth.get()
    }

    pub fn observe_decision_latency(&self, duration_secs: f64) {
        self.inner().decision_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for adaptation events
///
/// Provides consistent JSON-formatted logging for assessments, decisions
/// and actuation outcomes.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("unknown")
    }
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// A rule fired and a response was recorded
    pub fn log_adaptation_fired(&self, response: &Response) {
        info!(
            event = "adaptation_fired",
            node = %self.node_name,
            response_id = response.id,
            guarantee_id = %response.guarantee_id(),
            agreement_term = %response.agreement_term(),
            action_type = %response.action_type,
            details = %response.adaptation_details,
            "Rule matched, adaptation proposed"
        );
    }

    /// A match was suppressed because the pair adapted recently
    pub fn log_cooldown(&self, event: &Event, previous_response_id: u64) {
        info!(
            event = "cooldown_active",
            node = %self.node_name,
            guarantee_id = %event.guarantee_id,
            agreement_term = %event.agreement_term,
            previous_response_id = previous_response_id,
            "Adaptation suppressed, recent adaptation for this guarantee"
        );
    }

    pub fn log_infeasible(&self, response: &Response) {
        warn!(
            event = "adaptation_infeasible",
            node = %self.node_name,
            response_id = response.id,
            guarantee_id = %response.guarantee_id(),
            action_type = %response.action_type,
            reason = response.reason.as_deref().unwrap_or("unspecified"),
            "Decision engine found no feasible target"
        );
    }

    pub fn log_dispatched(&self, response: &Response) {
        info!(
            event = "adaptation_dispatched",
            node = %self.node_name,
            response_id = response.id,
            action_type = %response.action_type,
            application_id = response.application_id.as_deref().unwrap_or(""),
            deployment_id = response.deployment_id.as_deref().unwrap_or(""),
            task_id = response.task_id.as_deref().unwrap_or(""),
            host = response.host_name.as_deref().unwrap_or(""),
            details = %response.adaptation_details,
            "Adaptation handed to actuator"
        );
    }

    pub fn log_actuated(&self, response: &Response) {
        info!(
            event = "adaptation_performed",
            node = %self.node_name,
            response_id = response.id,
            action_type = %response.action_type,
            "Adaptation performed"
        );
    }

    pub fn log_actuation_failure(&self, response: &Response, error: &str) {
        warn!(
            event = "actuation_failed",
            node = %self.node_name,
            response_id = response.id,
            action_type = %response.action_type,
            error = %error,
            "Actuation failed"
        );
    }

    pub fn log_history_pruned(&self, events_dropped: usize, adaptations_dropped: usize) {
        if events_dropped > 0 || adaptations_dropped > 0 {
            info!(
                event = "history_pruned",
                node = %self.node_name,
                events_dropped = events_dropped,
                adaptations_dropped = adaptations_dropped,
                "Pruned expired history entries"
            );
        }
    }

    pub fn log_startup(&self, version: &str, decision_engine: &str, rules: usize) {
        info!(
            event = "adaptor_started",
            node = %self.node_name,
            version = %version,
            decision_engine = %decision_engine,
            rules = rules,
            "QoS adaptor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "adaptor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "QoS adaptor shutting down"
        );
    }
}
