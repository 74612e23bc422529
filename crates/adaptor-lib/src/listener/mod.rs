//! Event sources
//!
//! A listener feeds events into the shared [`EventAssessor`]. Assessment
//! outcomes are logged by the listener and never propagated, so a bad event
//! cannot stop its source.

mod channel;
mod clock;

pub use channel::ChannelListener;
pub use clock::{ClockListener, ClockTrigger};

use crate::assessor::EventAssessor;
use crate::event::Event;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// A source of events bound to an assessor
#[async_trait]
pub trait EventListener: Send {
    fn set_event_assessor(&mut self, assessor: Arc<EventAssessor>);

    fn name(&self) -> &str;

    /// Run until the source is exhausted or shutdown is signaled
    async fn run(self: Box<Self>, shutdown: broadcast::Receiver<()>);
}

/// Assess one event and log what came of it
async fn assess_and_log(assessor: &EventAssessor, listener: &str, event: Event) {
    let guarantee_id = event.guarantee_id.clone();
    let agreement_term = event.agreement_term.clone();

    let responses = assessor.assess(event).await;
    if responses.is_empty() {
        debug!(
            listener = %listener,
            guarantee_id = %guarantee_id,
            agreement_term = %agreement_term,
            "Event assessed, no adaptation"
        );
        return;
    }
    for response in &responses {
        debug!(
            listener = %listener,
            response_id = response.id,
            action_type = %response.action_type,
            possible_to_adapt = response.possible_to_adapt,
            "Event assessed"
        );
    }
}
