//! Event and adaptation histories
//!
//! This module provides:
//! - Pure filters by identity (guarantee id + agreement term) and by age
//! - An owned history store with append/snapshot/prune

mod aggregator;
mod store;

pub use aggregator::{filter_by_age, filter_by_identity, relevant};
pub use store::History;

use crate::event::Event;
use crate::response::Response;
use std::sync::Arc;

/// Anything that can be kept in a history and filtered by identity and age
pub trait HistoryEntry {
    /// Unix seconds
    fn time(&self) -> i64;
    fn guarantee_id(&self) -> &str;
    fn agreement_term(&self) -> &str;
}

impl HistoryEntry for Event {
    fn time(&self) -> i64 {
        self.time
    }

    fn guarantee_id(&self) -> &str {
        &self.guarantee_id
    }

    fn agreement_term(&self) -> &str {
        &self.agreement_term
    }
}

impl HistoryEntry for Response {
    fn time(&self) -> i64 {
        self.time
    }

    fn guarantee_id(&self) -> &str {
        &self.cause.guarantee_id
    }

    fn agreement_term(&self) -> &str {
        &self.cause.agreement_term
    }
}

impl<T: HistoryEntry> HistoryEntry for Arc<T> {
    fn time(&self) -> i64 {
        (**self).time()
    }

    fn guarantee_id(&self) -> &str {
        (**self).guarantee_id()
    }

    fn agreement_term(&self) -> &str {
        (**self).agreement_term()
    }
}
