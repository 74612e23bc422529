//! Power ranked target selection
//!
//! Removes the task drawing the most power, grows the task type drawing the
//! least, starts the host with the cheapest idle draw and shuts down the
//! most expensive idle one.

use super::base::{TargetSelector, TaskCandidate, TypeCandidate};
use crate::models::HostInfo;

#[derive(Debug, Default, Clone, Copy)]
pub struct PowerSelector;

impl TargetSelector for PowerSelector {
    fn order_types(&self, candidates: &mut [TypeCandidate]) {
        candidates.sort_by(|a, b| {
            a.average_power
                .total_cmp(&b.average_power)
                .then_with(|| a.name.cmp(&b.name))
        });
    }

    fn order_removals(&self, candidates: &mut [TaskCandidate]) {
        candidates.sort_by(|a, b| {
            b.power
                .total_cmp(&a.power)
                .then_with(|| a.task.task_id.cmp(&b.task.task_id))
        });
    }

    fn order_hosts(&self, hosts: &mut [HostInfo]) {
        hosts.sort_by(|a, b| {
            a.idle_power_watts
                .total_cmp(&b.idle_power_watts)
                .then_with(|| a.name.cmp(&b.name))
        });
    }
}
