//! Random target selection

use super::base::{TargetSelector, TaskCandidate, TypeCandidate};
use crate::models::HostInfo;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Mutex;

/// Picks arbitrarily among feasible candidates
#[derive(Debug)]
pub struct RandomSelector {
    rng: Mutex<StdRng>,
}

impl Default for RandomSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSelector {
    pub fn new() -> Self {
        Self::with_seed(rand::random())
    }

    /// Deterministic selection, for replays and tests
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn shuffle<T>(&self, items: &mut [T]) {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        items.shuffle(&mut *rng);
    }
}

impl TargetSelector for RandomSelector {
    fn order_types(&self, candidates: &mut [TypeCandidate]) {
        self.shuffle(candidates);
    }

    fn order_removals(&self, candidates: &mut [TaskCandidate]) {
        self.shuffle(candidates);
    }

    fn order_hosts(&self, hosts: &mut [HostInfo]) {
        self.shuffle(hosts);
    }
}
