//! Firing rules
//!
//! This module provides:
//! - Rule definitions with magnitude, type, temporal and application filters
//! - The matcher that evaluates rules against events
//! - Loading of the ordered rule catalog

mod catalog;
mod criteria;
mod matcher;

pub use catalog::RuleCatalog;
pub use criteria::{
    DayMask, FiringCriteria, TimeWindow, PARAM_APPLICATION, PARAM_DAY_OF_WEEK, PARAM_END_TIME,
    PARAM_START_TIME,
};
pub use matcher::{all_matching, first_matching, should_fire, should_fire_at};
