//! CLI subcommands

pub mod adaptations;
pub mod rules;
pub mod status;
