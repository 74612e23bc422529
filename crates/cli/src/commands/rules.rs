//! Offline rule catalog commands

use adaptor_lib::{
    event::{Event, EventType, Operator},
    rules::{FiringCriteria, RuleCatalog},
};
use anyhow::{Context, Result};
use chrono::Local;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use crate::output::{or_dash, print_info, print_success, print_table, print_warning, OutputFormat};

/// Row for rules table
#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Term")]
    term: String,
    #[tabled(rename = "Op")]
    operator: String,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Type")]
    event_type: String,
    #[tabled(rename = "Magnitude")]
    magnitude: String,
    #[tabled(rename = "Parameters")]
    parameters: String,
}

impl RuleRow {
    fn new(index: usize, rule: &FiringCriteria) -> Self {
        Self {
            index,
            term: rule.agreement_term.clone(),
            operator: rule.operator.to_string(),
            action: rule.action_type.to_string(),
            event_type: or_dash(rule.event_type.map(|t| t.to_string()).as_deref()),
            magnitude: format_magnitude(rule.min_magnitude, rule.max_magnitude),
            parameters: or_dash(Some(rule.parameters.to_string().as_str())),
        }
    }
}

/// Rule with its catalog position, for JSON output
#[derive(Serialize)]
struct IndexedRule<'a> {
    index: usize,
    #[serde(flatten)]
    rule: &'a FiringCriteria,
}

/// A hypothetical event described on the command line
pub struct EventQuery {
    pub term: String,
    pub operator: String,
    pub raw: f64,
    pub guaranteed: f64,
    pub event_type: String,
    pub application: Option<String>,
    pub deployment: String,
}

impl EventQuery {
    fn to_event(&self) -> Result<Event> {
        let operator: Operator = self.operator.parse()?;
        let event_type: EventType = self.event_type.parse()?;
        let event = Event::new(
            "adaptctl",
            self.term.clone(),
            Local::now().timestamp(),
            self.raw,
            self.guaranteed,
            event_type,
            operator,
        );
        Ok(match &self.application {
            Some(app) => event.for_application(app.clone(), self.deployment.clone()),
            None => event,
        })
    }
}

fn load(catalog: &Path) -> Result<RuleCatalog> {
    RuleCatalog::load(catalog).with_context(|| format!("Invalid rule catalog {}", catalog.display()))
}

fn format_magnitude(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (None, None) => "-".to_string(),
        (Some(min), None) => format!(">= {}", min),
        (None, Some(max)) => format!("<= {}", max),
        (Some(min), Some(max)) => format!("{} .. {}", min, max),
    }
}

fn print_rules(rules: &[(usize, &FiringCriteria)], format: OutputFormat) -> Result<()> {
    let rows: Vec<RuleRow> = rules.iter().map(|(i, r)| RuleRow::new(*i, r)).collect();
    let items: Vec<IndexedRule> = rules
        .iter()
        .map(|(index, rule)| IndexedRule { index: *index, rule })
        .collect();
    print_table(rows, &items, format)
}

/// List the rules of a catalog in firing order
pub fn list_rules(catalog: &Path, format: OutputFormat) -> Result<()> {
    let catalog = load(catalog)?;
    let rules: Vec<(usize, &FiringCriteria)> =
        catalog.rules().iter().enumerate().map(|(i, r)| (i + 1, r)).collect();

    print_rules(&rules, format)?;
    if matches!(format, OutputFormat::Table) && !rules.is_empty() {
        println!("\nTotal: {} rules", rules.len());
    }
    Ok(())
}

/// Validate a catalog; parse errors carry their line number
pub fn check_rules(catalog: &Path, verbose: bool) -> Result<()> {
    let parsed = load(catalog)?;

    if parsed.is_empty() {
        print_warning(&format!("{} contains no rules", catalog.display()));
        return Ok(());
    }
    if verbose {
        for (i, rule) in parsed.rules().iter().enumerate() {
            print_info(&format!(
                "rule {}: {} {} -> {}",
                i + 1,
                rule.agreement_term,
                rule.operator,
                rule.action_type
            ));
        }
    }
    print_success(&format!("{} is valid ({} rules)", catalog.display(), parsed.len()));
    Ok(())
}

/// Show which rules would fire for the given event now
pub fn match_rules(catalog: &Path, query: &EventQuery, all: bool, format: OutputFormat) -> Result<()> {
    let catalog = load(catalog)?;
    let event = query.to_event()?;
    let now = Local::now();

    let matched: Vec<(usize, &FiringCriteria)> = catalog
        .rules()
        .iter()
        .enumerate()
        .filter(|(_, rule)| adaptor_lib::rules::should_fire_at(rule, &event, &now))
        .map(|(i, r)| (i + 1, r))
        .take(if all { usize::MAX } else { 1 })
        .collect();

    if matched.is_empty() {
        match format {
            OutputFormat::Table => print_warning("No rule would fire for this event"),
            OutputFormat::Json => println!("[]"),
        }
        return Ok(());
    }

    if matches!(format, OutputFormat::Table) {
        println!(
            "{} magnitude {} at {}",
            "Event".bold(),
            event.magnitude(),
            now.format("%a %H:%M")
        );
    }
    print_rules(&matched, format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(raw: f64, application: Option<&str>) -> EventQuery {
        EventQuery {
            term: "power_usage".to_string(),
            operator: "GT".to_string(),
            raw,
            guaranteed: 100.0,
            event_type: "breach".to_string(),
            application: application.map(str::to_string),
            deployment: "1".to_string(),
        }
    }

    #[test]
    fn test_query_builds_application_event() {
        let event = query(150.0, Some("lammps")).to_event().unwrap();
        assert_eq!(event.application_id(), Some("lammps"));
        assert_eq!(event.magnitude(), 50.0);
        assert_eq!(event.event_type, EventType::Breach);
    }

    #[test]
    fn test_query_rejects_bad_operator() {
        let mut bad = query(150.0, None);
        bad.operator = "ABOUT".to_string();
        assert!(bad.to_event().is_err());
    }

    #[test]
    fn test_format_magnitude() {
        assert_eq!(format_magnitude(None, None), "-");
        assert_eq!(format_magnitude(Some(10.0), Some(20.0)), "10 .. 20");
        assert_eq!(format_magnitude(None, Some(5.0)), "<= 5");
    }
}
