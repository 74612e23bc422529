//! Rule catalog loading
//!
//! The catalog is a comma separated table, one rule per line:
//!
//! ```text
//! agreement_term,comparator,response_type[,event_type[,min_magnitude[,max_magnitude[,parameters]]]]
//! power_usage_per_app,GT,REMOVE_TASK,SLA_BREACH,,,application=lammps;TASK_TYPE=worker
//! ```
//!
//! Blank lines and lines starting with `#` are ignored, as is a header line
//! whose first cell is `agreement_term` (or `Agreement Term`). Empty optional
//! cells mean "unset". The catalog is immutable once loaded.

use super::{all_matching, first_matching, FiringCriteria};
use crate::error::{AdaptError, Result};
use crate::event::Event;
use crate::params::Parameters;
use chrono::{DateTime, Local};
use std::path::Path;
use tracing::info;

/// Ordered, immutable set of firing rules
#[derive(Debug, Clone, Default)]
pub struct RuleCatalog {
    rules: Vec<FiringCriteria>,
}

impl RuleCatalog {
    pub fn new(rules: Vec<FiringCriteria>) -> Self {
        Self { rules }
    }

    /// Load a catalog file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let catalog = Self::parse(&content)?;
        info!(path = %path.display(), rules = catalog.len(), "Loaded rule catalog");
        Ok(catalog)
    }

    /// Parse catalog text
    pub fn parse(content: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for (idx, raw_line) in content.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if is_header(line) {
                continue;
            }
            let rule = parse_line(line).map_err(|e| with_line(e, line_no))?;
            rules.push(rule);
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[FiringCriteria] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn first_matching(&self, event: &Event, now: &DateTime<Local>) -> Option<&FiringCriteria> {
        first_matching(&self.rules, event, now)
    }

    pub fn all_matching(&self, event: &Event, now: &DateTime<Local>) -> Vec<&FiringCriteria> {
        all_matching(&self.rules, event, now)
    }
}

fn is_header(line: &str) -> bool {
    let first = line.split(',').next().unwrap_or_default().trim();
    let normalized = first.to_ascii_lowercase().replace(' ', "_");
    normalized == "agreement_term"
}

fn parse_line(line: &str) -> Result<FiringCriteria> {
    let cells: Vec<&str> = line.splitn(7, ',').map(str::trim).collect();
    if cells.len() < 3 {
        return Err(AdaptError::CatalogParse {
            line: 0,
            message: format!(
                "expected at least 3 columns (term, comparator, response), got {}",
                cells.len()
            ),
        });
    }

    let term = cells[0];
    if term.is_empty() {
        return Err(AdaptError::CatalogParse {
            line: 0,
            message: "agreement term is empty".to_string(),
        });
    }

    let operator = cells[1].parse()?;
    let action_type = cells[2].parse()?;
    let mut rule = FiringCriteria::new(term, operator, action_type);

    if let Some(event_type) = optional(&cells, 3) {
        rule = rule.with_event_type(event_type.parse()?);
    }
    let min = optional(&cells, 4).map(|v| parse_number(v, "min_magnitude")).transpose()?;
    let max = optional(&cells, 5).map(|v| parse_number(v, "max_magnitude")).transpose()?;
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(AdaptError::CatalogParse {
                line: 0,
                message: format!("min_magnitude {} is greater than max_magnitude {}", min, max),
            });
        }
    }
    rule = rule.with_magnitude(min, max);

    if let Some(parameters) = optional(&cells, 6) {
        rule = rule.with_parameters(Parameters::parse(parameters))?;
    }

    Ok(rule)
}

fn optional<'a>(cells: &[&'a str], idx: usize) -> Option<&'a str> {
    cells.get(idx).copied().filter(|c| !c.is_empty())
}

fn parse_number(value: &str, column: &str) -> Result<f64> {
    value.parse().map_err(|_| AdaptError::CatalogParse {
        line: 0,
        message: format!("{} is not a number: {:?}", column, value),
    })
}

/// Attach the line number to parse errors raised below the line parser
fn with_line(error: AdaptError, line: usize) -> AdaptError {
    match error {
        AdaptError::CatalogParse { message, .. } => AdaptError::CatalogParse { line, message },
        other => AdaptError::CatalogParse {
            line,
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventType, Operator};
    use crate::response::ActionType;
    use std::io::Write;

    const CATALOG: &str = "\
Agreement Term,Comparator,Response Type,Event Type,Lower bound,Upper bound,Parameters
# power rules
power_usage_per_app,GT,REMOVE_TASK,SLA_BREACH,,,application=lammps;TASK_TYPE=worker
power_usage_per_app,GT,REDUCE_CLUSTER_POWER_CAP,,10,20,POWER_INCREMENT=50

IDLE_HOST,EQ,SHUTDOWN_HOST
clock,EQ,SCALE_TO_N_TASKS,OTHER,,,TASK_COUNT=2;DAY_OF_WEEK=1111100
";

    #[test]
    fn test_parse_catalog() {
        let catalog = RuleCatalog::parse(CATALOG).unwrap();
        assert_eq!(catalog.len(), 4);

        let first = &catalog.rules()[0];
        assert_eq!(first.agreement_term, "power_usage_per_app");
        assert_eq!(first.operator, Operator::Gt);
        assert_eq!(first.action_type, ActionType::RemoveTask);
        assert_eq!(first.event_type, Some(EventType::Breach));
        assert_eq!(first.application(), Some("lammps"));

        let second = &catalog.rules()[1];
        assert_eq!(second.min_magnitude, Some(10.0));
        assert_eq!(second.max_magnitude, Some(20.0));
        assert_eq!(second.event_type, None);

        let third = &catalog.rules()[2];
        assert_eq!(third.action_type, ActionType::ShutdownHost);
        assert!(third.parameters.is_empty());

        assert!(catalog.rules()[3].days().is_some());
    }

    #[test]
    fn test_parse_error_reports_line() {
        let bad = "power,GT,ADD_TASK\npower,BETWEEN,ADD_TASK\n";
        match RuleCatalog::parse(bad) {
            Err(AdaptError::CatalogParse { line, message }) => {
                assert_eq!(line, 2);
                assert!(message.contains("BETWEEN"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_too_few_columns() {
        assert!(RuleCatalog::parse("power,GT\n").is_err());
    }

    #[test]
    fn test_inverted_magnitude_bounds_rejected() {
        assert!(RuleCatalog::parse("power,GT,ADD_TASK,,20,10\n").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = RuleCatalog::load(file.path()).unwrap();
        assert_eq!(catalog.len(), 4);
    }
}
