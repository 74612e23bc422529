//! Semicolon-delimited `KEY=VALUE` parameter strings
//!
//! Used both for rule parameters in the catalog and for a response's
//! adaptation details. Key order is preserved; keys are case-sensitive.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    entries: Vec<(String, String)>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `KEY=VALUE;KEY=VALUE`. Empty segments are skipped and a
    /// segment without `=` becomes a key with an empty value.
    pub fn parse(input: &str) -> Self {
        let entries = input
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
                None => (segment.to_string(), String::new()),
            })
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a key, replacing an existing value in place
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key.to_string(), value)),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(";");
        write!(f, "{}", joined)
    }
}

impl Serialize for Parameters {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Parameters {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Parameters::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_get() {
        let params = Parameters::parse("application=lammps; TASK_TYPE = worker;;DAY_OF_WEEK=1111100");
        assert_eq!(params.get("application"), Some("lammps"));
        assert_eq!(params.get("TASK_TYPE"), Some("worker"));
        assert_eq!(params.get("DAY_OF_WEEK"), Some("1111100"));
        assert_eq!(params.get("missing"), None);
    }

    #[test]
    fn test_set_replaces_in_place() {
        let mut params = Parameters::parse("A=1;B=2");
        params.set("A", "3");
        params.set("C", "4");
        assert_eq!(params.to_string(), "A=3;B=2;C=4");
    }

    #[test]
    fn test_numeric_accessors() {
        let params = Parameters::parse("TASK_COUNT=4;SLACK_FACTOR=1.5;BAD=x");
        assert_eq!(params.get_u32("TASK_COUNT"), Some(4));
        assert_eq!(params.get_f64("SLACK_FACTOR"), Some(1.5));
        assert_eq!(params.get_u32("BAD"), None);
    }

    #[test]
    fn test_empty() {
        assert!(Parameters::parse("").is_empty());
        assert_eq!(Parameters::new().to_string(), "");
    }
}
