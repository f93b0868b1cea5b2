use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

pub const OUTPUT_LOCATION_KEY: &str = "OutputLocation";

/// Opaque handle the remote service hands out on submission.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryExecutionId(String);

impl QueryExecutionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for an empty or whitespace-only id.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for QueryExecutionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for QueryExecutionId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Display for QueryExecutionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

pub const INTERMEDIATE_STATES: &[QueryState] = &[QueryState::Queued, QueryState::Running];
pub const SUCCESS_STATES: &[QueryState] = &[QueryState::Succeeded];
pub const FAILURE_STATES: &[QueryState] = &[QueryState::Failed, QueryState::Cancelled];
pub const TERMINAL_STATES: &[QueryState] = &[
    QueryState::Succeeded,
    QueryState::Failed,
    QueryState::Cancelled,
];

impl QueryState {
    pub const ALL: [QueryState; 5] = [
        QueryState::Queued,
        QueryState::Running,
        QueryState::Succeeded,
        QueryState::Failed,
        QueryState::Cancelled,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "QUEUED",
            Self::Running => "RUNNING",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Unknown spellings yield `None`; callers treat that like a missing state.
    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == raw.trim())
    }

    pub fn is_intermediate(self) -> bool {
        INTERMEDIATE_STATES.contains(&self)
    }

    pub fn is_success(self) -> bool {
        SUCCESS_STATES.contains(&self)
    }

    pub fn is_failure(self) -> bool {
        FAILURE_STATES.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        TERMINAL_STATES.contains(&self)
    }
}

impl Display for QueryState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution context such as the target database or catalog.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryContext(BTreeMap<String, String>);

impl QueryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for QueryContext {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Where and how results are stored. Values are kept as raw JSON and forwarded untouched.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultConfiguration(BTreeMap<String, serde_json::Value>);

impl ResultConfiguration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_output_location(self, location: impl Into<String>) -> Self {
        self.with(
            OUTPUT_LOCATION_KEY,
            serde_json::Value::String(location.into()),
        )
    }

    pub fn with(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn output_location(&self) -> Option<&str> {
        self.0
            .get(OUTPUT_LOCATION_KEY)
            .and_then(serde_json::Value::as_str)
    }

    pub fn entries(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::{QueryExecutionId, QueryState, ResultConfiguration, TERMINAL_STATES};

    #[test]
    fn blank_ids_include_whitespace_only() {
        assert!(QueryExecutionId::from("").is_blank());
        assert!(QueryExecutionId::from("  \t").is_blank());
        assert!(!QueryExecutionId::from("q-1").is_blank());
    }

    #[test]
    fn every_state_is_either_intermediate_or_terminal() {
        for state in QueryState::ALL {
            assert_ne!(state.is_intermediate(), state.is_terminal(), "{state}");
        }
    }

    #[test]
    fn terminal_states_are_success_or_failure() {
        for state in TERMINAL_STATES {
            assert!(state.is_success() ^ state.is_failure());
        }
    }

    #[test]
    fn parses_wire_spellings() {
        assert_eq!(QueryState::parse("SUCCEEDED"), Some(QueryState::Succeeded));
        assert_eq!(QueryState::parse(" QUEUED\n"), Some(QueryState::Queued));
        assert_eq!(QueryState::parse("succeeded"), None);
        assert_eq!(QueryState::parse("PAUSED"), None);
    }

    #[test]
    fn serde_uses_upper_case_names() {
        let encoded = serde_json::to_string(&QueryState::Cancelled).unwrap();
        assert_eq!(encoded, "\"CANCELLED\"");
    }

    #[test]
    fn output_location_reads_string_value_only() {
        let config = ResultConfiguration::new().with_output_location("s3://bucket/out/");
        assert_eq!(config.output_location(), Some("s3://bucket/out/"));

        let numeric = ResultConfiguration::new().with("OutputLocation", serde_json::json!(7));
        assert_eq!(numeric.output_location(), None);
    }
}
