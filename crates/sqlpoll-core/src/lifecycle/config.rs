use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::models::{CoreError, CoreErrorKind};

pub const DEFAULT_SLEEP_TIME: Duration = Duration::from_secs(30);

/// Immutable manager settings, fixed at construction.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Wait between two consecutive status checks while polling.
    #[serde(rename = "sleep_time_secs", with = "duration_secs")]
    pub sleep_time: Duration,
    /// Log the full submission parameters, query text included.
    pub log_query: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            sleep_time: DEFAULT_SLEEP_TIME,
            log_query: true,
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleep_time(mut self, sleep_time: Duration) -> Self {
        self.sleep_time = sleep_time;
        self
    }

    pub fn log_query(mut self, log_query: bool) -> Self {
        self.log_query = log_query;
        self
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CoreError> {
        serde_json::from_str(raw).map_err(|error| {
            CoreError::new(
                CoreErrorKind::ParseFailure,
                format!("invalid manager configuration: {error}"),
            )
        })
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{DEFAULT_SLEEP_TIME, ManagerConfig};
    use crate::models::CoreErrorKind;

    #[test]
    fn defaults_match_documented_values() {
        let config = ManagerConfig::default();
        assert_eq!(config.sleep_time, DEFAULT_SLEEP_TIME);
        assert!(config.log_query);
    }

    #[test]
    fn partial_json_keeps_defaults_for_missing_keys() {
        let config = ManagerConfig::from_json_str(r#"{ "sleep_time_secs": 5 }"#).unwrap();
        assert_eq!(config.sleep_time, Duration::from_secs(5));
        assert!(config.log_query);

        let config = ManagerConfig::from_json_str(r#"{ "log_query": false }"#).unwrap();
        assert_eq!(config.sleep_time, DEFAULT_SLEEP_TIME);
        assert!(!config.log_query);
    }

    #[test]
    fn malformed_json_is_a_parse_failure() {
        let error = ManagerConfig::from_json_str(r#"{ "sleep_time_secs": "soon" }"#).unwrap_err();
        assert_eq!(error.kind, CoreErrorKind::ParseFailure);
    }
}
