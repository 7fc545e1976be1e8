//! Remote producer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Polling interval used when the coordinator does not supply one
pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 30;

/// State the coordinator reports for a producer that should be collecting
pub const ACTIVE_STATE: &str = "ACTIVE";

/// Producer configuration as stored by the coordinator
///
/// Two configurations describe the same revision when their
/// `(global_id, version)` pair is equal; every other field is only
/// consulted once a change has been detected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfiguration {
    #[serde(default)]
    pub global_id: String,

    #[serde(default)]
    pub version: String,

    /// Producer type this configuration was registered for
    #[serde(default, rename = "type")]
    pub producer_type: String,

    #[serde(default)]
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub polling_interval_seconds: Option<u64>,
}

impl RemoteConfiguration {
    /// Revision identity used for change detection
    pub fn revision(&self) -> (&str, &str) {
        (&self.global_id, &self.version)
    }

    pub fn is_same_revision(&self, other: &RemoteConfiguration) -> bool {
        self.revision() == other.revision()
    }

    pub fn is_active(&self) -> bool {
        self.state.trim().eq_ignore_ascii_case(ACTIVE_STATE)
    }

    /// Whether this configuration was registered for `declared_type`
    pub fn matches_type(&self, declared_type: &str) -> bool {
        !self.producer_type.trim().is_empty()
            && self
                .producer_type
                .trim()
                .eq_ignore_ascii_case(declared_type.trim())
    }

    /// Whether a producer of `declared_type` should poll under this configuration
    pub fn is_runnable_by(&self, declared_type: &str) -> bool {
        !self.global_id.trim().is_empty() && self.matches_type(declared_type) && self.is_active()
    }

    /// Interval between polls, never shorter than one second
    pub fn polling_interval(&self) -> Duration {
        let secs = self
            .polling_interval_seconds
            .unwrap_or(DEFAULT_POLLING_INTERVAL_SECS)
            .max(1);
        Duration::from_secs(secs)
    }
}

/// Compares two optional configurations by revision
///
/// Two absent configurations are the same; an absent and a present one never are.
pub fn same_revision(a: Option<&RemoteConfiguration>, b: Option<&RemoteConfiguration>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.is_same_revision(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(version: &str) -> RemoteConfiguration {
        RemoteConfiguration {
            global_id: "producer-1".to_string(),
            version: version.to_string(),
            producer_type: "HTTP".to_string(),
            state: "ACTIVE".to_string(),
            polling_interval_seconds: Some(5),
        }
    }

    #[test]
    fn test_deserialize_from_coordinator() {
        let config: RemoteConfiguration = serde_json::from_value(json!({
            "globalId": "producer-1",
            "version": "3",
            "type": "http",
            "state": "active",
            "pollingIntervalSeconds": 10
        }))
        .unwrap();

        assert!(config.is_runnable_by("HTTP"));
        assert_eq!(config.polling_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_revision_ignores_other_fields() {
        let a = config("1");
        let mut b = config("1");
        b.polling_interval_seconds = Some(60);
        b.state = "DRAFT".to_string();

        assert!(a.is_same_revision(&b));
        assert!(!a.is_same_revision(&config("2")));
    }

    #[test]
    fn test_same_revision_with_absent_configurations() {
        assert!(same_revision(None, None));
        assert!(!same_revision(Some(&config("1")), None));
        assert!(!same_revision(None, Some(&config("1"))));
        assert!(same_revision(Some(&config("1")), Some(&config("1"))));
    }

    #[test]
    fn test_not_runnable_when_type_differs_or_inactive() {
        let mut c = config("1");
        assert!(!c.is_runnable_by("HEADLESS"));

        c.state = "DRAFT".to_string();
        assert!(!c.is_runnable_by("HTTP"));

        let mut c = config("1");
        c.producer_type = String::new();
        assert!(!c.is_runnable_by(""));

        let mut c = config("1");
        c.global_id = String::new();
        assert!(!c.is_runnable_by("HTTP"));
    }

    #[test]
    fn test_polling_interval_defaults_and_floor() {
        let mut c = config("1");
        c.polling_interval_seconds = None;
        assert_eq!(
            c.polling_interval(),
            Duration::from_secs(DEFAULT_POLLING_INTERVAL_SECS)
        );

        c.polling_interval_seconds = Some(0);
        assert_eq!(c.polling_interval(), Duration::from_secs(1));
    }
}
