//! Producer configuration
//!
//! Local settings only: how to reach the coordinator and who this producer
//! is. The polling interval is not configurable here, it always comes from
//! the remote configuration.

use std::time::Duration;

/// Producer type declared when none is configured
pub const DEFAULT_PRODUCER_TYPE: &str = "HTTP";

/// Default per-request HTTP timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Producer configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Coordinator base URL (e.g., "http://localhost:9081")
    pub base_url: String,

    /// Global id the coordinator registered this producer under
    pub global_id: String,

    /// Sent as `x-security-key` when set
    pub security_key: Option<String>,

    /// Identifies this process to the coordinator; random per process unless set
    pub serial_id: String,

    /// Type this producer declares; configurations of another type are not polled
    pub producer_type: String,

    /// Timeout applied to every HTTP request
    pub request_timeout: Duration,
}

impl Config {
    /// Creates a new configuration with defaults
    pub fn new(base_url: String, global_id: String) -> Self {
        Self {
            base_url,
            global_id,
            security_key: None,
            serial_id: uuid::Uuid::new_v4().to_string(),
            producer_type: DEFAULT_PRODUCER_TYPE.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - GLEANER_BASE_URL (required)
    /// - GLEANER_GLOBAL_ID (required)
    /// - GLEANER_SECURITY_KEY (optional)
    /// - GLEANER_SERIAL_ID (optional, default: random UUID)
    /// - GLEANER_PRODUCER_TYPE (optional, default: HTTP)
    /// - GLEANER_REQUEST_TIMEOUT (optional, seconds, default: 30)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let base_url = var("GLEANER_BASE_URL")
            .ok_or_else(|| anyhow::anyhow!("GLEANER_BASE_URL environment variable not set"))?;

        let global_id = var("GLEANER_GLOBAL_ID")
            .ok_or_else(|| anyhow::anyhow!("GLEANER_GLOBAL_ID environment variable not set"))?;

        let mut config = Self::new(base_url, global_id);
        config.security_key = var("GLEANER_SECURITY_KEY");

        if let Some(serial_id) = var("GLEANER_SERIAL_ID") {
            config.serial_id = serial_id;
        }

        if let Some(producer_type) = var("GLEANER_PRODUCER_TYPE") {
            config.producer_type = producer_type;
        }

        if let Some(timeout) = var("GLEANER_REQUEST_TIMEOUT") {
            let secs = timeout.trim().parse::<u64>().map_err(|_| {
                anyhow::anyhow!("GLEANER_REQUEST_TIMEOUT must be a number of seconds")
            })?;
            config.request_timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("base_url cannot be empty");
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            anyhow::bail!("base_url must start with http:// or https://");
        }

        if self.global_id.trim().is_empty() {
            anyhow::bail!("global_id cannot be empty");
        }

        if self.producer_type.trim().is_empty() {
            anyhow::bail!("producer_type cannot be empty");
        }

        if self.request_timeout.as_secs() == 0 {
            anyhow::bail!("request_timeout must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    /// Local coordinator; the global id must still be provided
    fn default() -> Self {
        Self::new("http://localhost:9081".to_string(), String::new())
    }
}
