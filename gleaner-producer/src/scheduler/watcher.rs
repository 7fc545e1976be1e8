//! Configuration watch loop
//!
//! Fetches the remote configuration on a fixed interval and drives the
//! [`JobPoller`] from it: a new runnable revision (re)starts polling at its
//! interval, anything else stops polling. Fetch failures count as a missing
//! configuration and are retried on the next tick.

use gleaner_client::ClientError;
use gleaner_core::domain::configuration::{RemoteConfiguration, same_revision};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use super::periodic::PeriodicTask;
use super::poller::JobPoller;
use crate::engine::Engine;
use crate::repository::CoordinatorRepository;

/// Interval between two configuration checks
pub const WATCH_CONFIGURATION_INTERVAL: Duration = Duration::from_secs(10);

/// Why the coordinator refused or failed to return the configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionIssue {
    pub status: Option<u16>,
    pub message: String,
}

impl ConnectionIssue {
    /// Maps a client error to an operator-facing message
    pub fn diagnose(error: &ClientError) -> Self {
        let status = error.status();
        let message = match status {
            Some(404) => "unknown producer global id, check GLEANER_GLOBAL_ID".to_string(),
            Some(401) => "security key rejected, check GLEANER_SECURITY_KEY".to_string(),
            Some(403) => "producer is already connected by another instance".to_string(),
            Some(s) if (400..500).contains(&s) => {
                "request refused, check global id, serial id and security key".to_string()
            }
            Some(_) => "coordinator internal server error".to_string(),
            None if error.is_transport() => {
                "coordinator unreachable, internal server error".to_string()
            }
            None if matches!(
                error,
                ClientError::InvalidRequest(_) | ClientError::ParseError(_)
            ) =>
            {
                format!("request rejected: {}", error)
            }
            None => "coordinator internal server error".to_string(),
        };
        Self { status, message }
    }
}

impl fmt::Display for ConnectionIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (status {})", self.message, status),
            None => write!(f, "{}", self.message),
        }
    }
}

/// What one configuration check did to the poll loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Same revision as the current configuration
    Unchanged,
    /// Polling stopped: configuration missing, inactive or of another type
    Stopped,
    /// Polling (re)started at this interval
    Started(Duration),
}

struct State {
    current: Option<RemoteConfiguration>,
    last_issue: Option<ConnectionIssue>,
}

/// Drives the poll loop from the remote configuration
pub struct ConfigurationWatcher {
    coordinator: Arc<dyn CoordinatorRepository>,
    engine: Engine,
    poller: Arc<JobPoller>,
    producer_type: String,
    state: RwLock<State>,
    task: Mutex<Option<PeriodicTask>>,
}

impl ConfigurationWatcher {
    pub fn new(
        coordinator: Arc<dyn CoordinatorRepository>,
        engine: Engine,
        poller: Arc<JobPoller>,
        producer_type: impl Into<String>,
    ) -> Self {
        Self {
            coordinator,
            engine,
            poller,
            producer_type: producer_type.into(),
            state: RwLock::new(State {
                current: None,
                last_issue: None,
            }),
            task: Mutex::new(None),
        }
    }

    /// Configuration currently applied
    pub async fn current(&self) -> Option<RemoteConfiguration> {
        self.state.read().await.current.clone()
    }

    /// Failure of the last configuration fetch, cleared on success
    pub async fn last_issue(&self) -> Option<ConnectionIssue> {
        self.state.read().await.last_issue.clone()
    }

    /// Checks now, then every [`WATCH_CONFIGURATION_INTERVAL`]
    pub async fn start(self: &Arc<Self>) {
        self.check().await;

        let watcher = Arc::clone(self);
        let task = PeriodicTask::spawn(WATCH_CONFIGURATION_INTERVAL, move || {
            let watcher = Arc::clone(&watcher);
            async move {
                watcher.check().await;
            }
        });

        if let Some(previous) = self.task.lock().await.replace(task) {
            previous.stop();
        }
        info!(
            "Watching configuration every {:?}",
            WATCH_CONFIGURATION_INTERVAL
        );
    }

    /// Stops both loops and forgets the current configuration
    pub async fn stop(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.stop();
        }
        self.poller.stop().await;
        self.state.write().await.current = None;
        self.engine.set_configuration(None).await;
    }

    /// Runs one configuration check
    pub async fn check(&self) -> WatchOutcome {
        let fetched = match self.coordinator.fetch_configuration().await {
            Ok(configuration) => {
                self.state.write().await.last_issue = None;
                Some(configuration)
            }
            Err(e) => {
                let issue = ConnectionIssue::diagnose(&e);
                warn!("Failed to fetch configuration: {} ({})", issue, e);
                self.state.write().await.last_issue = Some(issue);
                None
            }
        };

        {
            let mut state = self.state.write().await;
            if same_revision(state.current.as_ref(), fetched.as_ref()) {
                debug!("Configuration unchanged");
                return WatchOutcome::Unchanged;
            }
            state.current = fetched.clone();
        }

        self.engine.set_configuration(fetched.clone()).await;

        match fetched {
            Some(configuration) if configuration.is_runnable_by(&self.producer_type) => {
                let interval = configuration.polling_interval();
                info!(
                    global_id = %configuration.global_id,
                    version = %configuration.version,
                    "Configuration changed, polling every {:?}",
                    interval
                );
                self.poller.start(interval).await;
                WatchOutcome::Started(interval)
            }
            Some(configuration) => {
                info!(
                    global_id = %configuration.global_id,
                    version = %configuration.version,
                    state = %configuration.state,
                    "Configuration changed but is not runnable by a {} producer, stopping poller",
                    self.producer_type
                );
                self.poller.stop().await;
                WatchOutcome::Stopped
            }
            None => {
                info!("Configuration missing, stopping poller");
                self.poller.stop().await;
                WatchOutcome::Stopped
            }
        }
    }
}
