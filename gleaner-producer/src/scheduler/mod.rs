//! Scheduler layer for the producer
//!
//! Two timers drive the engine: the configuration watcher decides whether
//! the producer should poll at all, and the poller asks the engine to admit
//! a job on every tick.

pub mod periodic;
pub mod poller;
pub mod watcher;

pub use periodic::PeriodicTask;
pub use poller::JobPoller;
pub use watcher::{ConfigurationWatcher, ConnectionIssue, WATCH_CONFIGURATION_INTERVAL, WatchOutcome};
