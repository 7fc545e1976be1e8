//! Gleaner Producer
//!
//! Polls the coordinator for batches of work items, collects them through a
//! pluggable [`Worker`](worker::Worker) and reports every outcome to the
//! item's destination callback and back to the coordinator.
//!
//! Architecture:
//! - Configuration: local settings from the environment
//! - Repositories: HTTP communication with the coordinator and destinations
//! - Engine: the single in-flight job, its deadline and reconciliation
//! - Services: destination routing
//! - Scheduler: configuration watch loop and poll loop

pub mod config;
pub mod engine;
pub mod error;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod shutdown;
pub mod worker;

#[cfg(test)]
mod testing;
