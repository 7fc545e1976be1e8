//! Worker layer
//!
//! A worker performs the actual collection for a batch of items. The engine
//! hands it every item of a job and gets back one future per item; each
//! future settles with the collected item or with an [`ItemFailure`].
//!
//! The returned futures are lazy: nothing runs until the engine polls them,
//! and the engine stops polling them once the job deadline expires.

mod http;

pub use http::HttpWorker;

use async_trait::async_trait;
use futures::future::BoxFuture;
use gleaner_core::domain::configuration::RemoteConfiguration;
use gleaner_core::domain::item::WorkItem;
use uuid::Uuid;

/// Settlement of one item: the collected item, or why it could not be collected
pub type ItemFuture = BoxFuture<'static, Result<WorkItem, ItemFailure>>;

/// Rejection produced by a worker
///
/// `item` should always be returned so the engine can match the failure to
/// the admitted item. A failure without an identifiable item is recorded as
/// malformed.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub item: Option<WorkItem>,
    pub reason: String,
}

impl ItemFailure {
    pub fn new(item: WorkItem, reason: impl Into<String>) -> Self {
        Self {
            item: Some(item),
            reason: reason.into(),
        }
    }

    /// A failure that lost track of its item
    pub fn detached(reason: impl Into<String>) -> Self {
        Self {
            item: None,
            reason: reason.into(),
        }
    }
}

/// Everything a worker receives for one job
#[derive(Debug, Clone)]
pub struct WorkerContext {
    /// Log correlation id of the job
    pub job_id: Uuid,
    /// Items admitted into the job; empty for the idle invocation
    pub items: Vec<WorkItem>,
    /// Configuration the producer is currently polling under
    pub configuration: Option<RemoteConfiguration>,
}

/// Pluggable collector invoked once per job
#[async_trait]
pub trait Worker: Send + Sync {
    /// Starts collecting `context.items`
    ///
    /// Called with an empty item list when the coordinator had no work, so
    /// the worker can do idle bookkeeping. Futures returned for that call are
    /// dropped without being polled.
    async fn run(&self, context: WorkerContext) -> Vec<ItemFuture>;
}
