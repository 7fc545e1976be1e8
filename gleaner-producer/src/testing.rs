//! In-memory collaborators for engine, router and scheduler tests

use async_trait::async_trait;
use futures::FutureExt;
use gleaner_client::{ClientError, Result};
use gleaner_core::domain::configuration::RemoteConfiguration;
use gleaner_core::domain::item::{Destination, WorkItem};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Notify;

use crate::repository::{CoordinatorRepository, DestinationRepository};
use crate::worker::{ItemFailure, ItemFuture, Worker, WorkerContext};

/// Coordinator answering from scripted batches
///
/// Once the script runs out, every fetch returns an empty batch.
#[derive(Default)]
pub struct FakeCoordinator {
    batches: Mutex<VecDeque<std::result::Result<Vec<WorkItem>, u16>>>,
    configuration: Mutex<Option<std::result::Result<RemoteConfiguration, u16>>>,
    updates: Mutex<Vec<Vec<WorkItem>>>,
    fetches: AtomicUsize,
    configuration_fetches: AtomicUsize,
    failing_updates: AtomicBool,
    gate: Mutex<Option<Arc<Notify>>>,
}

impl FakeCoordinator {
    pub fn with_batches(batches: Vec<Vec<WorkItem>>) -> Self {
        let coordinator = Self::default();
        for batch in batches {
            coordinator.push_batch(batch);
        }
        coordinator
    }

    pub fn push_batch(&self, items: Vec<WorkItem>) {
        self.batches.lock().unwrap().push_back(Ok(items));
    }

    pub fn push_fetch_error(&self, status: u16) {
        self.batches.lock().unwrap().push_back(Err(status));
    }

    pub fn set_configuration(&self, configuration: RemoteConfiguration) {
        *self.configuration.lock().unwrap() = Some(Ok(configuration));
    }

    pub fn fail_configuration(&self, status: u16) {
        *self.configuration.lock().unwrap() = Some(Err(status));
    }

    /// Makes the next fetch wait until the returned gate is notified
    pub fn hold_next_fetch(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn fail_updates(&self) {
        self.failing_updates.store(true, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn configuration_calls(&self) -> usize {
        self.configuration_fetches.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.lock().unwrap().len()
    }

    /// Every item sent in any update call, in call order
    pub fn updated_items(&self) -> Vec<WorkItem> {
        self.updates.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl CoordinatorRepository for FakeCoordinator {
    async fn fetch_configuration(&self) -> Result<RemoteConfiguration> {
        self.configuration_fetches.fetch_add(1, Ordering::SeqCst);
        match self.configuration.lock().unwrap().clone() {
            Some(Ok(configuration)) => Ok(configuration),
            Some(Err(status)) => Err(ClientError::api_error(status, "scripted failure")),
            None => Err(ClientError::api_error(404, "producer not found")),
        }
    }

    async fn fetch_items(&self) -> Result<Vec<WorkItem>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match self.batches.lock().unwrap().pop_front() {
            Some(Ok(items)) => Ok(items),
            Some(Err(status)) => Err(ClientError::api_error(status, "scripted failure")),
            None => Ok(Vec::new()),
        }
    }

    async fn update_items(&self, items: &[WorkItem]) -> Result<()> {
        self.updates.lock().unwrap().push(items.to_vec());
        if self.failing_updates.load(Ordering::SeqCst) {
            return Err(ClientError::api_error(502, "bad gateway"));
        }
        Ok(())
    }
}

/// Destinations recording what they receive
#[derive(Default)]
pub struct FakeDestinations {
    failing_base: Option<String>,
    delivered: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeDestinations {
    /// Destinations where `base_url` answers 503
    pub fn failing_for(base_url: &str) -> Self {
        Self {
            failing_base: Some(base_url.to_string()),
            ..Self::default()
        }
    }

    /// Ids of successfully delivered items, in delivery order
    pub fn delivered_ids(&self) -> Vec<String> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .flat_map(|(_, ids)| ids.clone())
            .collect()
    }

    /// Successful deliveries as `(base_url, ids)`
    pub fn deliveries(&self) -> Vec<(String, Vec<String>)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl DestinationRepository for FakeDestinations {
    async fn deliver(&self, destination: &Destination, items: &[WorkItem]) -> Result<()> {
        let base = destination.base_url.clone().unwrap_or_default();
        if self.failing_base.as_deref() == Some(base.as_str()) {
            return Err(ClientError::api_error(503, "service unavailable"));
        }
        let ids = items.iter().map(|i| i.global_id.clone()).collect();
        self.delivered.lock().unwrap().push((base, ids));
        Ok(())
    }
}

type Script = Box<dyn Fn(&WorkerContext) -> Vec<ItemFuture> + Send + Sync>;

/// Worker driven by a closure, recording every invocation
pub struct ScriptedWorker {
    script: Script,
    contexts: Mutex<Vec<WorkerContext>>,
}

impl ScriptedWorker {
    pub fn new(script: impl Fn(&WorkerContext) -> Vec<ItemFuture> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            contexts: Mutex::new(Vec::new()),
        }
    }

    /// Settles every item successfully with a dataset
    pub fn succeeding() -> Self {
        Self::new(|context| {
            context
                .items
                .iter()
                .cloned()
                .map(|mut item| {
                    item.dataset = Some(json!({ "collected": item.global_id }));
                    futures::future::ready(Ok::<_, ItemFailure>(item)).boxed()
                })
                .collect()
        })
    }

    /// Rejects the items whose id is in `rejected`, settles the others
    pub fn rejecting(rejected: &'static [&'static str]) -> Self {
        Self::new(move |context| {
            context
                .items
                .iter()
                .cloned()
                .map(|mut item| {
                    let result = if rejected.contains(&item.global_id.as_str()) {
                        Err(ItemFailure::new(item, "page unreachable"))
                    } else {
                        item.dataset = Some(json!({ "collected": item.global_id }));
                        Ok(item)
                    };
                    futures::future::ready(result).boxed()
                })
                .collect()
        })
    }

    /// Never settles any item
    pub fn stalled() -> Self {
        Self::new(|context| {
            context
                .items
                .iter()
                .map(|_| futures::future::pending::<std::result::Result<WorkItem, ItemFailure>>().boxed())
                .collect()
        })
    }

    /// Panics on every non-empty batch before returning any future
    pub fn panicking() -> Self {
        Self::new(|context| {
            if context.items.is_empty() {
                return Vec::new();
            }
            panic!("worker bug");
        })
    }

    /// Settles the items whose id is not in `panicking`; the others panic when polled
    pub fn panicking_on(panicking: &'static [&'static str]) -> Self {
        Self::new(move |context| {
            context
                .items
                .iter()
                .cloned()
                .map(|mut item| {
                    if panicking.contains(&item.global_id.as_str()) {
                        return futures::future::lazy(
                            |_| -> std::result::Result<WorkItem, ItemFailure> { panic!("worker bug") },
                        )
                        .boxed();
                    }
                    item.dataset = Some(json!({ "collected": item.global_id }));
                    futures::future::ready(Ok::<_, ItemFailure>(item)).boxed()
                })
                .collect()
        })
    }

    pub fn calls(&self) -> usize {
        self.contexts.lock().unwrap().len()
    }

    pub fn contexts(&self) -> Vec<WorkerContext> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Worker for ScriptedWorker {
    async fn run(&self, context: WorkerContext) -> Vec<ItemFuture> {
        let futures = (self.script)(&context);
        self.contexts.lock().unwrap().push(context);
        futures
    }
}

/// Pending item whose callback is `POST {base_url}/cb`
pub fn routed(id: &str, base_url: &str) -> WorkItem {
    WorkItem::new(id).with_destination(Destination::new(base_url, "POST", "/cb"))
}
