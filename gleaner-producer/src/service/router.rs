//! Destination router
//!
//! Groups reconciled items by destination callback and delivers every group
//! independently: a failed delivery marks that group's items `FAILED`, then
//! the group is reported to the coordinator whatever happened. One group
//! failing never affects another group.

use futures::future::join_all;
use gleaner_client::ClientError;
use gleaner_core::domain::item::{Destination, WorkItem};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::repository::{CoordinatorRepository, DestinationRepository};

/// Items sharing one destination callback
#[derive(Debug, Clone)]
pub struct DeliveryGroup {
    /// `method:url`, lowercased; `None` for items without a usable destination
    pub key: Option<String>,
    pub destination: Option<Destination>,
    pub items: Vec<WorkItem>,
}

/// What happened to one group
#[derive(Debug, Clone)]
pub struct GroupOutcome {
    pub key: Option<String>,
    /// `None` when no delivery was attempted
    pub delivered: Option<bool>,
    /// Whether the coordinator accepted the update
    pub reported: bool,
    /// Items as reported to the coordinator
    pub items: Vec<WorkItem>,
}

/// Outcome of delivering one job's items
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub groups: Vec<GroupOutcome>,
}

impl DeliveryReport {
    /// Every item with the state the coordinator was sent
    pub fn items(&self) -> Vec<WorkItem> {
        self.groups
            .iter()
            .flat_map(|g| g.items.iter().cloned())
            .collect()
    }

    pub fn failed_deliveries(&self) -> usize {
        self.groups
            .iter()
            .filter(|g| g.delivered == Some(false))
            .count()
    }
}

/// Splits items into delivery groups, in first-seen order
///
/// Items lacking a base url, method or path end up in a trailing group with
/// no key: they are not delivered but still reported to the coordinator.
pub fn group_by_destination(items: Vec<WorkItem>) -> Vec<DeliveryGroup> {
    let mut groups: Vec<DeliveryGroup> = Vec::new();
    let mut unroutable = Vec::new();

    for item in items {
        let Some(key) = item.destination.as_ref().and_then(Destination::route_key) else {
            debug!(
                "Item {} has no complete destination, skipping delivery",
                item.global_id
            );
            unroutable.push(item);
            continue;
        };

        match groups.iter_mut().find(|g| g.key.as_deref() == Some(key.as_str())) {
            Some(group) => group.items.push(item),
            None => groups.push(DeliveryGroup {
                key: Some(key),
                destination: item.destination.clone(),
                items: vec![item],
            }),
        }
    }

    if !unroutable.is_empty() {
        groups.push(DeliveryGroup {
            key: None,
            destination: None,
            items: unroutable,
        });
    }

    groups
}

/// Reason recorded on items whose destination delivery failed
///
/// JSON so the coordinator keeps the status and target of the failure.
pub fn delivery_failure_reason(destination: &Destination, error: &ClientError) -> String {
    let url = destination.endpoint().map(|e| e.url);
    json!({
        "message": error.to_string(),
        "status": error.status(),
        "url": url,
    })
    .to_string()
}

/// Fans reconciled items out to their destinations and the coordinator
#[derive(Clone)]
pub struct DestinationRouter {
    destinations: Arc<dyn DestinationRepository>,
    coordinator: Arc<dyn CoordinatorRepository>,
}

impl DestinationRouter {
    pub fn new(
        destinations: Arc<dyn DestinationRepository>,
        coordinator: Arc<dyn CoordinatorRepository>,
    ) -> Self {
        Self {
            destinations,
            coordinator,
        }
    }

    /// Delivers every group concurrently, each in its own task
    ///
    /// Delivery and update failures are recorded in the report, never
    /// returned. An error means a group task itself died.
    pub async fn deliver(&self, items: Vec<WorkItem>) -> Result<DeliveryReport, EngineError> {
        let groups = group_by_destination(items);
        debug!("Delivering {} group(s)", groups.len());

        let handles: Vec<_> = groups
            .into_iter()
            .map(|group| {
                let destinations = Arc::clone(&self.destinations);
                let coordinator = Arc::clone(&self.coordinator);
                tokio::spawn(deliver_group(destinations, coordinator, group))
            })
            .collect();

        let mut report = DeliveryReport::default();
        let mut failure = None;
        for joined in join_all(handles).await {
            match joined {
                Ok(outcome) => report.groups.push(outcome),
                Err(e) => failure = Some(e),
            }
        }

        match failure {
            Some(e) => Err(EngineError::DeliveryTask(e)),
            None => Ok(report),
        }
    }
}

async fn deliver_group(
    destinations: Arc<dyn DestinationRepository>,
    coordinator: Arc<dyn CoordinatorRepository>,
    group: DeliveryGroup,
) -> GroupOutcome {
    let DeliveryGroup {
        key,
        destination,
        mut items,
    } = group;

    let delivered = match &destination {
        Some(destination) => match destinations.deliver(destination, &items).await {
            Ok(()) => {
                info!(
                    "Delivered {} item(s) to {}",
                    items.len(),
                    key.as_deref().unwrap_or_default()
                );
                Some(true)
            }
            Err(e) => {
                warn!(
                    "Delivery to {} failed: {}",
                    key.as_deref().unwrap_or_default(),
                    e
                );
                let reason = delivery_failure_reason(destination, &e);
                for item in &mut items {
                    item.fail(reason.clone());
                }
                Some(false)
            }
        },
        None => None,
    };

    // The coordinator may be unreachable; the next poll would fail the same
    // way, so the update is attempted once and the error dropped.
    let reported = match coordinator.update_items(&items).await {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to report {} item(s) to coordinator: {}", items.len(), e);
            false
        }
    };

    GroupOutcome {
        key,
        delivered,
        reported,
        items,
    }
}
