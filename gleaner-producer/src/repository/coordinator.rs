//! Coordinator repository
//!
//! Handles communication with the coordinator:
//! - Fetching the producer configuration
//! - Fetching pending work items
//! - Reporting item outcomes

use async_trait::async_trait;
use gleaner_client::{CoordinatorClient, Result};
use gleaner_core::domain::configuration::RemoteConfiguration;
use gleaner_core::domain::item::WorkItem;

/// Repository trait for coordinator operations
#[async_trait]
pub trait CoordinatorRepository: Send + Sync {
    /// Fetches the configuration the coordinator stores for this producer
    async fn fetch_configuration(&self) -> Result<RemoteConfiguration>;

    /// Fetches the batch of items waiting to be collected
    ///
    /// An empty batch is a valid, common answer.
    async fn fetch_items(&self) -> Result<Vec<WorkItem>>;

    /// Reports item outcomes back to the coordinator
    ///
    /// # Arguments
    /// * `items` - Items carrying their terminal state
    async fn update_items(&self, items: &[WorkItem]) -> Result<()>;
}

/// HTTP implementation of CoordinatorRepository
pub struct HttpCoordinatorRepository {
    client: CoordinatorClient,
    producer_type: String,
}

impl HttpCoordinatorRepository {
    /// Creates a new HTTP coordinator repository
    ///
    /// # Arguments
    /// * `client` - Coordinator client already carrying the producer credentials
    /// * `producer_type` - Type this producer declares when fetching its configuration
    pub fn new(client: CoordinatorClient, producer_type: String) -> Self {
        Self {
            client,
            producer_type,
        }
    }
}

#[async_trait]
impl CoordinatorRepository for HttpCoordinatorRepository {
    async fn fetch_configuration(&self) -> Result<RemoteConfiguration> {
        self.client.fetch_configuration(&self.producer_type).await
    }

    async fn fetch_items(&self) -> Result<Vec<WorkItem>> {
        self.client.fetch_items().await
    }

    async fn update_items(&self, items: &[WorkItem]) -> Result<()> {
        self.client.update_items(items).await
    }
}
