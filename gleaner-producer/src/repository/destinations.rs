//! Destinations repository
//!
//! Delivers collected items to the callback each item names.

use async_trait::async_trait;
use gleaner_client::{DestinationClient, Result};
use gleaner_core::domain::item::{Destination, WorkItem};

/// Repository trait for destination callbacks
#[async_trait]
pub trait DestinationRepository: Send + Sync {
    /// Sends `items` to `destination`
    async fn deliver(&self, destination: &Destination, items: &[WorkItem]) -> Result<()>;
}

/// HTTP implementation of DestinationRepository
pub struct HttpDestinationRepository {
    client: DestinationClient,
}

impl HttpDestinationRepository {
    pub fn new(client: DestinationClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DestinationRepository for HttpDestinationRepository {
    async fn deliver(&self, destination: &Destination, items: &[WorkItem]) -> Result<()> {
        self.client.deliver(destination, items).await
    }
}
