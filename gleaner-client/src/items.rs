//! Work item endpoints

use crate::error::Result;
use crate::{CoordinatorClient, GLOBAL_ID_HEADER, handle_empty_response, handle_response};
use gleaner_core::domain::item::WorkItem;
use tracing::debug;

impl CoordinatorClient {
    /// Fetch the batch of items waiting for this producer
    ///
    /// An empty list is the common answer when there is no pending work.
    /// A `null` body is treated the same way.
    pub async fn fetch_items(&self) -> Result<Vec<WorkItem>> {
        let url = format!("{}/apis/tasks", self.base_url);
        let request = self
            .client
            .get(&url)
            .header(GLOBAL_ID_HEADER, self.global_id.as_str());
        let response = self.authorize(request).send().await?;

        let items: Option<Vec<WorkItem>> = handle_response(response).await?;
        Ok(items.unwrap_or_default())
    }

    /// Report item outcomes back to the coordinator
    ///
    /// # Arguments
    /// * `items` - Items carrying their terminal state and failure reason
    pub async fn update_items(&self, items: &[WorkItem]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }

        debug!("Reporting {} item(s) to coordinator", items.len());

        let url = format!("{}/apis/tasks", self.base_url);
        let request = self.client.put(&url).json(items);
        let response = self.authorize(request).send().await?;

        handle_empty_response(response).await
    }
}
