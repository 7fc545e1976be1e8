//! Producer configuration endpoint

use crate::error::Result;
use crate::{CoordinatorClient, handle_response};
use gleaner_core::domain::configuration::RemoteConfiguration;

impl CoordinatorClient {
    /// Fetch this producer's configuration from the coordinator
    ///
    /// # Arguments
    /// * `producer_type` - The type this producer declares; the coordinator
    ///   rejects the request when it does not match the registered one
    ///
    /// # Returns
    /// The configuration currently stored for the producer's global id
    pub async fn fetch_configuration(&self, producer_type: &str) -> Result<RemoteConfiguration> {
        let url = format!("{}/apis/producers/{}", self.base_url, self.global_id);
        let request = self.client.get(&url).query(&[("type", producer_type)]);
        let response = self.authorize(request).send().await?;

        handle_response(response).await
    }
}
