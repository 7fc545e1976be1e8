//! Destination callback delivery

use crate::error::{ClientError, Result};
use crate::{SECURITY_KEY_HEADER, handle_empty_response};
use gleaner_core::domain::item::{Destination, WorkItem};
use reqwest::{Client, Method};
use tracing::debug;

/// HTTP client that delivers collected items to their destination callback
#[derive(Debug, Clone, Default)]
pub struct DestinationClient {
    client: Client,
}

impl DestinationClient {
    pub fn new() -> Self {
        Self::with_client(Client::new())
    }

    /// Create a destination client with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Send `items` to the callback described by `destination`
    ///
    /// The request uses the destination's method against `baseURL + path`,
    /// with the api key header when one is configured.
    ///
    /// # Errors
    /// `InvalidRequest` when the destination is incomplete or its method is
    /// not a valid HTTP method; otherwise the transport or status error.
    pub async fn deliver(&self, destination: &Destination, items: &[WorkItem]) -> Result<()> {
        let endpoint = destination.endpoint().ok_or_else(|| {
            ClientError::InvalidRequest(
                "destination requires baseURL, method and path".to_string(),
            )
        })?;

        let method = Method::from_bytes(endpoint.method.as_bytes()).map_err(|_| {
            ClientError::InvalidRequest(format!("invalid HTTP method '{}'", endpoint.method))
        })?;

        debug!(
            "Delivering {} item(s) to {} {}",
            items.len(),
            endpoint.method,
            endpoint.url
        );

        let mut request = self.client.request(method, &endpoint.url).json(items);
        if let Some(api_key) = destination.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.header(SECURITY_KEY_HEADER, api_key);
        }

        let response = request.send().await?;
        handle_empty_response(response).await
    }
}
