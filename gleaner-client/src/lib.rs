//! Gleaner HTTP Client
//!
//! Type-safe HTTP clients used by the producer:
//! - [`CoordinatorClient`] talks to the coordinator that hands out work items,
//!   stores their outcomes and serves the producer configuration
//! - [`DestinationClient`] delivers collected items to their callbacks
//!
//! # Example
//!
//! ```no_run
//! use gleaner_client::CoordinatorClient;
//!
//! #[tokio::main]
//! async fn main() -> gleaner_client::Result<()> {
//!     let client = CoordinatorClient::new("http://localhost:9099", "producer-global-id")
//!         .with_security_key("secret");
//!
//!     let items = client.fetch_items().await?;
//!     println!("{} item(s) waiting", items.len());
//!     Ok(())
//! }
//! ```

mod destinations;
pub mod error;
mod items;
mod producers;

pub use destinations::DestinationClient;
pub use error::{ClientError, Result};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Header carrying the coordinator security key (and destination api keys)
pub const SECURITY_KEY_HEADER: &str = "x-security-key";

/// Header identifying this producer process to the coordinator
pub const SERIAL_ID_HEADER: &str = "x-serial-id";

/// Header naming the producer a batch of items is requested for
pub const GLOBAL_ID_HEADER: &str = "x-producer-global-id";

/// HTTP client for the coordinator API
///
/// Endpoints are grouped by concern:
/// - Producer configuration (see `producers`)
/// - Work item fetch and status update (see `items`)
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    /// Base URL of the coordinator (e.g., "http://localhost:9099")
    base_url: String,
    /// Global id of the producer this client acts for
    global_id: String,
    security_key: Option<String>,
    serial_id: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the coordinator (e.g., "http://localhost:9099")
    /// * `global_id` - Global id of the producer registered on the coordinator
    ///
    /// # Example
    /// ```
    /// use gleaner_client::CoordinatorClient;
    ///
    /// let client = CoordinatorClient::new("http://localhost:9099/", "p-1");
    /// assert_eq!(client.base_url(), "http://localhost:9099");
    /// ```
    pub fn new(base_url: impl Into<String>, global_id: impl Into<String>) -> Self {
        Self::with_client(base_url, global_id, Client::new())
    }

    /// Create a new coordinator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(
        base_url: impl Into<String>,
        global_id: impl Into<String>,
        client: Client,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            global_id: global_id.into(),
            security_key: None,
            serial_id: None,
            client,
        }
    }

    /// Sets the security key sent with every request
    pub fn with_security_key(mut self, security_key: impl Into<String>) -> Self {
        self.security_key = Some(security_key.into());
        self
    }

    /// Sets the serial id identifying this producer process
    pub fn with_serial_id(mut self, serial_id: impl Into<String>) -> Self {
        self.serial_id = Some(serial_id.into());
        self
    }

    /// Get the base URL of the coordinator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the producer global id
    pub fn global_id(&self) -> &str {
        &self.global_id
    }

    /// Adds the identification headers shared by every coordinator call
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let mut request = request;
        if let Some(key) = self.security_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.header(SECURITY_KEY_HEADER, key);
        }
        if let Some(serial) = self.serial_id.as_deref().filter(|s| !s.is_empty()) {
            request = request.header(SERIAL_ID_HEADER, serial);
        }
        request
    }
}

// =============================================================================
// Response Handlers
// =============================================================================

/// Handle a response and deserialize its JSON body
///
/// Checks the status code and returns an appropriate error if the request
/// failed, or deserializes the body if successful.
pub(crate) async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;

    response
        .json()
        .await
        .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
}

/// Handle a response whose body is ignored
pub(crate) async fn handle_empty_response(response: reqwest::Response) -> Result<()> {
    check_status(response).await.map(|_| ())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();

    if !status.is_success() {
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(ClientError::api_error(status.as_u16(), error_text));
    }

    Ok(response)
}
