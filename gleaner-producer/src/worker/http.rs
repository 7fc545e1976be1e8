//! HTTP worker
//!
//! Fetches the page each item points at and stores the response as the
//! item's dataset.

use async_trait::async_trait;
use futures::FutureExt;
use gleaner_core::domain::item::WorkItem;
use reqwest::{Client, Method};
use serde_json::{Value, json};
use tracing::debug;

use super::{ItemFailure, ItemFuture, Worker, WorkerContext};

/// Default worker: one HTTP request per item
///
/// The item payload must carry a `url`; an optional `method` (default GET)
/// and `body` are honoured.
#[derive(Debug, Clone, Default)]
pub struct HttpWorker {
    client: Client,
}

impl HttpWorker {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Worker for HttpWorker {
    async fn run(&self, context: WorkerContext) -> Vec<ItemFuture> {
        debug!(
            job_id = %context.job_id,
            "HTTP worker received {} item(s)",
            context.items.len()
        );

        context
            .items
            .into_iter()
            .map(|item| fetch(self.client.clone(), item).boxed())
            .collect()
    }
}

/// Request described by an item payload
#[derive(Debug, PartialEq)]
struct PageRequest {
    method: Method,
    url: String,
    body: Option<Value>,
}

impl PageRequest {
    fn from_payload(payload: Option<&Value>) -> Result<Self, String> {
        let payload = payload.ok_or_else(|| "item has no payload".to_string())?;

        let url = payload
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| "payload has no url".to_string())?;

        let method = match payload.get("method").and_then(Value::as_str) {
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| format!("invalid HTTP method '{}'", m))?,
            None => Method::GET,
        };

        Ok(Self {
            method,
            url: url.trim().to_string(),
            body: payload.get("body").cloned(),
        })
    }
}

async fn fetch(client: Client, mut item: WorkItem) -> Result<WorkItem, ItemFailure> {
    let request = match PageRequest::from_payload(item.payload.as_ref()) {
        Ok(request) => request,
        Err(reason) => return Err(ItemFailure::new(item, reason)),
    };

    let mut builder = client.request(request.method, &request.url);
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = match builder.send().await {
        Ok(response) => response,
        Err(e) => return Err(ItemFailure::new(item, e.to_string())),
    };

    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return Err(ItemFailure::new(item, e.to_string())),
    };

    if !status.is_success() {
        return Err(ItemFailure::new(
            item,
            format!("{} returned {}", request.url, status.as_u16()),
        ));
    }

    item.dataset = Some(json!({
        "status": status.as_u16(),
        "contentType": content_type,
        "body": body,
    }));

    Ok(item)
}
