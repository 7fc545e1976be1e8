//! Work item domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::url::join_url;

/// One unit of collectible work handed out by the coordinator
///
/// Fields the producer does not interpret are kept in `extra` so the item
/// can be reported back to the coordinator without losing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    /// Identifier assigned by the coordinator, stable for the item's lifetime
    #[serde(default)]
    pub global_id: String,

    #[serde(default)]
    pub state: ItemState,

    /// Set only when the item ended `FAILED` or `TIMEOUT`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failures_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,

    /// Callback that receives the item once it is collected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,

    /// Worker input (for the HTTP worker: the url to fetch)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    /// Data produced by the worker on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<Value>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl WorkItem {
    /// Creates a pending item with the given id and nothing else
    pub fn new(global_id: impl Into<String>) -> Self {
        Self {
            global_id: global_id.into(),
            state: ItemState::Pending,
            failures_reason: None,
            ended_at: None,
            destination: None,
            payload: None,
            dataset: None,
            extra: Map::new(),
        }
    }

    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Whether the item carries an id the coordinator can match
    pub fn has_identity(&self) -> bool {
        !self.global_id.trim().is_empty()
    }

    /// Whether the worker left a non-empty dataset on the item
    pub fn has_result(&self) -> bool {
        match &self.dataset {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
            Some(_) => true,
        }
    }

    /// Moves the item into `state`
    ///
    /// Stamps `ended_at` if the worker did not, and records `reason` as the
    /// failure reason when one is given.
    pub fn mark(&mut self, state: ItemState, reason: Option<String>) {
        self.state = state;
        if self.ended_at.is_none() {
            self.ended_at = Some(Utc::now());
        }
        if let Some(reason) = reason {
            self.failures_reason = Some(reason);
        }
    }

    pub fn finish(&mut self) {
        self.mark(ItemState::Finished, None);
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.mark(ItemState::Failed, Some(reason.into()));
    }

    pub fn time_out(&mut self, reason: impl Into<String>) {
        self.mark(ItemState::Timeout, Some(reason.into()));
    }
}

/// Lifecycle state of a work item
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemState {
    #[default]
    Pending,
    Finished,
    Failed,
    Timeout,
}

impl ItemState {
    /// Terminal states are the only ones allowed to leave a job
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ItemState::Pending)
    }
}

impl std::fmt::Display for ItemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemState::Pending => write!(f, "PENDING"),
            ItemState::Finished => write!(f, "FINISHED"),
            ItemState::Failed => write!(f, "FAILED"),
            ItemState::Timeout => write!(f, "TIMEOUT"),
        }
    }
}

/// Callback descriptor identifying where a completed item is reported
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(default, rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Sent as a header on delivery when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Destination {
    pub fn new(
        base_url: impl Into<String>,
        method: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            base_url: Some(base_url.into()),
            method: Some(method.into()),
            path: Some(path.into()),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Resolves the HTTP method and absolute url of the callback
    ///
    /// Returns `None` when any of base url, method or path is missing or blank.
    pub fn endpoint(&self) -> Option<Endpoint> {
        let base_url = non_blank(self.base_url.as_deref())?;
        let method = non_blank(self.method.as_deref())?;
        let path = non_blank(self.path.as_deref())?;

        Some(Endpoint {
            method: method.to_ascii_uppercase(),
            url: join_url(base_url, path),
        })
    }

    /// Grouping key: lowercased method and lowercased absolute url
    pub fn route_key(&self) -> Option<String> {
        self.endpoint().map(|endpoint| {
            format!(
                "{}:{}",
                endpoint.method.to_lowercase(),
                endpoint.url.to_lowercase()
            )
        })
    }
}

/// A resolved destination callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Upper-cased HTTP method
    pub method: String,
    pub url: String,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
