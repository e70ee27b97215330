//! Change publication to the HTTP sink.
//!
//! Each change is sent as one JSON `PUT`. Delivery is a single best-effort
//! attempt: failures are logged and the change is dropped.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::entry::{AttributeMap, AttributeValue, ChangeEvent, ChangeKind};
use crate::error::PublishError;
use crate::traits::ChangeSink;

/// Sink used when the configuration does not name one.
pub const DEFAULT_SINK_URL: &str = "http://localhost:2069/private/ldap";

/// Nested payload value. Binary values must be turned into text with
/// [`stringify`] before the payload goes on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<PayloadValue>),
    Map(BTreeMap<String, PayloadValue>),
}

impl From<&AttributeValue> for PayloadValue {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Text(s) => PayloadValue::Text(s.clone()),
            AttributeValue::Binary(b) => PayloadValue::Bytes(b.clone()),
        }
    }
}

/// Convert every binary value to text, through nested maps and lists.
///
/// Bytes that are not valid UTF-8 are decoded lossily.
pub fn stringify(value: PayloadValue) -> PayloadValue {
    match value {
        PayloadValue::Bytes(bytes) => {
            PayloadValue::Text(String::from_utf8_lossy(&bytes).into_owned())
        }
        PayloadValue::List(items) => PayloadValue::List(items.into_iter().map(stringify).collect()),
        PayloadValue::Map(map) => {
            PayloadValue::Map(map.into_iter().map(|(k, v)| (k, stringify(v))).collect())
        }
        text @ PayloadValue::Text(_) => text,
    }
}

/// Attribute map as published. A side taken from a stored entry also carries
/// that entry's DN under `dn`; the empty side of an add or delete stays `{}`.
fn attributes_payload(dn: Option<&str>, attributes: &AttributeMap) -> PayloadValue {
    let mut map: BTreeMap<String, PayloadValue> = attributes
        .iter()
        .map(|(name, values)| {
            (
                name.clone(),
                PayloadValue::List(values.iter().map(PayloadValue::from).collect()),
            )
        })
        .collect();
    if let Some(dn) = dn {
        map.insert("dn".to_string(), PayloadValue::Text(dn.to_string()));
    }
    stringify(PayloadValue::Map(map))
}

/// JSON body sent to the sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangePayload {
    pub dn: String,
    pub change_type: ChangeKind,
    pub old_attributes: PayloadValue,
    pub new_attributes: PayloadValue,
}

impl ChangePayload {
    pub fn from_event(event: &ChangeEvent) -> Self {
        Self {
            dn: event.dn.clone(),
            change_type: event.kind,
            old_attributes: attributes_payload(event.old_dn.as_deref(), &event.old_attributes),
            new_attributes: attributes_payload(
                (event.kind != ChangeKind::Delete).then_some(event.dn.as_str()),
                &event.new_attributes,
            ),
        }
    }
}

/// Publishes changes to the configured sink URL.
#[derive(Clone)]
pub struct ChangePublisher {
    http_client: Client,
    sink_url: String,
}

impl ChangePublisher {
    /// Create a publisher with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns `PublishError::Client` if the HTTP client cannot be built.
    pub fn new(sink_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self, PublishError> {
        let mut builder = Client::builder()
            .user_agent(concat!("xavyo-syncrepl/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::none());
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder
            .build()
            .map_err(|e| PublishError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            sink_url: sink_url.into(),
        })
    }

    /// Get the sink URL.
    pub fn sink_url(&self) -> &str {
        &self.sink_url
    }

    /// Perform one delivery attempt, returning the response status.
    pub async fn deliver(&self, event: &ChangeEvent) -> Result<u16, PublishError> {
        let body = serde_json::to_vec(&ChangePayload::from_event(event))?;

        let response = self
            .http_client
            .put(&self.sink_url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if response.status().is_success() {
            Ok(status)
        } else {
            Err(PublishError::Rejected { status })
        }
    }
}

#[async_trait]
impl ChangeSink for ChangePublisher {
    async fn publish(&self, event: ChangeEvent) {
        tracing::info!(
            target: "ldap_sync",
            dn = %event.dn,
            change_type = %event.kind,
            "Publishing change-set"
        );

        let start = Instant::now();
        match self.deliver(&event).await {
            Ok(status) => {
                tracing::debug!(
                    target: "ldap_sync",
                    dn = %event.dn,
                    status,
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Change delivered"
                );
            }
            Err(e) => {
                tracing::warn!(
                    target: "ldap_sync",
                    dn = %event.dn,
                    change_type = %event.kind,
                    sink_url = %self.sink_url,
                    error = %e,
                    "Could not push payload, dropping change"
                );
            }
        }
    }
}
