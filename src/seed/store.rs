//! Record stores the seed loader writes into.

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use crate::error::{DevhostError, Result};

/// Idempotent keyed writes: upserting the same id twice leaves one record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Store name for logs.
    fn name(&self) -> &str;

    /// Insert or replace the record stored under `id`.
    async fn upsert(&self, id: &str, record: &Value) -> Result<()>;
}

/// Writes each record with `PUT {endpoint}/{collection}/{id}`.
#[derive(Debug, Clone)]
pub struct HttpRecordStore {
    client: reqwest::Client,
    base: Url,
    collection: String,
}

impl HttpRecordStore {
    pub fn new(endpoint: &str, collection: impl Into<String>) -> Result<Self> {
        let base = Url::parse(endpoint)
            .map_err(|e| DevhostError::Seed(format!("Invalid endpoint '{}': {}", endpoint, e)))?;
        if base.cannot_be_a_base() {
            return Err(DevhostError::Seed(format!(
                "Endpoint '{}' cannot be used as a base URL",
                endpoint
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base,
            collection: collection.into(),
        })
    }

    /// URL for one record. The id is percent-encoded as a path segment.
    pub fn record_url(&self, id: &str) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(&self.collection).push(id);
        }
        url
    }
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn upsert(&self, id: &str, record: &Value) -> Result<()> {
        let url = self.record_url(id);
        debug!(%url, "PUT record");
        let response = self.client.put(url).json(record).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(DevhostError::Seed(format!(
                "Store rejected '{}' with {}: {}",
                id, status, body
            )))
        }
    }
}

/// In-memory store for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<BTreeMap<String, Value>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<Value> {
        self.lock().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Value>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, id: &str, record: &Value) -> Result<()> {
        self.lock().insert(id.to_string(), record.clone());
        Ok(())
    }
}
