//! Read-only client for the plugin host's event catalog.
//!
//! Used by design-time tooling to list event sources and event types. It is
//! independent of workflow execution: nothing in the executor waits on it.
//! Every read says whether its data is live or degraded.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    #[serde(alias = "type")]
    pub id: String,
    #[serde(alias = "name")]
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "source_id")]
    pub source_id: String,
    #[serde(default, alias = "source_name")]
    pub source_name: String,
}

/// Data read from the catalog, tagged with its freshness.
#[derive(Debug, Clone, PartialEq)]
pub enum Catalog<T> {
    /// Fetched from the host, or cached within the TTL
    Fresh(T),
    /// The host could not be read; `data` is the last good copy or the
    /// built-in fallback
    Stale { data: T, reason: String },
}

impl<T> Catalog<T> {
    pub fn data(&self) -> &T {
        match self {
            Catalog::Fresh(data) | Catalog::Stale { data, .. } => data,
        }
    }

    pub fn into_data(self) -> T {
        match self {
            Catalog::Fresh(data) | Catalog::Stale { data, .. } => data,
        }
    }

    pub fn is_fresh(&self) -> bool {
        matches!(self, Catalog::Fresh(_))
    }

    pub fn stale_reason(&self) -> Option<&str> {
        match self {
            Catalog::Fresh(_) => None,
            Catalog::Stale { reason, .. } => Some(reason),
        }
    }
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

struct CacheEntry {
    value: serde_json::Value,
    fetched_at: Instant,
}

pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
    ttl: Duration,
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl CatalogClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, ttl: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// All event sources
    pub async fn sources(&self) -> Catalog<Vec<EventSource>> {
        self.read("/api/events/sources", &["sources", "event_sources"], fallback_sources)
            .await
    }

    /// All event types across sources
    pub async fn event_types(&self) -> Catalog<Vec<EventType>> {
        self.read("/api/events/types", &["event_types", "types"], fallback_event_types)
            .await
    }

    /// Event types of one source
    pub async fn event_types_for(&self, source_id: &str) -> Catalog<Vec<EventType>> {
        let path = format!("/api/events/sources/{}/types", source_id);
        self.read(&path, &["event_types", "types"], || {
            fallback_event_types()
                .into_iter()
                .filter(|t| t.source_id == source_id)
                .collect()
        })
        .await
    }

    /// Detail of one source; `None` when neither the host nor the fallback
    /// knows it
    pub async fn source(&self, source_id: &str) -> Catalog<Option<EventSource>> {
        let path = format!("/api/events/sources/{}", source_id);
        self.read(&path, &["source"], || {
            fallback_sources().into_iter().find(|s| s.id == source_id)
        })
        .await
    }

    /// Drop every cached response so the next reads go to the host
    pub async fn invalidate(&self) {
        self.cache.lock().await.clear();
    }

    async fn read<T, F>(&self, path: &str, keys: &[&str], fallback: F) -> Catalog<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> T,
    {
        let cached = {
            let cache = self.cache.lock().await;
            cache
                .get(path)
                .map(|entry| (entry.value.clone(), entry.fetched_at.elapsed() < self.ttl))
        };

        if let Some((value, true)) = &cached {
            if let Ok(data) = decode(value, keys) {
                return Catalog::Fresh(data);
            }
        }

        let reason = match self.fetch(path).await {
            Ok(value) => match decode::<T>(&value, keys) {
                Ok(data) => {
                    self.cache.lock().await.insert(
                        path.to_string(),
                        CacheEntry {
                            value,
                            fetched_at: Instant::now(),
                        },
                    );
                    return Catalog::Fresh(data);
                }
                Err(message) => CatalogError::Decode {
                    url: self.url(path),
                    message,
                },
            },
            Err(e) => e,
        };

        tracing::warn!("Catalog read of {} degraded: {}", path, reason);

        let data = cached
            .and_then(|(value, _)| decode(&value, keys).ok())
            .unwrap_or_else(fallback);
        Catalog::Stale {
            data,
            reason: reason.to_string(),
        }
    }

    async fn fetch(&self, path: &str) -> Result<serde_json::Value, CatalogError> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| CatalogError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(CatalogError::Status {
                url,
                status: response.status().as_u16(),
            });
        }

        response.json().await.map_err(|e| CatalogError::Decode {
            url,
            message: e.to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Accept either the bare value or an object wrapping it under one of `keys`
fn decode<T: DeserializeOwned>(value: &serde_json::Value, keys: &[&str]) -> Result<T, String> {
    if let Ok(data) = serde_json::from_value(value.clone()) {
        return Ok(data);
    }
    keys.iter()
        .find_map(|key| value.get(*key))
        .ok_or_else(|| format!("expected one of the fields [{}]", keys.join(", ")))
        .and_then(|inner| serde_json::from_value(inner.clone()).map_err(|e| e.to_string()))
}

fn fallback_sources() -> Vec<EventSource> {
    vec![
        EventSource {
            id: "pdf-monitor-event-source".to_string(),
            name: "PDF Monitor".to_string(),
            description: "Watches folders for added, updated and deleted PDF documents"
                .to_string(),
        },
        EventSource {
            id: "search-api-source".to_string(),
            name: "Search API".to_string(),
            description: "Queries submitted against indexed documents".to_string(),
        },
    ]
}

fn fallback_event_types() -> Vec<EventType> {
    let pdf = |id: &str, label: &str, description: &str| EventType {
        id: id.to_string(),
        label: label.to_string(),
        description: description.to_string(),
        source_id: "pdf-monitor-event-source".to_string(),
        source_name: "PDF Monitor".to_string(),
    };

    vec![
        pdf("pdf_file_added", "PDF added", "A new PDF appeared in a watched folder"),
        pdf("pdf_file_updated", "PDF updated", "A watched PDF changed on disk"),
        pdf("pdf_file_deleted", "PDF deleted", "A watched PDF was removed"),
        EventType {
            id: "pdf_search_query".to_string(),
            label: "Search query".to_string(),
            description: "A search request over indexed PDFs".to_string(),
            source_id: "search-api-source".to_string(),
            source_name: "Search API".to_string(),
        },
    ]
}
