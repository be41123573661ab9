//! Pinecone REST client.
//!
//! Two halves, matching Pinecone's API split:
//!
//! - [`PineconeClient`] talks to the control plane (`controller_url`) to
//!   list, create and describe indexes. [`PineconeClient::ensure_index`]
//!   is the idempotent "create if absent, then connect" routine.
//! - [`PineconeIndex`] talks to one index's data plane host and implements
//!   [`VectorStore`](crate::vector_store::VectorStore).
//!
//! Every request carries the `Api-Key` and `X-Pinecone-API-Version`
//! headers. Nothing here retries: connectivity and auth failures surface
//! to the command as fatal errors.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};

use crate::config::PineconeConfig;
use crate::models::{Metadata, RetrievedChunk, VectorRecord};
use crate::vector_store::VectorStore;

/// Interval between readiness polls after creating an index.
const READY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Desired shape of an index.
#[derive(Debug, Clone)]
pub struct IndexSpec {
    pub name: String,
    pub dimension: usize,
    pub metric: String,
    pub cloud: String,
    pub region: String,
}

/// Index description returned by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexDescription {
    pub name: String,
    pub dimension: usize,
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub status: IndexStatus,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IndexStatus {
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize)]
struct IndexList {
    #[serde(default)]
    indexes: Vec<IndexDescription>,
}

/// Outcome of [`PineconeClient::ensure_index`].
#[derive(Debug)]
pub struct EnsuredIndex {
    pub index: PineconeIndex,
    pub description: IndexDescription,
    /// `true` when this call issued the create request.
    pub created: bool,
}

#[derive(Clone)]
pub struct PineconeClient {
    http: reqwest::Client,
    controller_url: String,
    api_key: String,
    api_version: String,
    namespace: String,
    upsert_batch_size: usize,
    ready_timeout: Duration,
}

impl std::fmt::Debug for PineconeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PineconeClient")
            .field("controller_url", &self.controller_url)
            .field("api_version", &self.api_version)
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl PineconeClient {
    pub fn from_config(config: &PineconeConfig) -> Result<Self> {
        let api_key = config.require_api_key()?.to_string();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            controller_url: config.controller_url.trim_end_matches('/').to_string(),
            api_key,
            api_version: config.api_version.clone(),
            namespace: config.namespace.clone(),
            upsert_batch_size: config.upsert_batch_size,
            ready_timeout: Duration::from_secs(config.ready_timeout_secs),
        })
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("Api-Key", &self.api_key)
            .header("X-Pinecone-API-Version", &self.api_version)
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexDescription>> {
        let url = format!("{}/indexes", self.controller_url);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: GET {}", url))?;
        let list: IndexList = read_json(resp, "list indexes").await?;
        Ok(list.indexes)
    }

    pub async fn describe_index(&self, name: &str) -> Result<IndexDescription> {
        let url = format!("{}/indexes/{}", self.controller_url, name);
        let resp = self
            .request(reqwest::Method::GET, &url)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: GET {}", url))?;
        read_json(resp, "describe index").await
    }

    /// Issue a create request. Returns `false` if the index already existed
    /// (HTTP 409), which happens when another process won the race.
    pub async fn create_index(&self, spec: &IndexSpec) -> Result<bool> {
        let url = format!("{}/indexes", self.controller_url);
        let body = json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": spec.metric,
            "spec": {
                "serverless": {
                    "cloud": spec.cloud,
                    "region": spec.region,
                }
            }
        });
        let resp = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: POST {}", url))?;

        let status = resp.status();
        if status.as_u16() == 409 {
            return Ok(false);
        }
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("Pinecone create index error {}: {}", status, text);
        }
        Ok(true)
    }

    /// Poll until the index reports ready or `ready_timeout` passes.
    pub async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let started = Instant::now();
        loop {
            let desc = self.describe_index(name).await?;
            if desc.status.ready && !desc.host.is_empty() {
                return Ok(desc);
            }
            if started.elapsed() >= self.ready_timeout {
                bail!(
                    "Index '{}' not ready after {}s (state: {})",
                    name,
                    self.ready_timeout.as_secs(),
                    desc.status.state
                );
            }
            tracing::debug!(index = name, state = %desc.status.state, "waiting for index");
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Connect to the named index, creating it first if it does not exist.
    ///
    /// Safe to call repeatedly: when the index is listed no create request
    /// is sent. An existing index with a different dimension is an error.
    pub async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsuredIndex> {
        let existing = self
            .list_indexes()
            .await?
            .into_iter()
            .find(|idx| idx.name == spec.name);

        let (description, created) = match existing {
            Some(desc) if desc.status.ready && !desc.host.is_empty() => (desc, false),
            Some(_) => (self.wait_until_ready(&spec.name).await?, false),
            None => {
                let created = self.create_index(spec).await?;
                if created {
                    tracing::info!(
                        index = %spec.name,
                        dimension = spec.dimension,
                        metric = %spec.metric,
                        region = %spec.region,
                        "created index"
                    );
                }
                (self.wait_until_ready(&spec.name).await?, created)
            }
        };

        if description.dimension != spec.dimension {
            bail!(
                "Index '{}' has dimension {}, but the embedding model produces {}",
                spec.name,
                description.dimension,
                spec.dimension
            );
        }

        let index = self.index(&description.host);
        Ok(EnsuredIndex {
            index,
            description,
            created,
        })
    }

    /// Data-plane handle for an index host.
    pub fn index(&self, host: &str) -> PineconeIndex {
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        PineconeIndex {
            client: self.clone(),
            base_url,
        }
    }
}

/// Data-plane handle for one index.
#[derive(Debug)]
pub struct PineconeIndex {
    client: PineconeClient,
    base_url: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertRequest<'a> {
    vectors: &'a [VectorRecord],
    namespace: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

impl PineconeIndex {
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn upsert_batch(&self, batch: &[VectorRecord]) -> Result<usize> {
        let url = format!("{}/vectors/upsert", self.base_url);
        let body = UpsertRequest {
            vectors: batch,
            namespace: &self.client.namespace,
        };
        let resp = self
            .client
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: POST {}", url))?;
        let parsed: UpsertResponse = read_json(resp, "upsert").await?;
        Ok(parsed.upserted_count)
    }
}

#[async_trait]
impl VectorStore for PineconeIndex {
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize> {
        let mut total = 0;
        for batch in records.chunks(self.client.upsert_batch_size) {
            total += self.upsert_batch(batch).await?;
        }
        Ok(total)
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let url = format!("{}/query", self.base_url);
        let body = json!({
            "vector": vector,
            "topK": top_k,
            "includeMetadata": true,
            "includeValues": false,
            "namespace": self.client.namespace,
        });
        let resp = self
            .client
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Pinecone request failed: POST {}", url))?;
        let json: serde_json::Value = read_json(resp, "query").await?;
        parse_query_response(&json)
    }
}

/// Convert a query response's `matches` into [`RetrievedChunk`]s.
///
/// The chunk text lives in the `text` metadata field written at ingest.
pub fn parse_query_response(json: &serde_json::Value) -> Result<Vec<RetrievedChunk>> {
    let matches = match json.get("matches") {
        Some(serde_json::Value::Array(m)) => m,
        Some(serde_json::Value::Null) | None => return Ok(Vec::new()),
        Some(_) => bail!("Invalid query response: matches is not an array"),
    };

    let mut out = Vec::with_capacity(matches.len());
    for m in matches {
        let id = m
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid query response: match without id"))?
            .to_string();
        let score = m.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0) as f32;
        let metadata: Metadata = m
            .get("metadata")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();
        let text = metadata
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let source = metadata
            .get("source")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        out.push(RetrievedChunk {
            id,
            score,
            text,
            source,
            metadata,
        });
    }
    Ok(out)
}

async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response, what: &str) -> Result<T> {
    let status = resp.status();
    if !status.is_success() {
        let text = resp.text().await.unwrap_or_default();
        bail!("Pinecone {} error {}: {}", what, status, text);
    }
    resp.json::<T>()
        .await
        .with_context(|| format!("Invalid Pinecone {} response", what))
}
