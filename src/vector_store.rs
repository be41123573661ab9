//! Vector store boundary and the shared index-opening helper.
//!
//! Both ingestion and chat go through [`open_index`], so the "create if
//! absent" rule lives in one place.

use anyhow::Result;
use async_trait::async_trait;

use crate::config::Config;
use crate::models::{RetrievedChunk, VectorRecord};
use crate::pinecone::{EnsuredIndex, IndexSpec, PineconeClient};

/// Write and similarity-query access to a remote vector index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert or overwrite records. Returns the number the store accepted.
    async fn upsert(&self, records: &[VectorRecord]) -> Result<usize>;

    /// Return up to `top_k` records most similar to `vector`, best first.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// Index spec derived from configuration and the embedder's dimension.
pub fn index_spec(config: &Config, dims: usize) -> Result<IndexSpec> {
    Ok(IndexSpec {
        name: config.pinecone.require_index()?.to_string(),
        dimension: dims,
        metric: config.pinecone.metric.clone(),
        cloud: config.pinecone.cloud.clone(),
        region: config.pinecone.region.clone(),
    })
}

/// Connect to the configured index, creating it on first use.
pub async fn open_index(config: &Config, dims: usize) -> Result<EnsuredIndex> {
    let spec = index_spec(config, dims)?;
    let client = PineconeClient::from_config(&config.pinecone)?;
    let ensured = client.ensure_index(&spec).await?;
    tracing::info!(
        index = %spec.name,
        host = %ensured.description.host,
        created = ensured.created,
        "connected to index"
    );
    Ok(ensured)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_follows_config() {
        let mut config = Config::default();
        config.pinecone.index = Some("handbook".to_string());
        config.pinecone.region = "eu-west-1".to_string();
        let spec = index_spec(&config, 3072).unwrap();
        assert_eq!(spec.name, "handbook");
        assert_eq!(spec.dimension, 3072);
        assert_eq!(spec.metric, "cosine");
        assert_eq!(spec.cloud, "aws");
        assert_eq!(spec.region, "eu-west-1");
    }

    #[test]
    fn spec_requires_index_name() {
        assert!(index_spec(&Config::default(), 3072).is_err());
    }
}
