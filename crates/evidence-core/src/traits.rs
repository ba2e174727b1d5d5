use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkId, Document, DocumentId, Intent, ScoredResult};

/// Turns text into fixed-length vectors for the dense index.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;

    /// Embeds a search query. Models that distinguish query and passage
    /// inputs override this to add their query prefix.
    fn embed_query(&self, query: &str) -> anyhow::Result<Vec<f32>> {
        self.embed_batch(&[query.to_string()])?
            .pop()
            .ok_or_else(|| anyhow::anyhow!("embedder returned no vector for query"))
    }
}

/// Nearest-neighbour index over chunk embeddings.
#[async_trait]
pub trait DenseIndex: Send + Sync {
    /// Dimension fixed at index-build time.
    fn dim(&self) -> usize;

    /// Top-`k` chunk ids by descending similarity. Fails with
    /// `DimensionMismatch` when `query_vec` does not match [`DenseIndex::dim`]
    /// and with `SourceUnavailable` when the index cannot be queried.
    async fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredResult>>;
}

/// Term-frequency ranked index over chunk text.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Splits a query into the terms this index was built with.
    fn tokenize(&self, query: &str) -> Vec<String>;

    /// Top-`k` chunk ids by descending relevance, ties by id ascending.
    async fn search_terms(&self, terms: &[String], k: usize) -> Result<Vec<ScoredResult>>;
}

/// Exact relational filtering over study/arm/outcome/safety records.
#[async_trait]
pub trait StructuredSource: Send + Sync {
    /// Returns an empty list when no intent is recognized. A `hint` takes
    /// precedence over recognition from `query`.
    async fn search_structured(&self, query: &str, hint: Option<&Intent>, k: usize) -> Result<Vec<ScoredResult>>;
}

/// Canonical chunk storage. Read-only from the engine's perspective.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// One round-trip for the whole id set; absent ids are simply missing
    /// from the returned map.
    async fn get_many(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>>;

    async fn get(&self, id: &str) -> Result<Chunk> {
        let mut found = self.get_many(&[id.to_string()]).await?;
        found.remove(id).ok_or_else(|| Error::NotFound(format!("chunk {id}")))
    }
}

/// Bibliographic metadata for documents.
#[async_trait]
pub trait DocumentCatalog: Send + Sync {
    async fn documents(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, Document>>;
}
