//! In-memory chunk store and document catalog, used when the corpus is
//! small enough to hold in RAM and by tests.
use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::traits::{ChunkStore, DocumentCatalog};
use crate::types::{Chunk, ChunkId, Document, DocumentId};

#[derive(Debug, Clone, Default)]
pub struct MemoryChunkStore {
    chunks: HashMap<ChunkId, Chunk>,
}

impl MemoryChunkStore {
    pub fn new(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        Self { chunks: chunks.into_iter().map(|c| (c.id.clone(), c)).collect() }
    }

    pub fn insert(&mut self, chunk: Chunk) {
        self.chunks.insert(chunk.id.clone(), chunk);
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn get_many(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.chunks.get(id).map(|c| (id.clone(), c.clone())))
            .collect())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    documents: HashMap<DocumentId, Document>,
}

impl MemoryCatalog {
    pub fn new(documents: impl IntoIterator<Item = Document>) -> Self {
        Self { documents: documents.into_iter().map(|d| (d.id.clone(), d)).collect() }
    }
}

#[async_trait]
impl DocumentCatalog for MemoryCatalog {
    async fn documents(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, Document>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.documents.get(id).map(|d| (id.clone(), d.clone())))
            .collect())
    }
}
