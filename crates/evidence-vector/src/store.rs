use std::collections::HashMap;

use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::Table;

use evidence_core::error::{Error, Result};
use evidence_core::traits::ChunkStore;
use evidence_core::types::{Chunk, ChunkId};

use crate::schema::batch_to_chunks;
use crate::table::open_table;

/// Chunk hydration from the LanceDB table the dense index searches.
pub struct LanceChunkStore {
	table: Table,
}

impl LanceChunkStore {
	pub async fn open(uri: &str, table_name: &str) -> anyhow::Result<Self> {
		Ok(Self { table: open_table(uri, table_name).await? })
	}

	pub fn from_table(table: Table) -> Self {
		Self { table }
	}

	async fn fetch(&self, ids: &[ChunkId]) -> anyhow::Result<Vec<Chunk>> {
		let mut stream = self.table.query().only_if(id_filter(ids)).limit(ids.len()).execute().await?;
		let mut chunks = Vec::with_capacity(ids.len());
		while let Some(batch) = stream.try_next().await? {
			chunks.extend(batch_to_chunks(&batch)?);
		}
		Ok(chunks)
	}
}

fn id_filter(ids: &[ChunkId]) -> String {
	let quoted: Vec<String> = ids.iter().map(|id| format!("'{}'", id.replace('\'', "''"))).collect();
	format!("id IN ({})", quoted.join(", "))
}

#[async_trait]
impl ChunkStore for LanceChunkStore {
	async fn get_many(&self, ids: &[ChunkId]) -> Result<HashMap<ChunkId, Chunk>> {
		if ids.is_empty() { return Ok(HashMap::new()); }
		let chunks = self.fetch(ids).await.map_err(|e| Error::Operation(format!("chunk lookup failed: {e}")))?;
		Ok(chunks.into_iter().map(|c| (c.id.clone(), c)).collect())
	}
}
