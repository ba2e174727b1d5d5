use anyhow::anyhow;
use arrow_array::cast::AsArray;
use arrow_array::types::Float32Type;
use arrow_array::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};
use tracing::debug;

use evidence_core::error::{Error, Result};
use evidence_core::traits::DenseIndex;
use evidence_core::types::{RawScore, ScoredResult, SourceKind};

use crate::table::{open_table, vector_dim};

/// Cosine nearest-neighbour search over a prebuilt LanceDB chunk table.
pub struct LanceDenseIndex {
	table: Table,
	dim: usize,
}

impl LanceDenseIndex {
	pub async fn open(uri: &str, table_name: &str) -> anyhow::Result<Self> {
		let table = open_table(uri, table_name).await?;
		Self::from_table(table).await
	}

	pub async fn from_table(table: Table) -> anyhow::Result<Self> {
		let dim = vector_dim(&table).await?;
		Ok(Self { table, dim })
	}

	async fn query(&self, query_vec: &[f32], k: usize) -> anyhow::Result<Vec<(String, f32)>> {
		let mut stream = self
			.table
			.vector_search(query_vec.to_vec())?
			.distance_type(DistanceType::Cosine)
			.limit(k)
			.execute()
			.await?;
		let mut hits = Vec::new();
		while let Some(batch) = stream.try_next().await? {
			collect_hits(&batch, &mut hits)?;
		}
		Ok(hits)
	}
}

fn collect_hits(batch: &RecordBatch, hits: &mut Vec<(String, f32)>) -> anyhow::Result<()> {
	let ids = batch
		.column_by_name("id")
		.and_then(|c| c.as_string_opt::<i32>())
		.ok_or_else(|| anyhow!("search result has no id column"))?;
	let distances = batch
		.column_by_name("_distance")
		.and_then(|c| c.as_primitive_opt::<Float32Type>())
		.ok_or_else(|| anyhow!("search result has no _distance column"))?;
	for i in 0..batch.num_rows() {
		hits.push((ids.value(i).to_string(), 1.0 - distances.value(i)));
	}
	Ok(())
}

#[async_trait]
impl DenseIndex for LanceDenseIndex {
	fn dim(&self) -> usize { self.dim }

	async fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredResult>> {
		if query_vec.len() != self.dim {
			return Err(Error::DimensionMismatch { expected: self.dim, actual: query_vec.len() });
		}
		if k == 0 { return Ok(Vec::new()); }
		let mut hits = self.query(query_vec, k).await.map_err(|e| Error::unavailable(SourceKind::Dense, e))?;
		hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		hits.truncate(k);
		debug!(count = hits.len(), k, "dense search");
		Ok(hits.into_iter().map(|(id, s)| ScoredResult::chunk(id, RawScore::Dense(s))).collect())
	}
}
