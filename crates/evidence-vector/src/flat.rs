use async_trait::async_trait;

use evidence_core::error::{Error, Result};
use evidence_core::traits::DenseIndex;
use evidence_core::types::{Chunk, ChunkId, RawScore, ScoredResult};

/// Brute-force cosine index held in memory. Suitable for small corpora.
pub struct FlatDenseIndex {
	dim: usize,
	entries: Vec<(ChunkId, Vec<f32>)>,
}

impl FlatDenseIndex {
	/// Fails with `DimensionMismatch` on the first chunk whose embedding
	/// length differs from `dim`.
	pub fn new<'a>(dim: usize, chunks: impl IntoIterator<Item = &'a Chunk>) -> Result<Self> {
		let mut entries = Vec::new();
		for c in chunks {
			if c.embedding.len() != dim {
				return Err(Error::DimensionMismatch { expected: dim, actual: c.embedding.len() });
			}
			entries.push((c.id.clone(), c.embedding.clone()));
		}
		Ok(Self { dim, entries })
	}

	pub fn len(&self) -> usize { self.entries.len() }

	pub fn is_empty(&self) -> bool { self.entries.is_empty() }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
	let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
	if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

#[async_trait]
impl DenseIndex for FlatDenseIndex {
	fn dim(&self) -> usize { self.dim }

	async fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredResult>> {
		if query_vec.len() != self.dim {
			return Err(Error::DimensionMismatch { expected: self.dim, actual: query_vec.len() });
		}
		let mut scored: Vec<(&str, f32)> = self.entries.iter().map(|(id, v)| (id.as_str(), cosine(query_vec, v))).collect();
		scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
		scored.truncate(k);
		Ok(scored.into_iter().map(|(id, s)| ScoredResult::chunk(id, RawScore::Dense(s))).collect())
	}
}
