//! Opens the prebuilt on-disk indexes named in the configuration.
use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use evidence_core::config::{Config, EngineSettings};
use evidence_core::error::Error;
use evidence_core::traits::DenseIndex;
use evidence_embed::get_default_embedder;
use evidence_structured::SqliteStore;
use evidence_text::TantivyLexicalIndex;
use evidence_vector::{LanceChunkStore, LanceDenseIndex};

use crate::engine::IndexSet;

impl IndexSet {
    /// Tantivy for lexical search, one LanceDB table for dense search and
    /// chunk hydration, SQLite for structured records and the document
    /// catalog. Relative paths resolve against the config directory.
    pub async fn open(settings: &EngineSettings, config: &Config) -> anyhow::Result<Self> {
        let data = &settings.data;

        let mut embedding = settings.embedding.clone();
        embedding.model_dir = embedding
            .model_dir
            .as_deref()
            .map(|d| config.resolve_path(d).to_string_lossy().into_owned());
        let embedder = get_default_embedder(&embedding)?;

        let tantivy_dir = config.resolve_path(&data.tantivy_index_dir);
        let lexical = TantivyLexicalIndex::open(&tantivy_dir)
            .with_context(|| format!("opening tantivy index at {}", tantivy_dir.display()))?;

        let lance_uri = config.resolve_path(&data.lancedb_uri).to_string_lossy().into_owned();
        let dense = LanceDenseIndex::open(&lance_uri, &data.lancedb_table)
            .await
            .with_context(|| format!("opening lancedb table {} at {lance_uri}", data.lancedb_table))?;
        let chunks = LanceChunkStore::open(&lance_uri, &data.lancedb_table).await?;

        let sqlite_path = config.resolve_path(&data.sqlite_path);
        let store = Arc::new(
            SqliteStore::open(&sqlite_path)
                .with_context(|| format!("opening structured store at {}", sqlite_path.display()))?,
        );

        if embedder.dim() != dense.dim() {
            return Err(Error::DimensionMismatch { expected: dense.dim(), actual: embedder.dim() }.into());
        }
        info!(dim = dense.dim(), tantivy = %tantivy_dir.display(), lancedb = %lance_uri, "indexes opened");

        Ok(Self {
            dense: Arc::new(dense),
            lexical: Arc::new(lexical),
            structured: store.clone(),
            chunks: Arc::new(chunks),
            catalog: store,
            embedder,
        })
    }
}
