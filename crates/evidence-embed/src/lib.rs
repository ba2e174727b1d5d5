//! evidence-embed
//!
//! Query embedding for the dense index: a candle BERT-family encoder (E5 by
//! default) with mean pooling, and a hashing embedder for offline runs.
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;
use tracing::{debug, info, warn};

use evidence_core::config::EmbeddingSettings;
use evidence_core::traits::Embedder;

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;
pub use tokenize::tokenize_batch;

pub struct E5Embedder {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
    max_len: usize,
    query_prefix: String,
}

impl E5Embedder {
    pub fn load(model_dir: &Path, max_len: usize, query_prefix: &str) -> Result<Self> {
        let device = device::select_device();
        info!(dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;

        let config_raw = std::fs::read_to_string(model_dir.join("config.json"))?;
        let config: BertConfig = serde_json::from_str(&config_raw)?;
        let dim = serde_json::from_str::<serde_json::Value>(&config_raw)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .and_then(|v| usize::try_from(v).ok())
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))?;

        let weights = load_weights(model_dir, &device)?;
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;
        info!(dim, "embedding model loaded");
        Ok(Self { model, tokenizer, device, dim, max_len, query_prefix: query_prefix.to_string() })
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<HashMap<String, Tensor>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        return Ok(candle_core::safetensors::load(&safetensors, device)?);
    }
    let pickle = model_dir.join("pytorch_model.bin");
    if pickle.exists() {
        let weights = candle_core::pickle::read_all(&pickle)?;
        return Ok(weights.into_iter().collect());
    }
    Err(anyhow!("no model.safetensors or pytorch_model.bin in {}", model_dir.display()))
}

impl Embedder for E5Embedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { self.max_len }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() { return Ok(Vec::new()); }
        let start = Instant::now();
        let (input_ids, attention_mask) = tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let vectors: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(vectors)
    }

    fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let text = format!("{}{}", self.query_prefix, query);
        self.embed_batch(&[text])?.pop().ok_or_else(|| anyhow!("embedder returned no vector for query"))
    }
}

/// Deterministic bag-of-tokens hashing embedder. Needs no model files; shared
/// tokens produce overlapping vectors, so similarity is meaningful but crude.
pub struct HashEmbedder { dim: usize }

impl HashEmbedder {
    pub fn new(dim: usize) -> Self { Self { dim: dim.max(1) } }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let token = token.to_lowercase();
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += val + (i as f32 % 3.0) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v { *x /= norm; }
        v
    }
}

impl Embedder for HashEmbedder {
    fn dim(&self) -> usize { self.dim }
    fn max_len(&self) -> usize { usize::MAX }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

fn fake_requested(settings: &EmbeddingSettings) -> bool {
    settings.use_fake
        || std::env::var("APP_USE_FAKE_EMBEDDINGS").ok().is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Picks the hashing embedder when requested, otherwise loads the model from
/// `settings.model_dir` (already resolved by the caller) or the usual
/// fallbacks.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn Embedder>> {
    if fake_requested(settings) {
        info!(dim = settings.dim, "using hashing embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let dir = resolve_model_dir(settings.model_dir.as_deref())?;
    let model = E5Embedder::load(&dir, settings.max_len, &settings.query_prefix)?;
    if model.dim() != settings.dim {
        warn!(model = model.dim(), configured = settings.dim, "embedding dim differs from configuration");
    }
    Ok(Arc::new(model))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let candidates = configured
        .map(PathBuf::from)
        .into_iter()
        .chain(std::env::var("APP_MODEL_DIR").ok().map(PathBuf::from))
        .chain(std::env::var("MODEL_DIR").ok().map(PathBuf::from))
        .chain([PathBuf::from("models/e5-large-v2")]);
    for p in candidates {
        if p.exists() {
            debug!(dir = %p.display(), "model dir");
            return Ok(p);
        }
    }
    Err(anyhow!("Could not locate embedding model directory"))
}
