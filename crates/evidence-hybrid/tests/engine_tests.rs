use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use evidence_core::config::{EngineSettings, FusionWeights};
use evidence_core::error::{Error, Result};
use evidence_core::memory::{MemoryCatalog, MemoryChunkStore};
use evidence_core::traits::{DenseIndex, Embedder, LexicalIndex, StructuredSource};
use evidence_core::types::{
    Chunk, Document, Intent, OutcomeRecord, RawScore, ResultKind, ScoredResult, SearchMode, SourceKind,
    StructuredRecord,
};
use evidence_hybrid::{
    AnswerCache, HybridSearchEngine, IndexSet, NoExpansion, SearchRequest, SynonymExpander,
};

#[derive(Clone, Copy)]
enum Behavior {
    Ok,
    Fail,
    Slow(Duration),
    /// Succeeds for the first `n` calls, fails afterwards.
    FailFromCall(usize),
}

impl Behavior {
    async fn apply(self, kind: SourceKind) -> Result<()> {
        match self {
            Behavior::Ok | Behavior::FailFromCall(_) => Ok(()),
            Behavior::Fail => Err(Error::unavailable(kind, "backend offline")),
            Behavior::Slow(d) => {
                tokio::time::sleep(d).await;
                Ok(())
            }
        }
    }
}

struct ConstEmbedder {
    dim: usize,
}

impl Embedder for ConstEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn max_len(&self) -> usize {
        32
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![1.0; self.dim]).collect())
    }
}

struct FakeDense {
    dim: usize,
    hits: Vec<(&'static str, f32)>,
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl DenseIndex for FakeDense {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn search_vec(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredResult>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if query_vec.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query_vec.len() });
        }
        if let Behavior::FailFromCall(n) = self.behavior {
            if call >= n {
                return Err(Error::unavailable(SourceKind::Dense, "backend offline"));
            }
        }
        self.behavior.apply(SourceKind::Dense).await?;
        Ok(self.hits.iter().take(k).map(|(id, s)| ScoredResult::chunk(*id, RawScore::Dense(*s))).collect())
    }
}

struct FakeLexical {
    hits: Vec<(&'static str, f32)>,
    behavior: Behavior,
    seen: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl LexicalIndex for FakeLexical {
    fn tokenize(&self, query: &str) -> Vec<String> {
        query.split_whitespace().map(str::to_lowercase).collect()
    }

    async fn search_terms(&self, terms: &[String], k: usize) -> Result<Vec<ScoredResult>> {
        self.seen.lock().unwrap().push(terms.to_vec());
        self.behavior.apply(SourceKind::Lexical).await?;
        Ok(self.hits.iter().take(k).map(|(id, s)| ScoredResult::chunk(*id, RawScore::Lexical(*s))).collect())
    }
}

struct FakeStructured {
    records: Vec<StructuredRecord>,
    behavior: Behavior,
    hints: Arc<Mutex<Vec<Option<Intent>>>>,
}

#[async_trait]
impl StructuredSource for FakeStructured {
    async fn search_structured(&self, _query: &str, hint: Option<&Intent>, k: usize) -> Result<Vec<ScoredResult>> {
        self.hints.lock().unwrap().push(hint.cloned());
        self.behavior.apply(SourceKind::Structured).await?;
        Ok(self.records.iter().take(k).cloned().map(ScoredResult::record).collect())
    }
}

fn chunk(id: &str, doc: &str, page: u32) -> Chunk {
    Chunk {
        id: id.into(),
        document_id: doc.into(),
        pages: vec![page],
        paragraph_index: 0,
        table_ref: None,
        figure_ref: None,
        section: None,
        text: format!("passage {id}"),
        embedding: Vec::new(),
    }
}

fn outcome(doc: &str, page: u32) -> StructuredRecord {
    StructuredRecord::Outcome(OutcomeRecord {
        study_id: "liberate".into(),
        document_id: doc.into(),
        concept_id: "fev1".into(),
        name: "FEV1 responders".into(),
        measure: "difference".into(),
        timepoint: "P12M".into(),
        estimate: Some(0.106),
        ci_lower: None,
        ci_upper: None,
        p_value: None,
        unit: Some("L".into()),
        pages: vec![page],
        table_ref: None,
    })
}

struct Fixture {
    dense: Behavior,
    lexical: Behavior,
    structured: Behavior,
    embed_dim: usize,
    record: StructuredRecord,
    dense_calls: Arc<AtomicUsize>,
    lexical_seen: Arc<Mutex<Vec<Vec<String>>>>,
    hints: Arc<Mutex<Vec<Option<Intent>>>>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            dense: Behavior::Ok,
            lexical: Behavior::Ok,
            structured: Behavior::Ok,
            embed_dim: 4,
            record: outcome("valipour-2014", 9),
            dense_calls: Arc::default(),
            lexical_seen: Arc::default(),
            hints: Arc::default(),
        }
    }
}

impl Fixture {
    /// Dense A 0.9, B 0.3; lexical B 10, C 2; one structured record.
    fn indexes(&self) -> IndexSet {
        let chunks = MemoryChunkStore::new([chunk("A", "criner-2018", 1), chunk("B", "criner-2018", 2), chunk("C", "sciurba-2010", 3)]);
        let catalog = MemoryCatalog::new([Document {
            id: "criner-2018".into(),
            title: "Zephyr valve trial".into(),
            authors: vec!["Criner, Gerard J.".into()],
            year: Some(2018),
            ..Document::default()
        }]);
        IndexSet {
            dense: Arc::new(FakeDense {
                dim: 4,
                hits: vec![("A", 0.9), ("B", 0.3)],
                behavior: self.dense,
                calls: Arc::clone(&self.dense_calls),
            }),
            lexical: Arc::new(FakeLexical {
                hits: vec![("B", 10.0), ("C", 2.0)],
                behavior: self.lexical,
                seen: Arc::clone(&self.lexical_seen),
            }),
            structured: Arc::new(FakeStructured {
                records: vec![self.record.clone()],
                behavior: self.structured,
                hints: Arc::clone(&self.hints),
            }),
            chunks: Arc::new(chunks),
            catalog: Arc::new(catalog),
            embedder: Arc::new(ConstEmbedder { dim: self.embed_dim }),
        }
    }

    fn engine(&self) -> HybridSearchEngine {
        self.engine_with(EngineSettings::default())
    }

    fn engine_with(&self, settings: EngineSettings) -> HybridSearchEngine {
        let cache = Arc::new(AnswerCache::from_settings(&settings.cache));
        HybridSearchEngine::new(self.indexes(), settings, cache, Arc::new(NoExpansion)).unwrap()
    }
}

fn ids(results: &[evidence_core::types::FusedResult]) -> Vec<String> {
    results.iter().map(|r| r.id.clone()).collect()
}

#[tokio::test]
async fn ranks_three_sources_into_one_list() {
    let fx = Fixture::default();
    let engine = fx.engine();
    let res = engine.search("FEV1 after valves", SearchMode::Fast, None).await.unwrap();

    let record_id = fx.record.id();
    assert_eq!(ids(&res.results), vec!["A".to_string(), "B".to_string(), record_id, "C".to_string()]);
    let composites: Vec<f64> = res.results.iter().map(|r| r.composite).collect();
    for (got, want) in composites.iter().zip([0.5, 0.3, 0.2, 0.0]) {
        assert!((got - want).abs() < 1e-9, "{got} != {want}");
    }
    assert!(composites.windows(2).all(|w| w[0] >= w[1]));
    assert_eq!(res.sources_used, BTreeSet::from(SourceKind::ALL));
    assert!(!res.cache_hit);

    assert_eq!(res.results[0].citation.as_ref().map(|c| c.token.as_str()), Some("Criner 2018"));
    assert_eq!(res.results[2].kind, ResultKind::Record);
    assert_eq!(res.results[2].citation.as_ref().map(|c| c.token.as_str()), Some("valipour 2014"));
}

#[tokio::test]
async fn record_on_chunk_page_merges_into_that_chunk() {
    let fx = Fixture { record: outcome("criner-2018", 2), ..Fixture::default() };
    let res = fx.engine().search("FEV1", SearchMode::Fast, None).await.unwrap();

    assert_eq!(res.results.len(), 3);
    let flagged: Vec<&str> = res.results.iter().filter(|r| r.structured_match).map(|r| r.id.as_str()).collect();
    assert_eq!(flagged, vec!["B"]);
    let b = res.results.iter().find(|r| r.id == "B").unwrap();
    assert!((b.scores.lexical - 1.0).abs() < 1e-9);
    assert!((b.scores.structured - 1.0).abs() < 1e-9);
    assert!((b.composite - 0.5).abs() < 1e-9);
    assert_eq!(b.records, vec![fx.record.clone()]);
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let fx = Fixture::default();
    let engine = fx.engine();
    let first = engine.search("FEV1 after valves", SearchMode::Fast, None).await.unwrap();
    let second = engine.search("  fev1 AFTER valves ", SearchMode::Fast, None).await.unwrap();

    assert!(second.cache_hit);
    assert_eq!(fx.dense_calls.load(Ordering::SeqCst), 1);
    assert_eq!(serde_json::to_string(&first.results).unwrap(), serde_json::to_string(&second.results).unwrap());
    assert_eq!(first.sources_used, second.sources_used);

    let depth = engine.search("FEV1 after valves", SearchMode::Depth, None).await.unwrap();
    assert!(!depth.cache_hit, "mode is part of the key");
}

#[tokio::test]
async fn swapping_indexes_invalidates_cached_answers() {
    let fx = Fixture::default();
    let engine = fx.engine();
    let request = SearchRequest::new("FEV1 after valves", SearchMode::Fast);
    engine.search_request(&request).await.unwrap();
    assert!(engine.record_answer(&request, "FEV1 improved (Criner 2018)"));
    assert_eq!(engine.cached_answer(&request).as_deref(), Some("FEV1 improved (Criner 2018)"));

    engine.swap_indexes(fx.indexes());
    assert_eq!(engine.cached_answer(&request), None);
    let after = engine.search_request(&request).await.unwrap();
    assert!(!after.cache_hit);
    assert_eq!(fx.dense_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_source_is_left_out() {
    let fx = Fixture { dense: Behavior::Fail, ..Fixture::default() };
    let res = fx.engine().search("FEV1 after valves", SearchMode::Fast, None).await.unwrap();

    assert_eq!(res.sources_used, BTreeSet::from([SourceKind::Lexical, SourceKind::Structured]));
    assert_eq!(res.results[0].id, "B");
    assert!(res.results.iter().all(|r| r.scores.dense == 0.0));
}

#[tokio::test]
async fn slow_source_misses_the_deadline() {
    let fx = Fixture { lexical: Behavior::Slow(Duration::from_secs(30)), ..Fixture::default() };
    let mut settings = EngineSettings::default();
    settings.retrieval.timeout_ms = 100;
    let started = std::time::Instant::now();
    let res = fx.engine_with(settings).search("FEV1 after valves", SearchMode::Fast, None).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(res.sources_used, BTreeSet::from([SourceKind::Dense, SourceKind::Structured]));
    assert!(!ids(&res.results).contains(&"C".to_string()));
}

#[tokio::test]
async fn no_sources_means_no_results() {
    let fx = Fixture {
        dense: Behavior::Fail,
        lexical: Behavior::Fail,
        structured: Behavior::Fail,
        ..Fixture::default()
    };
    let engine = fx.engine();
    let err = engine.search("FEV1", SearchMode::Fast, None).await.unwrap_err();
    assert!(matches!(err, Error::NoSourcesAvailable));
    assert_eq!(engine.cache().entry_count(), 0);
}

#[tokio::test]
async fn embedding_dimension_mismatch_is_fatal() {
    let fx = Fixture { embed_dim: 3, ..Fixture::default() };
    let err = fx.engine().search("FEV1", SearchMode::Fast, None).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, actual: 3 }));
}

#[tokio::test]
async fn depth_mode_fuses_reformulations() {
    let fx = Fixture::default();
    let settings = EngineSettings::default();
    let cache = Arc::new(AnswerCache::from_settings(&settings.cache));
    let engine = HybridSearchEngine::new(fx.indexes(), settings, cache, Arc::new(SynonymExpander)).unwrap();

    let res = engine.search("BLVR outcomes", SearchMode::Depth, None).await.unwrap();
    let seen = fx.lexical_seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0], vec!["blvr", "outcomes"]);
    assert!(seen[1].contains(&"bronchoscopic".to_string()));
    assert_eq!(fx.dense_calls.load(Ordering::SeqCst), 2);
    assert_eq!(fx.hints.lock().unwrap().len(), 1, "structured source sees the original query only");
    assert_eq!(res.results.len(), 4);
}

#[tokio::test]
async fn failed_reformulation_keeps_earlier_lists() {
    let fx = Fixture { dense: Behavior::FailFromCall(1), ..Fixture::default() };
    let settings = EngineSettings::default();
    let cache = Arc::new(AnswerCache::from_settings(&settings.cache));
    let engine = HybridSearchEngine::new(fx.indexes(), settings, cache, Arc::new(SynonymExpander)).unwrap();

    let res = engine.search("BLVR outcomes", SearchMode::Depth, None).await.unwrap();
    assert_eq!(fx.dense_calls.load(Ordering::SeqCst), 2, "second reformulation was attempted");
    assert!(res.sources_used.contains(&SourceKind::Dense));
    assert_eq!(res.results[0].id, "A");
    assert!((res.results[0].scores.dense - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn every_reformulation_failing_drops_the_source() {
    let fx = Fixture { dense: Behavior::FailFromCall(0), ..Fixture::default() };
    let settings = EngineSettings::default();
    let cache = Arc::new(AnswerCache::from_settings(&settings.cache));
    let engine = HybridSearchEngine::new(fx.indexes(), settings, cache, Arc::new(SynonymExpander)).unwrap();

    let res = engine.search("BLVR outcomes", SearchMode::Depth, None).await.unwrap();
    assert_eq!(fx.dense_calls.load(Ordering::SeqCst), 2);
    assert_eq!(res.sources_used, BTreeSet::from([SourceKind::Lexical, SourceKind::Structured]));
    assert!(res.results.iter().all(|r| r.scores.dense == 0.0));
}

#[tokio::test]
async fn intent_hint_reaches_structured_source() {
    let fx = Fixture::default();
    let engine = fx.engine();
    let intent = Intent::InterventionStudies { intervention: "valve".into() };
    let request = SearchRequest::new("which trials", SearchMode::Fast).with_intent(intent.clone()).with_top_k(2);
    let res = engine.search_request(&request).await.unwrap();

    assert_eq!(fx.hints.lock().unwrap().as_slice(), &[Some(intent)]);
    assert_eq!(res.results.len(), 2);
    assert!(!engine.search_request(&SearchRequest::new("which trials", SearchMode::Fast).with_top_k(2)).await.unwrap().cache_hit);
}

#[tokio::test]
async fn weight_ratios_decide_ranking() {
    let fx = Fixture::default();
    let mut ones = EngineSettings::default();
    ones.fusion.weights = FusionWeights::new(1.0, 1.0, 1.0);
    let mut halves = EngineSettings::default();
    halves.fusion.weights = FusionWeights::new(0.5, 0.5, 0.5);

    let a = fx.engine_with(ones).search("FEV1", SearchMode::Fast, None).await.unwrap();
    let b = fx.engine_with(halves).search("FEV1", SearchMode::Fast, None).await.unwrap();
    assert_eq!(a.results, b.results);

    let mut zero = EngineSettings::default();
    zero.fusion.weights = FusionWeights::new(0.0, 0.0, 0.0);
    let cache = Arc::new(AnswerCache::new(8));
    assert!(HybridSearchEngine::new(fx.indexes(), zero, cache, Arc::new(NoExpansion)).is_err());
}

#[tokio::test]
async fn zero_top_k_is_rejected() {
    let engine = Fixture::default().engine();
    let err = engine.search("FEV1", SearchMode::Fast, Some(0)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfig(_)));
}
