use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

use evidence_core::config::EngineSettings;
use evidence_core::error::{Error, Result};
use evidence_core::traits::{ChunkStore, DenseIndex, DocumentCatalog, Embedder, LexicalIndex, StructuredSource};
use evidence_core::types::{Chunk, ChunkId, DocumentId, FusedResult, Intent, SearchMode, SourceKind};

use crate::cache::{AnswerCache, CacheEntry, CacheKey};
use crate::citation;
use crate::expansion::QueryExpander;
use crate::fusion::{fuse, CandidateList};

/// Every handle one query needs. Swapped as a unit when indexes are rebuilt.
#[derive(Clone)]
pub struct IndexSet {
    pub dense: Arc<dyn DenseIndex>,
    pub lexical: Arc<dyn LexicalIndex>,
    pub structured: Arc<dyn StructuredSource>,
    pub chunks: Arc<dyn ChunkStore>,
    pub catalog: Arc<dyn DocumentCatalog>,
    pub embedder: Arc<dyn Embedder>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub mode: SearchMode,
    /// Falls back to the mode's configured result count.
    pub top_k: Option<usize>,
    /// Overrides intent recognition in the structured source.
    pub intent: Option<Intent>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, mode: SearchMode) -> Self {
        Self { query: query.into(), mode, top_k: None, intent: None }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_intent(mut self, intent: Intent) -> Self {
        self.intent = Some(intent);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<FusedResult>,
    pub sources_used: BTreeSet<SourceKind>,
    pub cache_hit: bool,
}

/// What one retrieval task produced by the deadline.
#[derive(Debug)]
pub enum SourceOutcome {
    Ready(Vec<CandidateList>),
    Unavailable(Error),
}

type SourceTask = JoinHandle<Result<Vec<CandidateList>>>;

/// Fans a query out to the dense, lexical and structured sources, fuses the
/// candidates and caches the ranked, cited list.
pub struct HybridSearchEngine {
    indexes: RwLock<Arc<IndexSet>>,
    settings: EngineSettings,
    cache: Arc<AnswerCache>,
    expander: Arc<dyn QueryExpander>,
}

impl HybridSearchEngine {
    pub fn new(
        indexes: IndexSet,
        settings: EngineSettings,
        cache: Arc<AnswerCache>,
        expander: Arc<dyn QueryExpander>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self { indexes: RwLock::new(Arc::new(indexes)), settings, cache, expander })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &Arc<AnswerCache> {
        &self.cache
    }

    pub async fn search(&self, query: &str, mode: SearchMode, top_k: Option<usize>) -> Result<SearchResponse> {
        self.search_request(&SearchRequest { query: query.to_string(), mode, top_k, intent: None }).await
    }

    pub async fn search_request(&self, request: &SearchRequest) -> Result<SearchResponse> {
        let top_k = self.result_count(request)?;
        let key = CacheKey::new(&request.query, request.mode, top_k, request.intent.as_ref());
        if let Some(entry) = self.cache.get(&key) {
            debug!(query = key.query(), mode = %request.mode, "cache hit");
            return Ok(SearchResponse { results: entry.results, sources_used: entry.sources_used, cache_hit: true });
        }

        let generation = self.cache.generation();
        let indexes = self.current_indexes();
        let started = Instant::now();

        let queries = match request.mode {
            SearchMode::Fast => vec![request.query.clone()],
            SearchMode::Depth => self.expander.expand(&request.query, self.settings.modes.depth_reformulations),
        };
        debug!(mode = %request.mode, reformulations = queries.len(), "searching");

        let outcomes = self.retrieve(&indexes, &queries, request).await?;
        let mut sources_used = BTreeSet::new();
        let mut lists = Vec::new();
        for (kind, outcome) in outcomes {
            match outcome {
                SourceOutcome::Ready(found) => {
                    sources_used.insert(kind);
                    lists.extend(found);
                }
                SourceOutcome::Unavailable(e) => warn!(source = %kind, error = %e, "source unavailable"),
            }
        }
        if sources_used.is_empty() {
            return Err(Error::NoSourcesAvailable);
        }

        let chunks = hydrate(indexes.chunks.as_ref(), &lists).await?;
        let mut results = fuse(&lists, &chunks, &self.settings.fusion.weights, top_k)?;
        attach_citations(indexes.catalog.as_ref(), &mut results).await;
        debug!(
            results = results.len(),
            sources = sources_used.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );

        let entry = CacheEntry::new(results.clone(), sources_used.clone(), generation);
        if !self.cache.put(key, entry) {
            debug!("indexes changed during search; result not cached");
        }
        Ok(SearchResponse { results, sources_used, cache_hit: false })
    }

    /// Attaches generated answer prose to the cached entry for `request`.
    /// Returns `false` when nothing live is cached for it.
    pub fn record_answer(&self, request: &SearchRequest, answer: impl Into<String>) -> bool {
        let Ok(top_k) = self.result_count(request) else {
            return false;
        };
        let key = CacheKey::new(&request.query, request.mode, top_k, request.intent.as_ref());
        self.cache.attach_answer(&key, answer.into())
    }

    /// Cached generated answer for `request`, if any.
    pub fn cached_answer(&self, request: &SearchRequest) -> Option<String> {
        let top_k = self.result_count(request).ok()?;
        let key = CacheKey::new(&request.query, request.mode, top_k, request.intent.as_ref());
        self.cache.get(&key).and_then(|e| e.answer)
    }

    /// Replaces every index handle and drops all cached answers. Queries
    /// already running finish on the old set; their results are not cached.
    pub fn swap_indexes(&self, indexes: IndexSet) {
        {
            let mut guard = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
            *guard = Arc::new(indexes);
        }
        self.cache.invalidate_all();
        info!(generation = self.cache.generation(), "indexes swapped; answer cache invalidated");
    }

    fn current_indexes(&self) -> Arc<IndexSet> {
        let guard = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    fn result_count(&self, request: &SearchRequest) -> Result<usize> {
        match request.top_k {
            Some(0) => Err(Error::InvalidConfig("top_k must be > 0".into())),
            Some(k) => Ok(k),
            None => Ok(self.settings.modes.results(request.mode)),
        }
    }

    async fn retrieve(
        &self,
        indexes: &IndexSet,
        queries: &[String],
        request: &SearchRequest,
    ) -> Result<Vec<(SourceKind, SourceOutcome)>> {
        let retrieval = &self.settings.retrieval;
        let deadline = Instant::now() + retrieval.timeout();

        let tasks: [(SourceKind, SourceTask); 3] = [
            (
                SourceKind::Dense,
                spawn_dense(indexes, queries.to_vec(), retrieval.top_k(SourceKind::Dense, request.mode)),
            ),
            (
                SourceKind::Lexical,
                spawn_lexical(indexes, queries.to_vec(), retrieval.top_k(SourceKind::Lexical, request.mode)),
            ),
            (
                SourceKind::Structured,
                spawn_structured(
                    indexes,
                    request.query.clone(),
                    request.intent.clone(),
                    retrieval.top_k(SourceKind::Structured, request.mode),
                ),
            ),
        ];

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut fatal = None;
        for (kind, handle) in tasks {
            if fatal.is_some() {
                handle.abort();
                continue;
            }
            match await_source(kind, handle, deadline).await {
                Ok(outcome) => outcomes.push((kind, outcome)),
                Err(e) => fatal = Some(e),
            }
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }
}

fn spawn_dense(indexes: &IndexSet, queries: Vec<String>, k: usize) -> SourceTask {
    let index = Arc::clone(&indexes.dense);
    let embedder = Arc::clone(&indexes.embedder);
    tokio::spawn(async move {
        let mut lists = Vec::with_capacity(queries.len());
        let mut failed = None;
        for query in queries {
            let attempt = async {
                let embedder = Arc::clone(&embedder);
                let vector = tokio::task::spawn_blocking(move || embedder.embed_query(&query))
                    .await
                    .map_err(|e| Error::unavailable(SourceKind::Dense, e))?
                    .map_err(|e| Error::unavailable(SourceKind::Dense, e))?;
                if vector.len() != index.dim() {
                    return Err(Error::DimensionMismatch { expected: index.dim(), actual: vector.len() });
                }
                index.search_vec(&vector, k).await
            };
            match attempt.await {
                Ok(found) => lists.push(CandidateList::new(SourceKind::Dense, found)),
                Err(e) => failed = Some(skip_reformulation(SourceKind::Dense, e)?),
            }
        }
        all_failed(lists, failed)
    })
}

fn spawn_lexical(indexes: &IndexSet, queries: Vec<String>, k: usize) -> SourceTask {
    let index = Arc::clone(&indexes.lexical);
    tokio::spawn(async move {
        let mut lists = Vec::with_capacity(queries.len());
        let mut failed = None;
        for query in queries {
            let terms = index.tokenize(&query);
            if terms.is_empty() {
                continue;
            }
            match index.search_terms(&terms, k).await {
                Ok(found) => lists.push(CandidateList::new(SourceKind::Lexical, found)),
                Err(e) => failed = Some(skip_reformulation(SourceKind::Lexical, e)?),
            }
        }
        all_failed(lists, failed)
    })
}

/// Fatal errors end the source; anything else only costs this reformulation.
fn skip_reformulation(kind: SourceKind, e: Error) -> Result<Error> {
    if e.is_fatal() {
        return Err(e);
    }
    warn!(source = %kind, error = %e, "reformulation failed; skipping");
    Ok(e)
}

/// The source is unavailable only when no reformulation produced a list.
fn all_failed(lists: Vec<CandidateList>, failed: Option<Error>) -> Result<Vec<CandidateList>> {
    match failed {
        Some(e) if lists.is_empty() => Err(e),
        _ => Ok(lists),
    }
}

// Structured filtering is exact, so only the original query is used.
fn spawn_structured(indexes: &IndexSet, query: String, hint: Option<Intent>, k: usize) -> SourceTask {
    let source = Arc::clone(&indexes.structured);
    tokio::spawn(async move {
        let found = source.search_structured(&query, hint.as_ref(), k).await?;
        Ok(vec![CandidateList::new(SourceKind::Structured, found)])
    })
}

/// Waits for one task until the shared deadline. Fatal errors propagate;
/// anything else marks the source unavailable.
async fn await_source(kind: SourceKind, mut handle: SourceTask, deadline: Instant) -> Result<SourceOutcome> {
    let started = Instant::now();
    let outcome = match timeout_at(deadline, &mut handle).await {
        Err(_) => {
            handle.abort();
            SourceOutcome::Unavailable(Error::unavailable(kind, "deadline exceeded"))
        }
        Ok(Err(join)) => SourceOutcome::Unavailable(Error::unavailable(kind, join)),
        Ok(Ok(Err(e))) if e.is_fatal() => return Err(e),
        Ok(Ok(Err(e))) => SourceOutcome::Unavailable(e),
        Ok(Ok(Ok(lists))) => {
            let candidates: usize = lists.iter().map(|l| l.results.len()).sum();
            debug!(source = %kind, lists = lists.len(), candidates, waited_ms = started.elapsed().as_millis() as u64, "source done");
            SourceOutcome::Ready(lists)
        }
    };
    Ok(outcome)
}

/// Fetches every chunk candidate in one round-trip.
async fn hydrate(store: &dyn ChunkStore, lists: &[CandidateList]) -> Result<HashMap<ChunkId, Chunk>> {
    let ids: Vec<ChunkId> = lists
        .iter()
        .flat_map(|l| l.results.iter())
        .filter(|r| r.record.is_none())
        .map(|r| r.id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    store.get_many(&ids).await
}

async fn attach_citations(catalog: &dyn DocumentCatalog, results: &mut [FusedResult]) {
    let ids: Vec<DocumentId> = results
        .iter()
        .map(|r| r.provenance.document_id.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return;
    }
    let documents = catalog.documents(&ids).await.unwrap_or_else(|e| {
        warn!(error = %e, "document catalog unavailable; citing by id");
        HashMap::new()
    });
    for row in results.iter_mut() {
        let doc_id = &row.provenance.document_id;
        row.citation = Some(match documents.get(doc_id) {
            Some(doc) => citation::resolve(doc),
            None => citation::unresolved(doc_id),
        });
    }
}
