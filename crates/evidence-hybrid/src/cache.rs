//! Answer cache keyed by normalized query, mode and result count.
//!
//! Wraps a bounded moka LRU cache with a generation counter. Every entry
//! records the generation it was computed under; [`AnswerCache::invalidate_all`]
//! bumps the generation so entries and in-flight `put`s from before the bump
//! are never served.
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use evidence_core::config::CacheSettings;
use evidence_core::types::{FusedResult, Intent, SearchMode, SourceKind};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    query: String,
    mode: SearchMode,
    top_k: usize,
    intent: Option<Intent>,
}

impl CacheKey {
    pub fn new(query: &str, mode: SearchMode, top_k: usize, intent: Option<&Intent>) -> Self {
        Self { query: normalize_query(query), mode, top_k, intent: intent.cloned() }
    }

    pub fn query(&self) -> &str {
        &self.query
    }
}

/// Lowercase, collapse whitespace runs to one space, trim.
pub fn normalize_query(query: &str) -> String {
    query.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub results: Vec<FusedResult>,
    pub sources_used: BTreeSet<SourceKind>,
    /// Prose produced by the downstream generator, attached after the fact.
    pub answer: Option<String>,
    pub created_at: DateTime<Utc>,
    pub generation: u64,
}

impl CacheEntry {
    pub fn new(results: Vec<FusedResult>, sources_used: BTreeSet<SourceKind>, generation: u64) -> Self {
        Self { results, sources_used, answer: None, created_at: Utc::now(), generation }
    }
}

pub struct AnswerCache {
    cache: Cache<CacheKey, CacheEntry>,
    generation: AtomicU64,
}

impl AnswerCache {
    pub fn new(capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(capacity)
            .eviction_policy(EvictionPolicy::lru())
            .build();
        Self { cache, generation: AtomicU64::new(0) }
    }

    pub fn from_settings(settings: &CacheSettings) -> Self {
        // `lru` is the only accepted policy; settings validation rejects others.
        Self::new(settings.capacity)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.cache.get(key)?;
        if entry.generation != self.generation() {
            self.cache.invalidate(key);
            return None;
        }
        Some(entry)
    }

    /// Returns `false` and drops the entry when it was computed under an
    /// older generation.
    pub fn put(&self, key: CacheKey, entry: CacheEntry) -> bool {
        if entry.generation != self.generation() {
            return false;
        }
        self.cache.insert(key, entry);
        true
    }

    /// Attaches generated answer text to a live entry. Returns `false` when
    /// the key is absent or stale.
    pub fn attach_answer(&self, key: &CacheKey, answer: String) -> bool {
        match self.get(key) {
            Some(mut entry) => {
                entry.answer = Some(answer);
                self.put(key.clone(), entry)
            }
            None => false,
        }
    }

    pub fn invalidate_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Applies pending evictions and invalidations immediately.
    pub fn run_pending_tasks(&self) {
        self.cache.run_pending_tasks();
    }
}
