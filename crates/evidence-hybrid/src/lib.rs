//! evidence-hybrid
//!
//! The orchestrator: runs the dense, lexical and structured sources
//! concurrently under one deadline, fuses their candidates into a single
//! ranked list with citations, and caches it.
pub mod cache;
pub mod citation;
pub mod engine;
pub mod expansion;
pub mod fusion;
pub mod loader;

pub use cache::{AnswerCache, CacheEntry, CacheKey};
pub use engine::{HybridSearchEngine, IndexSet, SearchRequest, SearchResponse, SourceOutcome};
pub use expansion::{NoExpansion, QueryExpander, SynonymExpander};
pub use fusion::{fuse, CandidateList};
