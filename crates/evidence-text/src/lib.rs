//! evidence-text
//!
//! Tantivy-backed lexical retrieval over chunk text. `query` mirrors the
//! corpus tokenization, `search` implements [`evidence_core::traits::LexicalIndex`].
pub mod query;
pub mod search;
pub mod tantivy_utils;

pub use query::tokenize_query;
pub use search::TantivyLexicalIndex;
