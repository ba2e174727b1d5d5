//! evidence-vector
//!
//! Dense retrieval over chunk embeddings. `search` queries a LanceDB table,
//! `flat` is a brute-force in-memory index, and `store` hydrates chunks by id
//! from the same LanceDB table.
pub mod flat;
pub mod schema;
pub mod search;
pub mod store;
pub mod table;

pub use flat::FlatDenseIndex;
pub use search::LanceDenseIndex;
pub use store::LanceChunkStore;
