//! evidence-structured
//!
//! Exact relational retrieval over the study/arm/outcome/safety tables:
//! an intent recognizer and a read-only SQLite adapter that also serves the
//! document catalog.
pub mod intent;
pub mod schema;
pub mod store;

pub use intent::{recognize, IntentRecognizer};
pub use store::SqliteStore;
