//! Shared types, traits, configuration and errors for the clinical evidence
//! retrieval engine.

pub mod config;
pub mod error;
pub mod memory;
pub mod traits;
pub mod types;
