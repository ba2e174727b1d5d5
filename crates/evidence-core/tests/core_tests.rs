use std::fs;

use figment::{providers::{Format, Toml}, Figment};
use tempfile::TempDir;

use evidence_core::config::{resolve_with_base, Config, EngineSettings, FusionWeights};
use evidence_core::error::Error;
use evidence_core::memory::MemoryChunkStore;
use evidence_core::traits::ChunkStore;
use evidence_core::types::{Chunk, SearchMode, SourceKind, SourceScores};

fn chunk(id: &str) -> Chunk {
    Chunk {
        id: id.to_string(),
        document_id: "doc-1".to_string(),
        pages: vec![1],
        paragraph_index: 0,
        table_ref: None,
        figure_ref: None,
        section: None,
        text: format!("text of {id}"),
        embedding: Vec::new(),
    }
}

#[test]
fn empty_config_yields_defaults() {
    let tmp = TempDir::new().unwrap();
    let config = Config::from_figment(Figment::new(), tmp.path());
    let settings = config.settings().expect("defaults are valid");
    assert_eq!(settings, EngineSettings::default());
    assert_eq!(settings.retrieval.top_k(SourceKind::Dense, SearchMode::Fast), 10);
    assert_eq!(settings.retrieval.top_k(SourceKind::Lexical, SearchMode::Depth), 20);
    assert_eq!(settings.modes.results(SearchMode::Fast), 5);
    assert_eq!(settings.modes.results(SearchMode::Depth), 10);
    assert_eq!(settings.cache.capacity, 256);
}

#[test]
fn toml_file_overrides_selected_keys() {
    let tmp = TempDir::new().unwrap();
    fs::write(
        tmp.path().join("config.toml"),
        r#"
[fusion.weights]
dense = 2.0
lexical = 1.0
structured = 1.0

[retrieval]
timeout_ms = 500

[data]
sqlite_path = "store/evidence.sqlite"
"#,
    )
    .unwrap();

    let figment = Figment::new().merge(Toml::file(tmp.path().join("config.toml")));
    let config = Config::from_figment(figment, tmp.path());
    let settings = config.settings().unwrap();
    assert_eq!(settings.retrieval.timeout_ms, 500);
    assert_eq!(settings.retrieval.dense_top_k, 10, "untouched keys keep defaults");

    let w = settings.fusion.weights.normalized().unwrap();
    assert!((w.dense - 0.5).abs() < 1e-9);
    assert!((w.lexical - 0.25).abs() < 1e-9);

    let resolved = config.resolve_path(&settings.data.sqlite_path);
    assert_eq!(resolved, tmp.path().join("store/evidence.sqlite"));
}

#[test]
fn unknown_eviction_policy_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let figment = Figment::new().merge(Toml::string("[cache]\neviction = \"fifo\"\n"));
    let config = Config::from_figment(figment, tmp.path());
    assert!(matches!(config.settings(), Err(Error::InvalidConfig(_))));
}

#[test]
fn invalid_weights_are_rejected() {
    assert!(matches!(FusionWeights::new(0.0, 0.0, 0.0).normalized(), Err(Error::InvalidConfig(_))));
    assert!(matches!(FusionWeights::new(-0.1, 0.5, 0.5).normalized(), Err(Error::InvalidConfig(_))));
    assert!(matches!(FusionWeights::new(f64::NAN, 0.5, 0.5).normalized(), Err(Error::InvalidConfig(_))));
}

#[test]
fn scaled_weights_give_identical_composites() {
    let scores = SourceScores { dense: 0.8, lexical: 0.4, structured: 1.0 };
    let a = FusionWeights::new(0.5, 0.3, 0.2).normalized().unwrap();
    let b = FusionWeights::new(5.0, 3.0, 2.0).normalized().unwrap();
    assert!((a.composite(&scores) - b.composite(&scores)).abs() < 1e-12);
}

#[test]
fn resolve_keeps_absolute_paths() {
    let base = std::path::Path::new("/srv/evidence");
    assert_eq!(resolve_with_base(base, "/data/x"), std::path::PathBuf::from("/data/x"));
    assert_eq!(resolve_with_base(base, "x"), base.join("x"));
}

#[tokio::test]
async fn memory_store_returns_only_known_ids() {
    let store = MemoryChunkStore::new(vec![chunk("c1"), chunk("c2")]);
    let found = store
        .get_many(&["c1".to_string(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key("c1"));
    assert!(matches!(store.get("missing").await, Err(Error::NotFound(_))));
}
