//! Tables the structured adapter reads. The store is built and loaded
//! elsewhere; this DDL documents the expected layout and seeds test fixtures.
//! `pages` and `authors` columns hold JSON arrays.
use rusqlite::Connection;

pub const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    document_id TEXT PRIMARY KEY,
    title       TEXT NOT NULL,
    authors     TEXT NOT NULL DEFAULT '[]',
    year        INTEGER,
    journal     TEXT,
    doi         TEXT,
    registry_id TEXT
);
CREATE TABLE IF NOT EXISTS studies (
    study_id    TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(document_id),
    title       TEXT NOT NULL,
    year        INTEGER,
    registry_id TEXT
);
CREATE TABLE IF NOT EXISTS arms (
    study_id     TEXT NOT NULL REFERENCES studies(study_id),
    arm_id       TEXT NOT NULL,
    name         TEXT NOT NULL,
    n_randomized INTEGER,
    n_analyzed   INTEGER,
    PRIMARY KEY (study_id, arm_id)
);
CREATE TABLE IF NOT EXISTS outcomes (
    study_id   TEXT NOT NULL REFERENCES studies(study_id),
    concept_id TEXT NOT NULL,
    name       TEXT NOT NULL,
    measure    TEXT NOT NULL,
    timepoint  TEXT NOT NULL,
    estimate   REAL,
    ci_lower   REAL,
    ci_upper   REAL,
    p_value    REAL,
    unit       TEXT,
    pages      TEXT NOT NULL DEFAULT '[]',
    table_ref  TEXT,
    PRIMARY KEY (study_id, concept_id, measure, timepoint)
);
CREATE TABLE IF NOT EXISTS safety (
    study_id   TEXT NOT NULL REFERENCES studies(study_id),
    term       TEXT NOT NULL,
    period     TEXT NOT NULL,
    arm_id     TEXT NOT NULL,
    patients   INTEGER,
    events     INTEGER,
    percentage REAL,
    pages      TEXT NOT NULL DEFAULT '[]',
    PRIMARY KEY (study_id, term, period, arm_id)
);
";

pub const REQUIRED_TABLES: [&str; 5] = ["documents", "studies", "arms", "outcomes", "safety"];

/// Returns the required tables missing from `conn`.
pub fn missing_tables(conn: &Connection) -> rusqlite::Result<Vec<&'static str>> {
    let mut stmt = conn.prepare("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?;
    let mut missing = Vec::new();
    for table in REQUIRED_TABLES {
        if !stmt.exists([table])? {
            missing.push(table);
        }
    }
    Ok(missing)
}
