use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::types::ToSql;
use rusqlite::{Connection, OpenFlags, Row};
use tracing::debug;

use evidence_core::error::{Error, Result};
use evidence_core::traits::{DocumentCatalog, StructuredSource};
use evidence_core::types::{
    Arm, Document, DocumentId, Intent, OutcomeRecord, SafetyEvent, ScoredResult, SourceKind, StructuredRecord,
    StudyRecord,
};

use crate::intent::IntentRecognizer;
use crate::schema::missing_tables;

/// Read-only adapter over the relational evidence store.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    recognizer: IntentRecognizer,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Self::from_connection(conn)
    }

    /// Wraps an existing connection after checking the expected tables exist.
    pub fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        let missing = missing_tables(&conn)?;
        if !missing.is_empty() {
            anyhow::bail!("structured store is missing tables: {}", missing.join(", "));
        }
        Ok(Self { conn: Arc::new(Mutex::new(conn)), recognizer: IntentRecognizer })
    }

    fn with_conn<F, T>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let guard = self.conn.lock().map_err(|e| anyhow::anyhow!("connection lock poisoned: {e}"))?;
        Ok(f(&guard)?)
    }

    /// Runs the filter for `intent` and returns at most `k` records in
    /// unique-key order.
    pub fn records_for(&self, intent: &Intent, k: usize) -> anyhow::Result<Vec<StructuredRecord>> {
        let limit = i64::try_from(k)?;
        self.with_conn(|conn| match intent {
            Intent::AdverseEventRate { term, intervention } => {
                safety_events(conn, term.as_deref(), intervention.as_deref(), limit)
            }
            Intent::OutcomeValue { concept, timepoint } => {
                outcomes(conn, concept.as_deref(), timepoint.as_deref(), limit)
            }
            Intent::InterventionStudies { intervention } => studies(conn, intervention, limit),
        })
    }
}

fn like(term: &str) -> String {
    let escaped = term.to_lowercase().replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_");
    format!("%{escaped}%")
}

fn pages(raw: Option<String>) -> Vec<u32> {
    raw.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

fn run_query<T>(
    conn: &Connection,
    sql: &str,
    params: &[Box<dyn ToSql>],
    map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let params_refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), map)?;
    rows.collect()
}

fn safety_events(
    conn: &Connection,
    term: Option<&str>,
    intervention: Option<&str>,
    limit: i64,
) -> rusqlite::Result<Vec<StructuredRecord>> {
    let mut sql = String::from(
        "SELECT sa.study_id, s.document_id, sa.term, sa.period, sa.arm_id, a.name, \
                sa.patients, sa.events, sa.percentage, sa.pages \
         FROM safety sa \
         JOIN studies s ON s.study_id = sa.study_id \
         LEFT JOIN arms a ON a.study_id = sa.study_id AND a.arm_id = sa.arm_id \
         WHERE 1 = 1",
    );
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(t) = term {
        sql.push_str(" AND lower(sa.term) LIKE ? ESCAPE '\\'");
        params.push(Box::new(like(t)));
    }
    if let Some(i) = intervention {
        sql.push_str(" AND (lower(s.title) LIKE ? ESCAPE '\\' OR lower(a.name) LIKE ? ESCAPE '\\')");
        params.push(Box::new(like(i)));
        params.push(Box::new(like(i)));
    }
    sql.push_str(" ORDER BY sa.study_id, sa.term, sa.period, sa.arm_id LIMIT ?");
    params.push(Box::new(limit));

    run_query(conn, &sql, &params, |row| {
        Ok(StructuredRecord::Safety(SafetyEvent {
            study_id: row.get(0)?,
            document_id: row.get(1)?,
            term: row.get(2)?,
            period: row.get(3)?,
            arm_id: row.get(4)?,
            arm_name: row.get(5)?,
            patients: row.get(6)?,
            events: row.get(7)?,
            percentage: row.get(8)?,
            pages: pages(row.get(9)?),
        }))
    })
}

fn outcomes(
    conn: &Connection,
    concept: Option<&str>,
    timepoint: Option<&str>,
    limit: i64,
) -> rusqlite::Result<Vec<StructuredRecord>> {
    let mut sql = String::from(
        "SELECT o.study_id, s.document_id, o.concept_id, o.name, o.measure, o.timepoint, \
                o.estimate, o.ci_lower, o.ci_upper, o.p_value, o.unit, o.pages, o.table_ref \
         FROM outcomes o \
         JOIN studies s ON s.study_id = o.study_id \
         WHERE 1 = 1",
    );
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();
    if let Some(c) = concept {
        sql.push_str(" AND (lower(o.concept_id) = ? OR lower(o.name) LIKE ? ESCAPE '\\')");
        params.push(Box::new(c.to_lowercase()));
        params.push(Box::new(like(c)));
    }
    if let Some(t) = timepoint {
        sql.push_str(" AND upper(o.timepoint) = ?");
        params.push(Box::new(t.to_uppercase()));
    }
    sql.push_str(" ORDER BY o.study_id, o.concept_id, o.measure, o.timepoint LIMIT ?");
    params.push(Box::new(limit));

    run_query(conn, &sql, &params, |row| {
        Ok(StructuredRecord::Outcome(OutcomeRecord {
            study_id: row.get(0)?,
            document_id: row.get(1)?,
            concept_id: row.get(2)?,
            name: row.get(3)?,
            measure: row.get(4)?,
            timepoint: row.get(5)?,
            estimate: row.get(6)?,
            ci_lower: row.get(7)?,
            ci_upper: row.get(8)?,
            p_value: row.get(9)?,
            unit: row.get(10)?,
            pages: pages(row.get(11)?),
            table_ref: row.get(12)?,
        }))
    })
}

fn studies(conn: &Connection, intervention: &str, limit: i64) -> rusqlite::Result<Vec<StructuredRecord>> {
    let sql = "SELECT s.study_id, s.document_id, s.title, s.year, s.registry_id \
               FROM studies s \
               WHERE lower(s.title) LIKE ?1 ESCAPE '\\' \
                  OR EXISTS (SELECT 1 FROM arms a WHERE a.study_id = s.study_id AND lower(a.name) LIKE ?1 ESCAPE '\\') \
               ORDER BY s.study_id LIMIT ?2";
    let params: Vec<Box<dyn ToSql>> = vec![Box::new(like(intervention)), Box::new(limit)];
    let mut found = run_query(conn, sql, &params, |row| {
        Ok(StudyRecord {
            study_id: row.get(0)?,
            document_id: row.get(1)?,
            title: row.get(2)?,
            year: row.get(3)?,
            registry_id: row.get(4)?,
            arms: Vec::new(),
        })
    })?;

    let mut stmt = conn.prepare(
        "SELECT study_id, arm_id, name, n_randomized, n_analyzed FROM arms WHERE study_id = ?1 ORDER BY arm_id",
    )?;
    for study in &mut found {
        let arms = stmt.query_map([&study.study_id], |row| {
            Ok(Arm {
                study_id: row.get(0)?,
                arm_id: row.get(1)?,
                name: row.get(2)?,
                n_randomized: row.get(3)?,
                n_analyzed: row.get(4)?,
            })
        })?;
        study.arms = arms.collect::<rusqlite::Result<Vec<_>>>()?;
    }
    Ok(found.into_iter().map(StructuredRecord::Study).collect())
}

fn documents(conn: &Connection, ids: &[DocumentId]) -> rusqlite::Result<Vec<Document>> {
    let placeholders = vec!["?"; ids.len()].join(", ");
    let sql = format!(
        "SELECT document_id, title, authors, year, journal, doi, registry_id \
         FROM documents WHERE document_id IN ({placeholders})"
    );
    let params: Vec<Box<dyn ToSql>> = ids.iter().map(|id| Box::new(id.clone()) as Box<dyn ToSql>).collect();
    run_query(conn, &sql, &params, |row| {
        let authors: Option<String> = row.get(2)?;
        Ok(Document {
            id: row.get(0)?,
            title: row.get(1)?,
            authors: authors.and_then(|a| serde_json::from_str(&a).ok()).unwrap_or_default(),
            year: row.get(3)?,
            journal: row.get(4)?,
            doi: row.get(5)?,
            registry_id: row.get(6)?,
        })
    })
}

#[async_trait]
impl StructuredSource for SqliteStore {
    async fn search_structured(&self, query: &str, hint: Option<&Intent>, k: usize) -> Result<Vec<ScoredResult>> {
        let Some(intent) = hint.cloned().or_else(|| self.recognizer.recognize(query)) else {
            debug!("no structured intent");
            return Ok(Vec::new());
        };
        if k == 0 {
            return Ok(Vec::new());
        }
        let this = self.clone();
        let for_query = intent.clone();
        let records = tokio::task::spawn_blocking(move || this.records_for(&for_query, k))
            .await
            .map_err(|e| Error::unavailable(SourceKind::Structured, e))?
            .map_err(|e| Error::unavailable(SourceKind::Structured, e))?;
        debug!(?intent, count = records.len(), "structured search");
        Ok(records.into_iter().map(ScoredResult::record).collect())
    }
}

#[async_trait]
impl DocumentCatalog for SqliteStore {
    async fn documents(&self, ids: &[DocumentId]) -> Result<HashMap<DocumentId, Document>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let this = self.clone();
        let ids = ids.to_vec();
        let docs = tokio::task::spawn_blocking(move || this.with_conn(|conn| documents(conn, &ids)))
            .await
            .map_err(|e| Error::Operation(e.to_string()))?
            .map_err(|e| Error::Operation(format!("document lookup failed: {e}")))?;
        Ok(docs.into_iter().map(|d| (d.id.clone(), d)).collect())
    }
}
