//! Domain types shared by the retrieval adapters and the hybrid ranker.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = String;
pub type DocumentId = String;
pub type RecordId = String;

/// A source publication. Owned by the corpus; chunks and records refer to it
/// by `id` only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    /// Ordered as printed on the publication.
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub journal: Option<String>,
    pub doi: Option<String>,
    /// Trial registry identifier, e.g. an NCT number.
    pub registry_id: Option<String>,
}

/// A retrievable unit of text.
///
/// - `id`: unique within the corpus
/// - `document_id`: the single owning document
/// - `pages`/`paragraph_index`/`table_ref`/`figure_ref`: provenance inside the document
/// - `embedding`: fixed-length vector; its length is the index dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub pages: Vec<u32>,
    pub paragraph_index: u32,
    pub table_ref: Option<String>,
    pub figure_ref: Option<String>,
    pub section: Option<String>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
}

impl Chunk {
    pub fn provenance(&self) -> Provenance {
        Provenance {
            document_id: self.document_id.clone(),
            pages: self.pages.clone(),
            paragraph_index: Some(self.paragraph_index),
            table_ref: self.table_ref.clone(),
            figure_ref: self.figure_ref.clone(),
        }
    }
}

/// The page/paragraph/table/figure trail linking a result to its document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub document_id: DocumentId,
    pub pages: Vec<u32>,
    pub paragraph_index: Option<u32>,
    pub table_ref: Option<String>,
    pub figure_ref: Option<String>,
}

impl Provenance {
    /// Same document and either a shared page or the same table reference.
    pub fn overlaps(&self, other: &Provenance) -> bool {
        if self.document_id != other.document_id {
            return false;
        }
        let shared_page = self.pages.iter().any(|p| other.pages.contains(p));
        let same_table = match (&self.table_ref, &other.table_ref) {
            (Some(a), Some(b)) => normalize_ref(a) == normalize_ref(b),
            _ => false,
        };
        shared_page || same_table
    }
}

fn normalize_ref(r: &str) -> String {
    r.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Indicates which retrieval mechanism produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Dense,
    Lexical,
    Structured,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Dense, SourceKind::Lexical, SourceKind::Structured];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Dense => "dense",
            SourceKind::Lexical => "lexical",
            SourceKind::Structured => "structured",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounds of the raw scores one source returned for one query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreRange {
    pub min: f64,
    pub max: f64,
}

impl ScoreRange {
    /// `None` for an empty list.
    pub fn of<'a>(scores: impl IntoIterator<Item = &'a RawScore>) -> Option<Self> {
        let mut range: Option<Self> = None;
        for s in scores {
            let v = s.value();
            range = Some(match range {
                None => Self { min: v, max: v },
                Some(r) => Self { min: r.min.min(v), max: r.max.max(v) },
            });
        }
        range
    }
}

/// A raw score on the scale of the source that produced it.
///
/// Dense similarity is bounded but implementation-specific, lexical relevance
/// is unbounded above, structured matches carry no score at all. All three go
/// through [`RawScore::normalize`] before fusion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "value", rename_all = "lowercase")]
pub enum RawScore {
    Dense(f32),
    Lexical(f32),
    Structured,
}

impl RawScore {
    pub fn kind(&self) -> SourceKind {
        match self {
            RawScore::Dense(_) => SourceKind::Dense,
            RawScore::Lexical(_) => SourceKind::Lexical,
            RawScore::Structured => SourceKind::Structured,
        }
    }

    pub fn value(&self) -> f64 {
        match self {
            RawScore::Dense(v) | RawScore::Lexical(v) => f64::from(*v),
            RawScore::Structured => 1.0,
        }
    }

    /// Min-max normalize into [0, 1] against the range of the list this score
    /// came from. A degenerate range (one candidate, or all equal) maps to 1.0;
    /// structured matches are always 1.0.
    pub fn normalize(&self, range: &ScoreRange) -> f64 {
        match self {
            RawScore::Structured => 1.0,
            RawScore::Dense(_) | RawScore::Lexical(_) => {
                let span = range.max - range.min;
                if !span.is_finite() || span <= f64::EPSILON {
                    return 1.0;
                }
                ((self.value() - range.min) / span).clamp(0.0, 1.0)
            }
        }
    }
}

/// Retrieval depth requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Single query, few results.
    #[default]
    Fast,
    /// More candidates per source, more results, and query reformulations
    /// fused together.
    Depth,
}

impl SearchMode {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchMode::Fast => "fast",
            SearchMode::Depth => "depth",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured query intent. Recognized from query text by the structured
/// adapter, or supplied by the caller as an explicit hint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    AdverseEventRate { term: Option<String>, intervention: Option<String> },
    /// `concept` is `None` for generic outcome questions ("which outcomes
    /// improved"); `timepoint` is an ISO-8601 duration.
    OutcomeValue { concept: Option<String>, timepoint: Option<String> },
    InterventionStudies { intervention: String },
}

/// One candidate from exactly one adapter. Lives for one query only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: String,
    pub score: RawScore,
    /// Present for structured hits; dense and lexical hits are chunk ids.
    pub record: Option<StructuredRecord>,
}

impl ScoredResult {
    pub fn chunk(id: impl Into<String>, score: RawScore) -> Self {
        Self { id: id.into(), score, record: None }
    }

    pub fn record(record: StructuredRecord) -> Self {
        Self { id: record.id(), score: RawScore::Structured, record: Some(record) }
    }

    pub fn source(&self) -> SourceKind {
        self.score.kind()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arm {
    pub study_id: String,
    pub arm_id: String,
    pub name: String,
    pub n_randomized: Option<u32>,
    pub n_analyzed: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudyRecord {
    pub study_id: String,
    pub document_id: DocumentId,
    pub title: String,
    pub year: Option<i32>,
    pub registry_id: Option<String>,
    pub arms: Vec<Arm>,
}

/// Unique on `(study_id, concept_id, measure, timepoint)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub study_id: String,
    pub document_id: DocumentId,
    pub concept_id: String,
    pub name: String,
    pub measure: String,
    /// ISO-8601 duration, e.g. `P12M`.
    pub timepoint: String,
    pub estimate: Option<f64>,
    pub ci_lower: Option<f64>,
    pub ci_upper: Option<f64>,
    pub p_value: Option<f64>,
    pub unit: Option<String>,
    pub pages: Vec<u32>,
    pub table_ref: Option<String>,
}

/// Unique on `(study_id, term, period, arm_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyEvent {
    pub study_id: String,
    pub document_id: DocumentId,
    pub term: String,
    pub period: String,
    pub arm_id: String,
    pub arm_name: Option<String>,
    pub patients: Option<u32>,
    pub events: Option<u32>,
    pub percentage: Option<f64>,
    pub pages: Vec<u32>,
}

/// A normalized relational fact returned by the structured adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructuredRecord {
    Study(StudyRecord),
    Outcome(OutcomeRecord),
    Safety(SafetyEvent),
}

impl StructuredRecord {
    /// Derived from the record's unique key, so ids never collide.
    pub fn id(&self) -> RecordId {
        match self {
            StructuredRecord::Study(s) => format!("study:{}", s.study_id),
            StructuredRecord::Outcome(o) => {
                format!("outcome:{}:{}:{}:{}", o.study_id, o.concept_id, o.measure, o.timepoint)
            }
            StructuredRecord::Safety(e) => {
                format!("safety:{}:{}:{}:{}", e.study_id, e.term, e.period, e.arm_id)
            }
        }
    }

    pub fn document_id(&self) -> &str {
        match self {
            StructuredRecord::Study(s) => &s.document_id,
            StructuredRecord::Outcome(o) => &o.document_id,
            StructuredRecord::Safety(e) => &e.document_id,
        }
    }

    pub fn provenance(&self) -> Provenance {
        match self {
            StructuredRecord::Study(s) => Provenance { document_id: s.document_id.clone(), ..Provenance::default() },
            StructuredRecord::Outcome(o) => Provenance {
                document_id: o.document_id.clone(),
                pages: o.pages.clone(),
                table_ref: o.table_ref.clone(),
                ..Provenance::default()
            },
            StructuredRecord::Safety(e) => Provenance {
                document_id: e.document_id.clone(),
                pages: e.pages.clone(),
                ..Provenance::default()
            },
        }
    }

    /// One-line English rendering used as the text of a record-only result.
    pub fn summary(&self) -> String {
        match self {
            StructuredRecord::Study(s) => {
                let mut out = s.title.clone();
                if let Some(y) = s.year {
                    out.push_str(&format!(" ({y})"));
                }
                if !s.arms.is_empty() {
                    let arms: Vec<String> = s
                        .arms
                        .iter()
                        .map(|a| match a.n_randomized {
                            Some(n) => format!("{} (n={n})", a.name),
                            None => a.name.clone(),
                        })
                        .collect();
                    out.push_str(&format!("; arms: {}", arms.join(", ")));
                }
                out
            }
            StructuredRecord::Outcome(o) => {
                let mut out = format!("{} ({}, {})", o.name, o.measure, o.timepoint);
                if let Some(est) = o.estimate {
                    out.push_str(&format!(": {est}"));
                    if let Some(unit) = &o.unit {
                        out.push_str(&format!(" {unit}"));
                    }
                    if let (Some(lo), Some(hi)) = (o.ci_lower, o.ci_upper) {
                        out.push_str(&format!(" [95% CI {lo} to {hi}]"));
                    }
                    if let Some(p) = o.p_value {
                        out.push_str(&format!(", p={p}"));
                    }
                }
                out
            }
            StructuredRecord::Safety(e) => {
                let arm = e.arm_name.as_deref().unwrap_or(&e.arm_id);
                let mut out = format!("{} ({}, arm {arm})", e.term, e.period);
                let mut parts = Vec::new();
                if let Some(p) = e.patients {
                    parts.push(format!("{p} patients"));
                }
                if let Some(n) = e.events {
                    parts.push(format!("{n} events"));
                }
                if !parts.is_empty() {
                    out.push_str(&format!(": {}", parts.join(", ")));
                }
                if let Some(pct) = e.percentage {
                    out.push_str(&format!(" ({pct}%)"));
                }
                out
            }
        }
    }
}

/// Per-source normalized scores of one fused row; 0 where a source did not
/// return the row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceScores {
    pub dense: f64,
    pub lexical: f64,
    pub structured: f64,
}

impl SourceScores {
    pub fn get(&self, kind: SourceKind) -> f64 {
        match kind {
            SourceKind::Dense => self.dense,
            SourceKind::Lexical => self.lexical,
            SourceKind::Structured => self.structured,
        }
    }

    /// Keeps the larger of the current and the offered score.
    pub fn offer(&mut self, kind: SourceKind, score: f64) {
        let slot = match kind {
            SourceKind::Dense => &mut self.dense,
            SourceKind::Lexical => &mut self.lexical,
            SourceKind::Structured => &mut self.structured,
        };
        if score > *slot {
            *slot = score;
        }
    }

    pub fn merge(&mut self, other: &SourceScores) {
        for kind in SourceKind::ALL {
            self.offer(kind, other.get(kind));
        }
    }
}

/// Resolved display citation for a result's document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// In-text token, e.g. `Valipour 2014`.
    pub token: String,
    /// Full bibliographic entry.
    pub entry: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Chunk,
    Record,
}

/// The unit returned to callers: one deduplicated, scored, cited row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedResult {
    pub id: String,
    pub kind: ResultKind,
    pub provenance: Provenance,
    pub text: String,
    pub scores: SourceScores,
    pub composite: f64,
    /// True when an exact structured record contributed to this row.
    pub structured_match: bool,
    pub records: Vec<StructuredRecord>,
    pub citation: Option<Citation>,
}
