//! Score fusion: per-list normalization, weighted composite, provenance
//! dedup and deterministic ordering. Pure; the same inputs always produce
//! the same ranked list.
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use tracing::warn;

use evidence_core::config::FusionWeights;
use evidence_core::error::Result;
use evidence_core::types::{
    Chunk, ChunkId, FusedResult, ResultKind, ScoreRange, ScoredResult, SourceKind, SourceScores, StructuredRecord,
};

/// Results one source returned for one query.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateList {
    pub source: SourceKind,
    pub results: Vec<ScoredResult>,
}

impl CandidateList {
    pub fn new(source: SourceKind, results: Vec<ScoredResult>) -> Self {
        Self { source, results }
    }
}

#[derive(Default)]
struct Candidate {
    scores: SourceScores,
    record: Option<StructuredRecord>,
}

/// Union of all lists keyed by id, each source score being the maximum
/// normalized score the id received from that source.
fn collect(lists: &[CandidateList]) -> BTreeMap<String, Candidate> {
    let mut by_id: BTreeMap<String, Candidate> = BTreeMap::new();
    for list in lists {
        let Some(range) = ScoreRange::of(list.results.iter().map(|r| &r.score)) else {
            continue;
        };
        for r in &list.results {
            let entry = by_id.entry(r.id.clone()).or_default();
            entry.scores.offer(r.source(), r.score.normalize(&range));
            if entry.record.is_none() {
                entry.record.clone_from(&r.record);
            }
        }
    }
    by_id
}

fn chunk_row(chunk: &Chunk, scores: SourceScores) -> FusedResult {
    FusedResult {
        id: chunk.id.clone(),
        kind: ResultKind::Chunk,
        provenance: chunk.provenance(),
        text: chunk.text.clone(),
        scores,
        composite: 0.0,
        structured_match: false,
        records: Vec::new(),
        citation: None,
    }
}

fn record_row(id: String, record: StructuredRecord, scores: SourceScores) -> FusedResult {
    FusedResult {
        id,
        kind: ResultKind::Record,
        provenance: record.provenance(),
        text: record.summary(),
        scores,
        composite: 0.0,
        structured_match: true,
        records: vec![record],
        citation: None,
    }
}

/// Composite descending, structured match first, id ascending.
pub fn rank_order(a: &FusedResult, b: &FusedResult) -> Ordering {
    b.composite
        .total_cmp(&a.composite)
        .then_with(|| b.structured_match.cmp(&a.structured_match))
        .then_with(|| a.id.cmp(&b.id))
}

/// Fuses candidate lists into at most `limit` ranked rows.
///
/// `chunks` holds the hydrated chunks; chunk candidates missing from it are
/// dropped. Fails only on invalid `weights`.
pub fn fuse(
    lists: &[CandidateList],
    chunks: &HashMap<ChunkId, Chunk>,
    weights: &FusionWeights,
    limit: usize,
) -> Result<Vec<FusedResult>> {
    let weights = weights.normalized()?;

    let mut chunk_rows: Vec<FusedResult> = Vec::new();
    let mut record_rows: Vec<FusedResult> = Vec::new();
    for (id, candidate) in collect(lists) {
        match candidate.record {
            Some(record) => record_rows.push(record_row(id, record, candidate.scores)),
            None => match chunks.get(&id) {
                Some(chunk) => chunk_rows.push(chunk_row(chunk, candidate.scores)),
                None => warn!(chunk_id = %id, "dropping candidate missing from chunk store"),
            },
        }
    }

    let pre_merge: Vec<f64> = chunk_rows.iter().map(|r| weights.composite(&r.scores)).collect();
    let mut fused: Vec<FusedResult> = Vec::with_capacity(chunk_rows.len() + record_rows.len());
    for row in record_rows {
        // Rows are sorted by id already, so the first maximum is the lowest id.
        let target = chunk_rows
            .iter()
            .enumerate()
            .filter(|(_, c)| c.provenance.overlaps(&row.provenance))
            .fold(None::<usize>, |best, (i, _)| match best {
                Some(b) if pre_merge[b] >= pre_merge[i] => Some(b),
                _ => Some(i),
            });
        match target {
            Some(i) => {
                let chunk = &mut chunk_rows[i];
                chunk.scores.merge(&row.scores);
                chunk.records.extend(row.records);
                chunk.structured_match = true;
            }
            None => fused.push(row),
        }
    }
    fused.extend(chunk_rows);

    for row in &mut fused {
        row.composite = weights.composite(&row.scores);
    }
    fused.sort_by(rank_order);
    fused.truncate(limit);
    Ok(fused)
}
