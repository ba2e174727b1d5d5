use std::path::Path;

use async_trait::async_trait;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::{DocAddress, Index, IndexReader, ReloadPolicy, Score, Searcher, TantivyDocument, Term};
use tracing::debug;

use evidence_core::error::{Error, Result};
use evidence_core::traits::LexicalIndex;
use evidence_core::types::{RawScore, ScoredResult, SourceKind};

use crate::query::tokenize_query;
use crate::tantivy_utils::register_tokenizer;

/// Read-only BM25 search over a prebuilt chunk index.
#[derive(Clone)]
pub struct TantivyLexicalIndex {
	index: Index,
	reader: IndexReader,
	id_field: Field,
	text_field: Field,
}

impl TantivyLexicalIndex {
	pub fn open(index_dir: &Path) -> anyhow::Result<Self> {
		let index = Index::open_in_dir(index_dir)?;
		Self::from_index(index)
	}

	pub fn from_index(index: Index) -> anyhow::Result<Self> {
		register_tokenizer(&index)?;
		let schema = index.schema();
		let id_field = schema.get_field("id")?;
		let text_field = schema.get_field("text")?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		Ok(Self { index, reader, id_field, text_field })
	}

	/// Runs a query token through the analyzer the `text` field was indexed
	/// with. May yield zero terms (stopword) or several.
	fn analyze(&self, token: &str) -> Vec<String> {
		let mut out = Vec::new();
		match self.index.tokenizer_for_field(self.text_field) {
			Ok(mut analyzer) => {
				let mut stream = analyzer.token_stream(token);
				stream.process(&mut |t| out.push(t.text.clone()));
			}
			Err(_) => out.push(token.to_string()),
		}
		out
	}

	/// Widens the window until every doc tied with the k-th score is inside
	/// it, so the id tie-break sees all of them rather than whichever ones
	/// come first by doc address.
	fn fetch_past_ties(&self, searcher: &Searcher, query: &dyn Query, k: usize) -> tantivy::Result<Vec<(Score, DocAddress)>> {
		let mut limit = k.saturating_mul(2).max(1);
		loop {
			let top_docs = searcher.search(query, &TopDocs::with_limit(limit))?;
			let exhausted = top_docs.len() < limit;
			let past_ties = match (top_docs.get(k.saturating_sub(1)), top_docs.last()) {
				(Some((kth, _)), Some((last, _))) => last < kth,
				_ => true,
			};
			if exhausted || past_ties {
				return Ok(top_docs);
			}
			debug!(limit, "lexical ties span the fetch window; widening");
			limit = limit.saturating_mul(2);
		}
	}

	fn search_blocking(&self, terms: &[String], k: usize) -> tantivy::Result<Vec<ScoredResult>> {
		if k == 0 {
			return Ok(Vec::new());
		}
		let clauses: Vec<(Occur, Box<dyn Query>)> = terms
			.iter()
			.map(|t| {
				let term = Term::from_field_text(self.text_field, t);
				(Occur::Should, Box::new(TermQuery::new(term, IndexRecordOption::WithFreqs)) as Box<dyn Query>)
			})
			.collect();
		let query = BooleanQuery::new(clauses);
		let searcher = self.reader.searcher();
		let top_docs = self.fetch_past_ties(&searcher, &query, k)?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			if let Some(id) = doc.get_first(self.id_field).and_then(|v| v.as_str()) {
				hits.push((id.to_string(), score));
			}
		}
		hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
		hits.truncate(k);
		Ok(hits.into_iter().map(|(id, score)| ScoredResult::chunk(id, RawScore::Lexical(score))).collect())
	}
}

#[async_trait]
impl LexicalIndex for TantivyLexicalIndex {
	fn tokenize(&self, query: &str) -> Vec<String> {
		let mut terms: Vec<String> = Vec::new();
		for token in tokenize_query(query) {
			for term in self.analyze(&token) {
				if !terms.contains(&term) {
					terms.push(term);
				}
			}
		}
		terms
	}

	async fn search_terms(&self, terms: &[String], k: usize) -> Result<Vec<ScoredResult>> {
		if terms.is_empty() || k == 0 {
			return Ok(Vec::new());
		}
		let this = self.clone();
		let terms = terms.to_vec();
		let hits = tokio::task::spawn_blocking(move || this.search_blocking(&terms, k))
			.await
			.map_err(|e| Error::unavailable(SourceKind::Lexical, e))?
			.map_err(|e| Error::unavailable(SourceKind::Lexical, e))?;
		debug!(count = hits.len(), k, "lexical search");
		Ok(hits)
	}
}
