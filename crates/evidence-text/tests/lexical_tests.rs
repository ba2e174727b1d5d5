use tantivy::{doc, Index};

use evidence_core::traits::LexicalIndex;
use evidence_core::types::{RawScore, SourceKind};
use evidence_text::tantivy_utils::{build_schema, register_tokenizer};
use evidence_text::TantivyLexicalIndex;

fn build_index(docs: &[(&str, &str, &str)]) -> TantivyLexicalIndex {
	let schema = build_schema();
	let index = Index::create_in_ram(schema.clone());
	register_tokenizer(&index).unwrap();
	let id = schema.get_field("id").unwrap();
	let document_id = schema.get_field("document_id").unwrap();
	let text = schema.get_field("text").unwrap();
	let mut writer = index.writer(15_000_000).unwrap();
	for (chunk_id, doc_id, body) in docs {
		writer
			.add_document(doc!(id => *chunk_id, document_id => *doc_id, text => *body))
			.unwrap();
	}
	writer.commit().unwrap();
	TantivyLexicalIndex::from_index(index).unwrap()
}

#[tokio::test]
async fn ranks_matching_chunks_and_skips_others() {
	let idx = build_index(&[
		("c1", "d1", "Pneumothorax occurred in 26.6% of patients treated with valves."),
		("c2", "d1", "Lung function improved; FEV1 rose by 100 mL at 12 months."),
		("c3", "d2", "Quality of life was measured with the SGRQ questionnaire."),
	]);
	let terms = idx.tokenize("pneumothorax rate after valves");
	assert!(terms.contains(&"pneumothorax".to_string()));

	let hits = idx.search_terms(&terms, 10).await.unwrap();
	assert_eq!(hits.len(), 1);
	assert_eq!(hits[0].id, "c1");
	assert_eq!(hits[0].source(), SourceKind::Lexical);
	assert!(matches!(hits[0].score, RawScore::Lexical(s) if s > 0.0));
}

#[tokio::test]
async fn equal_scores_break_ties_by_id() {
	let body = "Endobronchial valve placement reduced hyperinflation.";
	let idx = build_index(&[("c9", "d1", body), ("c3", "d1", body), ("c5", "d1", body)]);
	let terms = idx.tokenize("endobronchial valve");
	let hits = idx.search_terms(&terms, 2).await.unwrap();
	let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
	assert_eq!(ids, vec!["c3", "c5"]);
}

#[tokio::test]
async fn ties_beyond_the_fetch_window_still_break_by_id() {
	let body = "Endobronchial valve placement reduced hyperinflation.";
	let idx = build_index(&[("e", "d1", body), ("d", "d1", body), ("c", "d1", body), ("b", "d1", body), ("a", "d1", body)]);
	let terms = idx.tokenize("valve");
	let hits = idx.search_terms(&terms, 1).await.unwrap();
	let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
	assert_eq!(ids, vec!["a"]);

	let ids: Vec<String> = (1..=9).rev().map(|i| format!("c{i:02}")).collect();
	let docs: Vec<(&str, &str, &str)> = ids.iter().map(|id| (id.as_str(), "d2", body)).collect();
	let idx = build_index(&docs);
	let hits = idx.search_terms(&terms, 3).await.unwrap();
	let got: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
	assert_eq!(got, vec!["c01", "c02", "c03"]);
}

#[tokio::test]
async fn stopword_only_query_returns_nothing() {
	let idx = build_index(&[("c1", "d1", "The valve was placed.")]);
	let terms = idx.tokenize("the of and");
	assert!(terms.is_empty());
	assert!(idx.search_terms(&terms, 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn analyzer_lowercases_query_terms() {
	let idx = build_index(&[("c1", "d1", "FEV1 improved by 12.5% after BLVR.")]);
	let terms = idx.tokenize("FEV1 BLVR");
	assert_eq!(terms, vec!["fev1".to_string(), "blvr".to_string()]);
	let hits = idx.search_terms(&terms, 3).await.unwrap();
	assert_eq!(hits.len(), 1);
}
