use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, STORED, STRING};
use tantivy::tokenizer::{LowerCaser, RegexTokenizer, StopWordFilter, TextAnalyzer};
use tantivy::Index;

use crate::query::STOPWORDS;

pub const CLINICAL_TOKENIZER: &str = "clinical";

/// Word characters plus the `-`, `%` and `.` that carry meaning inside
/// clinical tokens (`6-minute`, `26.6%`). Sentence punctuation at either end
/// is not part of the token.
const TOKEN_PATTERN: &str = r"[\w%]+(?:[\-.][\w%]+)*";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	let _id_field = schema_builder.add_text_field("id", STRING | STORED);
	let _document_id_field = schema_builder.add_text_field("document_id", STRING | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(CLINICAL_TOKENIZER).set_index_option(IndexRecordOption::WithFreqsAndPositions);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing).set_stored();
	let _text_field = schema_builder.add_text_field("text", text_options);
	schema_builder.build()
}

/// Registers the analyzer the `text` field was indexed with. Must run on every
/// opened index before searching.
pub fn register_tokenizer(index: &Index) -> tantivy::Result<()> {
	let tokenizer = TextAnalyzer::builder(RegexTokenizer::new(TOKEN_PATTERN)?)
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOPWORDS.iter().map(|s| s.to_string())))
		.build();
	index.tokenizers().register(CLINICAL_TOKENIZER, tokenizer);
	Ok(())
}
