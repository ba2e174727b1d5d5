//! Query-side tokenization. Matches the preprocessing the lexical corpus was
//! built with so query terms line up with indexed terms.
use regex::Regex;
use std::sync::LazyLock;

pub const STOPWORDS: &[&str] = &[
	"a", "an", "and", "are", "as", "at", "be", "been", "by", "for", "from",
	"has", "he", "in", "is", "it", "its", "of", "on", "that", "the", "to",
	"was", "will", "would", "could", "should", "may", "might", "must",
	"shall", "can", "need", "dare", "ought", "used", "have", "had", "having",
	"do", "does", "did", "doing", "done", "am", "were", "being", "get", "gets",
	"got", "getting", "gotten", "become", "becomes", "became", "becoming",
	"seem", "seems", "seemed", "seeming", "remain", "remains", "remained",
	"remaining", "keep", "keeps", "kept", "keeping", "stay", "stays", "stayed",
	"staying",
];

/// Words that look like stopwords but change the meaning of a clinical query.
pub const CLINICAL_KEEP: &[&str] = &[
	"no", "not", "with", "without", "after", "before", "during", "between",
	"versus", "vs", "compared", "than", "more", "less", "greater", "fewer",
	"increase", "decrease", "improve", "worsen", "significant", "significantly",
];

static STRIP: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"[^\w\s\-%.]").ok());

pub fn tokenize_query(text: &str) -> Vec<String> {
	let lowered = text.to_lowercase();
	let cleaned = match STRIP.as_ref() {
		Some(re) => re.replace_all(&lowered, " ").into_owned(),
		None => lowered,
	};
	cleaned
		.split_whitespace()
		.map(|t| t.trim_matches(|c: char| c == '.' || c == '-'))
		.filter(|t| CLINICAL_KEEP.contains(t) || t.chars().any(|c| c.is_ascii_digit()) || !STOPWORDS.contains(t))
		.filter(|t| t.chars().count() > 1)
		.map(str::to_string)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strip_pattern_compiles() {
		assert!(STRIP.is_some());
	}

	#[test]
	fn drops_stopwords_and_punctuation() {
		let tokens = tokenize_query("What is the rate of Pneumothorax (after EBV)?");
		assert_eq!(tokens, vec!["what", "rate", "pneumothorax", "after", "ebv"]);
	}

	#[test]
	fn keeps_clinical_words_numbers_and_symbols() {
		let tokens = tokenize_query("EBV vs coils: no change in 6MWD, FEV1 +12.5% at 12-month");
		assert_eq!(tokens, vec!["ebv", "vs", "coils", "no", "change", "6mwd", "fev1", "12.5%", "12-month"]);
	}

	#[test]
	fn drops_single_characters() {
		assert!(tokenize_query("a b c").is_empty());
		assert_eq!(tokenize_query("x ray"), vec!["ray"]);
	}
}
