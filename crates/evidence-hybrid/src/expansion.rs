//! Query reformulation for depth mode.
use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::cache::normalize_query;

/// Produces reformulations of a query. The original query is always the
/// first element and the output holds at most `max` distinct queries
/// (at least one).
pub trait QueryExpander: Send + Sync {
    fn expand(&self, query: &str, max: usize) -> Vec<String>;
}

/// Returns the query unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExpansion;

impl QueryExpander for NoExpansion {
    fn expand(&self, query: &str, _max: usize) -> Vec<String> {
        vec![query.to_string()]
    }
}

/// Abbreviation and long form, in the order rewrites are tried.
const SYNONYMS: &[(&str, &str)] = &[
    ("BLVR", "bronchoscopic lung volume reduction"),
    ("EBV", "endobronchial valve"),
    ("FEV1", "forced expiratory volume in 1 second"),
    ("6MWD", "six-minute walk distance"),
    ("SGRQ", "St George's Respiratory Questionnaire"),
    ("RV", "residual volume"),
    ("COPD", "chronic obstructive pulmonary disease"),
    ("AE", "adverse event"),
];

struct Rule {
    short: &'static str,
    long: &'static str,
    short_re: Regex,
    long_re: Regex,
}

static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    SYNONYMS
        .iter()
        .filter_map(|(short, long)| {
            let short_re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(short))).ok()?;
            let long_re = Regex::new(&format!(r"(?i)\b{}\b", regex::escape(long))).ok()?;
            Some(Rule { short, long, short_re, long_re })
        })
        .collect()
});

/// Rewrites clinical abbreviations into their long forms and back.
///
/// Candidates in order: the original, every abbreviation expanded, every
/// long form contracted, then one rewrite per matching rule. Duplicates
/// (after case and whitespace normalization) are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct SynonymExpander;

impl SynonymExpander {
    fn candidates(query: &str) -> Vec<String> {
        let mut all_long = query.to_string();
        let mut all_short = query.to_string();
        let mut single = Vec::new();
        for rule in RULES.iter() {
            if rule.short_re.is_match(query) {
                single.push(rule.short_re.replace_all(query, rule.long).into_owned());
            }
            if rule.long_re.is_match(query) {
                single.push(rule.long_re.replace_all(query, rule.short).into_owned());
            }
            all_long = rule.short_re.replace_all(&all_long, rule.long).into_owned();
            all_short = rule.long_re.replace_all(&all_short, rule.short).into_owned();
        }
        let mut out = vec![query.to_string(), all_long, all_short];
        out.extend(single);
        out
    }
}

impl QueryExpander for SynonymExpander {
    fn expand(&self, query: &str, max: usize) -> Vec<String> {
        let max = max.max(1);
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for candidate in Self::candidates(query) {
            if out.len() == max {
                break;
            }
            if seen.insert(normalize_query(&candidate)) {
                out.push(candidate);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn abbreviations_expand_with_original_first() {
        let out = SynonymExpander.expand("BLVR pneumothorax rate", 3);
        assert_eq!(out, vec!["BLVR pneumothorax rate", "bronchoscopic lung volume reduction pneumothorax rate"]);
    }

    #[test]
    fn long_forms_contract() {
        let out = SynonymExpander.expand("residual volume after endobronchial valve", 5);
        assert_eq!(out[0], "residual volume after endobronchial valve");
        assert!(out.contains(&"RV after EBV".to_string()));
        assert!(out.contains(&"RV after endobronchial valve".to_string()));
        assert!(out.len() <= 5);
    }

    #[test]
    fn whole_words_only() {
        // "survival" contains "rv"; "AEs" is not "AE"
        assert_eq!(SynonymExpander.expand("survival AEs", 3), vec!["survival AEs"]);
    }

    #[test]
    fn max_bounds_output() {
        let out = SynonymExpander.expand("FEV1 and 6MWD in COPD", 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], "FEV1 and 6MWD in COPD");
        assert_eq!(SynonymExpander.expand("FEV1", 0), vec!["FEV1"]);
        assert_eq!(NoExpansion.expand("FEV1", 3), vec!["FEV1"]);
    }
}
