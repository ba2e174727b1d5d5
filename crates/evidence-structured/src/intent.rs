//! Keyword intent recognition for structured queries.
//!
//! Precedence when several vocabularies match: adverse event rate, then
//! outcome value, then intervention studies. First match wins.
use regex::Regex;
use std::sync::LazyLock;

use evidence_core::types::Intent;

/// Specific adverse events: canonical term and the phrases that name it.
const ADVERSE_EVENTS: &[(&str, &[&str])] = &[
    ("pneumothorax", &["pneumothorax", "pneumothoraces"]),
    ("exacerbation", &["exacerbation", "exacerbations"]),
    ("hemoptysis", &["hemoptysis", "haemoptysis"]),
    ("pneumonia", &["pneumonia"]),
    ("respiratory failure", &["respiratory failure"]),
    ("death", &["mortality", "death", "deaths"]),
];

const ADVERSE_GENERIC: &[&str] = &[
    "adverse", "safety", "complication", "complications", "side effect", "side effects",
];

/// Outcome concepts: concept id and the phrases that name it.
const OUTCOME_CONCEPTS: &[(&str, &[&str])] = &[
    ("fev1", &["fev1", "fev 1", "forced expiratory volume"]),
    ("6mwd", &["6mwd", "6mwt", "6-minute walk", "6 minute walk", "six-minute walk", "six minute walk"]),
    ("sgrq", &["sgrq", "st george", "st georges", "st george's"]),
    ("rv", &["residual volume", "rv"]),
    ("mmrc", &["mmrc", "dyspnea", "dyspnoea"]),
];

const OUTCOME_GENERIC: &[&str] = &[
    "outcome", "outcomes", "improvement", "improvements", "improve", "improved", "lung function", "efficacy",
];

/// Intervention phrases and the term used to match study titles and arm names.
const INTERVENTIONS: &[(&str, &str)] = &[
    ("zephyr", "zephyr"),
    ("spiration", "spiration"),
    ("endobronchial valve", "valve"),
    ("endobronchial valves", "valve"),
    ("ebv", "valve"),
    ("valve", "valve"),
    ("valves", "valve"),
    ("coil", "coil"),
    ("coils", "coil"),
    ("vapor", "vapor"),
    ("vapour", "vapor"),
    ("blvr", "lung volume reduction"),
    ("lung volume reduction", "lung volume reduction"),
];

static TIMEPOINT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s*-?\s*(days?|weeks?|wks?|months?|mos?|years?|yrs?)\b").ok()
});

/// Keyword-based intent recognition over the fixed lexicons.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentRecognizer;

impl IntentRecognizer {
    pub fn recognize(&self, query: &str) -> Option<Intent> {
        recognize(query)
    }
}

/// Lowercases, turns punctuation other than `-` and `'` into spaces and pads
/// with spaces so phrases can be matched on word boundaries.
fn normalize(query: &str) -> String {
    let cleaned: String = query
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '\'' { c } else { ' ' })
        .collect();
    format!(" {} ", cleaned.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn has_phrase(normalized: &str, phrase: &str) -> bool {
    normalized.contains(&format!(" {phrase} "))
}

fn find_named<'a>(normalized: &str, table: &'a [(&'a str, &'a [&'a str])]) -> Option<&'a str> {
    table
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| has_phrase(normalized, p)))
        .map(|(canonical, _)| *canonical)
}

fn find_intervention(normalized: &str) -> Option<&'static str> {
    INTERVENTIONS.iter().find(|(phrase, _)| has_phrase(normalized, phrase)).map(|(_, term)| *term)
}

/// Converts the first duration mention ("at 12 months", "45-day") to ISO-8601.
pub fn extract_timepoint(query: &str) -> Option<String> {
    let re = TIMEPOINT.as_ref()?;
    let lowered = query.to_lowercase();
    let caps = re.captures(&lowered)?;
    let n: u32 = caps.get(1)?.as_str().parse().ok()?;
    let unit = match caps.get(2)?.as_str().chars().next()? {
        'd' => 'D',
        'w' => 'W',
        'm' => 'M',
        'y' => 'Y',
        _ => return None,
    };
    Some(format!("P{n}{unit}"))
}

pub fn recognize(query: &str) -> Option<Intent> {
    let normalized = normalize(query);

    let event = find_named(&normalized, ADVERSE_EVENTS);
    if event.is_some() || ADVERSE_GENERIC.iter().any(|p| has_phrase(&normalized, p)) {
        return Some(Intent::AdverseEventRate {
            term: event.map(str::to_string),
            intervention: find_intervention(&normalized).map(str::to_string),
        });
    }

    let concept = find_named(&normalized, OUTCOME_CONCEPTS);
    if concept.is_some() || OUTCOME_GENERIC.iter().any(|p| has_phrase(&normalized, p)) {
        return Some(Intent::OutcomeValue { concept: concept.map(str::to_string), timepoint: extract_timepoint(query) });
    }

    find_intervention(&normalized).map(|i| Intent::InterventionStudies { intervention: i.to_string() })
}
