//! Citation tokens ("Surname Year") and MLA-style bibliography entries.
use evidence_core::types::{Citation, Document};

const FALLBACK_LEN: usize = 20;

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// "Last, First" yields the text before the comma, otherwise the last word.
fn surname(author: &str) -> Option<String> {
    let author = author.trim();
    let last = match author.split_once(',') {
        Some((last, _)) => last.trim(),
        None => author.split_whitespace().last().unwrap_or(""),
    };
    (!last.is_empty()).then(|| last.to_string())
}

/// Ids shaped like `Author-2014-Title` carry a surname and year.
fn token_from_id(document_id: &str) -> Option<String> {
    let mut parts = document_id.split('-');
    let author = parts.next()?.trim();
    let year = parts.next()?.trim();
    let is_year = year.len() == 4 && year.chars().all(|c| c.is_ascii_digit());
    (is_year && !author.is_empty()).then(|| format!("{author} {year}"))
}

pub fn citation_token(doc: &Document) -> String {
    let author_year = doc
        .authors
        .first()
        .and_then(|a| surname(a))
        .zip(doc.year)
        .map(|(last, year)| format!("{last} {year}"));
    if let Some(token) = author_year.or_else(|| token_from_id(&doc.id)) {
        return token;
    }
    let title = doc.title.trim();
    if !title.is_empty() {
        return truncate_chars(title, FALLBACK_LEN);
    }
    truncate_chars(&doc.id, FALLBACK_LEN)
}

pub fn mla_entry(doc: &Document) -> String {
    let mut parts: Vec<String> = Vec::new();
    match doc.authors.as_slice() {
        [] => {}
        [one] => parts.push(one.clone()),
        [first, second] => parts.push(format!("{first}, and {second}")),
        [first, ..] => parts.push(format!("{first}, et al")),
    }
    let title = doc.title.trim().trim_end_matches('.');
    if !title.is_empty() {
        parts.push(format!("\"{title}.\""));
    }
    if let Some(journal) = doc.journal.as_deref().filter(|j| !j.is_empty()) {
        parts.push(format!("*{journal}*"));
    }
    if let Some(year) = doc.year {
        parts.push(year.to_string());
    }
    if let Some(doi) = doc.doi.as_deref().filter(|d| !d.is_empty()) {
        if doi.starts_with("http") {
            parts.push(doi.to_string());
        } else {
            parts.push(format!("https://doi.org/{doi}"));
        }
    }

    let Some((first, rest)) = parts.split_first() else {
        return citation_token(doc);
    };
    let mut entry = first.clone();
    if !entry.ends_with('.') && !entry.ends_with(".\"") {
        entry.push('.');
    }
    if !rest.is_empty() {
        entry.push(' ');
        entry.push_str(&rest.join(", "));
    }
    if !entry.ends_with('.') {
        entry.push('.');
    }
    entry
}

pub fn resolve(doc: &Document) -> Citation {
    Citation { token: citation_token(doc), entry: mla_entry(doc) }
}

/// Citation for a document the catalog does not know.
pub fn unresolved(document_id: &str) -> Citation {
    let token = token_from_id(document_id).unwrap_or_else(|| truncate_chars(document_id, FALLBACK_LEN));
    Citation { entry: token.clone(), token }
}
