//! Ranked search shared by history, memory, and tool-name lookups.
//!
//! A single BM25 scorer (`bm25`) is built once per query against whatever
//! slice of documents the caller hands it; `arc-history::find`,
//! `arc-memory::find`, and `arc-registry`'s `find_tools` all go through
//! this crate rather than each rolling their own relevance ranking.

pub mod bm25;

use regex::{Regex, RegexBuilder};

/// Something rankable by `search`: a set of weighted text fields.
/// Implementors are typically thin borrowing wrappers built just for the
/// duration of a query, not the domain types themselves.
pub trait Document {
    /// `(field_name, field_text, field_weight)` triples.
    fn fields(&self) -> Vec<(&str, &str, f32)>;
}

/// How a query string is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    /// Tokenized BM25 ranking (the default).
    Hybrid,
    /// Case-insensitive substring match, unranked (insertion order).
    Literal,
    /// Case-insensitive regex match against the concatenation of a
    /// document's fields.
    Regex,
}

/// One ranked (or matched) result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub index: usize,
    pub score: f32,
}

/// Lowercase, word-run tokenizer shared by indexing and querying. A word
/// character is `[A-Za-z0-9_]`, so `project_name` tokenizes as one term.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

/// Truncate `text` to at most `max_chars`, appending an ellipsis marker
/// when truncated, for building result previews.
pub fn truncate_preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut preview: String = text.chars().take(max_chars).collect();
    preview.push('\u{2026}');
    preview
}

/// Compile `pattern` case-insensitively; a malformed pattern degrades to
/// a literal-escaped match on the same text rather than an error
/// (spec-mandated: regex compile failure never surfaces to the caller).
fn compile_lenient(pattern: &str) -> Regex {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .unwrap_or_else(|_| {
            RegexBuilder::new(&regex::escape(pattern))
                .case_insensitive(true)
                .build()
                .expect("escaped pattern always compiles")
        })
}

fn joined_fields<D: Document>(doc: &D) -> String {
    doc.fields().into_iter().map(|(_, text, _)| text).collect::<Vec<_>>().join(" ")
}

/// Search `docs` with `query` under `mode`, returning at most `limit`
/// hits ordered best-first (for `Literal`/`Regex`, in document order).
/// `regex_filter`, when present, acts as a conjunctive post-filter in
/// every mode: a document must also match it to be returned.
pub fn search<D: Document>(
    docs: &[D],
    query: &str,
    mode: SearchMode,
    limit: usize,
    regex_filter: Option<&str>,
) -> Vec<Hit> {
    let prefilter_limit = if regex_filter.is_some() { docs.len() } else { limit };
    let mut hits = match mode {
        SearchMode::Hybrid => hybrid_search(docs, query, prefilter_limit),
        SearchMode::Literal => literal_search(docs, query, prefilter_limit),
        SearchMode::Regex => regex_search(docs, query, prefilter_limit),
    };
    if let Some(pattern) = regex_filter {
        let re = compile_lenient(pattern);
        hits.retain(|hit| docs.get(hit.index).map(|doc| re.is_match(&joined_fields(doc))).unwrap_or(false));
        hits.truncate(limit);
    }
    hits
}

fn hybrid_search<D: Document>(docs: &[D], query: &str, limit: usize) -> Vec<Hit> {
    let mut hits = bm25::Index::build(docs).search(query, limit);
    let tokens = tokenize(query);
    if tokens.len() == 1 {
        let needle = tokens[0].clone();
        let scored: std::collections::HashSet<usize> = hits.iter().map(|h| h.index).collect();
        for (index, doc) in docs.iter().enumerate() {
            if hits.len() >= limit || scored.contains(&index) {
                continue;
            }
            if joined_fields(doc).to_lowercase().contains(&needle) {
                hits.push(Hit { index, score: 0.0 });
            }
        }
    }
    hits
}

fn literal_search<D: Document>(docs: &[D], query: &str, limit: usize) -> Vec<Hit> {
    let needle = query.to_lowercase();
    let mut hits = Vec::new();
    for (index, doc) in docs.iter().enumerate() {
        if needle.is_empty() || joined_fields(doc).to_lowercase().contains(&needle) {
            hits.push(Hit { index, score: 0.0 });
            if hits.len() >= limit {
                break;
            }
        }
    }
    hits
}

fn regex_search<D: Document>(docs: &[D], pattern: &str, limit: usize) -> Vec<Hit> {
    let re = compile_lenient(pattern);
    let mut hits = Vec::new();
    for (index, doc) in docs.iter().enumerate() {
        if re.is_match(&joined_fields(doc)) {
            hits.push(Hit { index, score: 0.0 });
            if hits.len() >= limit {
                break;
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doc(String);
    impl Document for Doc {
        fn fields(&self) -> Vec<(&str, &str, f32)> {
            vec![("text", self.0.as_str(), 1.0)]
        }
    }

    #[test]
    fn tokenize_lowercases_and_splits_on_punctuation() {
        assert_eq!(
            tokenize("Read src/main.rs, then edit it!"),
            vec!["read", "src", "main", "rs", "then", "edit", "it"]
        );
    }

    #[test]
    fn tokenize_keeps_underscore_joined_identifiers_as_one_token() {
        assert_eq!(tokenize("the project_name field"), vec!["the", "project_name", "field"]);
    }

    #[test]
    fn truncate_preview_respects_char_count() {
        assert_eq!(truncate_preview("hello", 10), "hello");
        assert_eq!(truncate_preview("hello world", 5), "hello\u{2026}");
    }

    #[test]
    fn literal_search_is_case_insensitive() {
        let docs = vec![Doc("Fix the PARSER bug".into()), Doc("unrelated text".into())];
        let hits = search(&docs, "parser", SearchMode::Literal, 10, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn literal_search_empty_query_matches_everything() {
        let docs = vec![Doc("a".into()), Doc("b".into())];
        let hits = search(&docs, "", SearchMode::Literal, 10, None);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn hybrid_rescues_single_token_zero_score_substring_match() {
        // "needle" never appears as its own BM25 token (it's embedded in one
        // long contiguous word), so it scores 0 and must be rescued by the
        // substring fallback rather than excluded.
        let docs = vec![
            Doc("supercalifragilisticneedleexpialidocious".into()),
            Doc("nothing relevant here".into()),
        ];
        let hits = search(&docs, "needle", SearchMode::Hybrid, 10, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn regex_search_matches_pattern_case_insensitively() {
        let docs = vec![Doc("TURN-042".into()), Doc("no digits here".into())];
        let hits = search(&docs, r"turn-\d+", SearchMode::Regex, 10, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn regex_search_invalid_pattern_falls_back_to_literal_escaped_match() {
        let docs = vec![Doc("contains (unclosed literally".into()), Doc("nothing relevant".into())];
        let hits = search(&docs, "(unclosed", SearchMode::Regex, 10, None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn regex_post_filter_is_conjunctive_with_hybrid_mode() {
        let docs = vec![Doc("parser bugfix in turn-042".into()), Doc("parser bugfix in turn-099".into())];
        let hits = search(&docs, "parser", SearchMode::Hybrid, 10, Some(r"turn-042"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn malformed_regex_post_filter_falls_back_to_literal_escaped() {
        let docs = vec![Doc("contains (unclosed literally".into()), Doc("nothing relevant".into())];
        let hits = search(&docs, "", SearchMode::Literal, 10, Some("(unclosed"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].index, 0);
    }
}
