//! Okapi BM25 scoring over weighted multi-field documents.

use std::collections::HashMap;

use crate::{tokenize, Document, Hit};

const K1: f32 = 1.5;
const B: f32 = 0.75;

/// An inverted index built once per query over a borrowed document slice.
pub struct Index {
    n_docs: usize,
    avg_len: f32,
    /// Per-document weighted field length (sum of token count * weight).
    doc_len: Vec<f32>,
    /// Per-document weighted term frequency.
    doc_term_freq: Vec<HashMap<String, f32>>,
    /// Number of documents each term appears in.
    doc_freq: HashMap<String, usize>,
}

impl Index {
    pub fn build<D: Document>(docs: &[D]) -> Self {
        let mut doc_len = Vec::with_capacity(docs.len());
        let mut doc_term_freq = Vec::with_capacity(docs.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();

        for doc in docs {
            let mut term_freq: HashMap<String, f32> = HashMap::new();
            let mut len = 0.0f32;
            for (_, text, weight) in doc.fields() {
                for token in tokenize(text) {
                    *term_freq.entry(token).or_insert(0.0) += weight;
                    len += weight;
                }
            }
            for term in term_freq.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            doc_len.push(len);
            doc_term_freq.push(term_freq);
        }

        let n_docs = docs.len();
        let avg_len = if n_docs == 0 {
            0.0
        } else {
            doc_len.iter().sum::<f32>() / n_docs as f32
        };

        Self {
            n_docs,
            avg_len,
            doc_len,
            doc_term_freq,
            doc_freq,
        }
    }

    fn idf(&self, term: &str) -> f32 {
        let df = *self.doc_freq.get(term).unwrap_or(&0) as f32;
        let n = self.n_docs as f32;
        (1.0 + (n - df + 0.5) / (df + 0.5)).ln()
    }

    pub fn search(&self, query: &str, limit: usize) -> Vec<Hit> {
        if self.n_docs == 0 {
            return Vec::new();
        }
        let mut query_counts: HashMap<String, u32> = HashMap::new();
        for token in tokenize(query) {
            *query_counts.entry(token).or_insert(0) += 1;
        }
        if query_counts.is_empty() {
            // An explicit empty query matches everything, in original order.
            let mut hits: Vec<Hit> = (0..self.n_docs).map(|index| Hit { index, score: 0.0 }).collect();
            hits.truncate(limit);
            return hits;
        }

        let mut scored: Vec<Hit> = Vec::new();
        for index in 0..self.n_docs {
            let len = self.doc_len[index];
            let denom_len_norm = 1.0 - B + B * (len / self.avg_len.max(1.0));
            let mut score = 0.0f32;
            for (term, &qtf) in &query_counts {
                let tf = *self.doc_term_freq[index].get(term).unwrap_or(&0.0);
                if tf == 0.0 {
                    continue;
                }
                let idf = self.idf(term);
                let term_score = idf * (tf * (K1 + 1.0)) / (tf + K1 * denom_len_norm);
                let repetition = 1.0 + (qtf as f32).ln();
                score += term_score * repetition;
            }
            if score > 0.0 {
                scored.push(Hit { index, score });
            }
        }

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Doc {
        title: String,
        body: String,
    }
    impl Document for Doc {
        fn fields(&self) -> Vec<(&str, &str, f32)> {
            vec![("title", self.title.as_str(), 3.0), ("body", self.body.as_str(), 1.0)]
        }
    }

    #[test]
    fn ranks_more_relevant_document_first() {
        let docs = vec![
            Doc {
                title: "parser bugfix".into(),
                body: "fixed an edge case in the tokenizer".into(),
            },
            Doc {
                title: "unrelated refactor".into(),
                body: "renamed some variables, no parser changes".into(),
            },
        ];
        let hits = Index::build(&docs).search("parser", 10);
        assert_eq!(hits[0].index, 0);
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn field_weight_boosts_title_matches() {
        let docs = vec![
            Doc {
                title: "memory leak".into(),
                body: "irrelevant".into(),
            },
            Doc {
                title: "irrelevant".into(),
                body: "memory leak discussed here".into(),
            },
        ];
        let hits = Index::build(&docs).search("memory leak", 10);
        assert_eq!(hits[0].index, 0);
    }

    #[test]
    fn empty_query_matches_every_document_in_original_order() {
        let docs = vec![
            Doc {
                title: "x".into(),
                body: "y".into(),
            },
            Doc {
                title: "a".into(),
                body: "b".into(),
            },
        ];
        let hits = Index::build(&docs).search("   ", 10);
        assert_eq!(hits.iter().map(|h| h.index).collect::<Vec<_>>(), vec![0, 1]);
        assert!(hits.iter().all(|h| h.score == 0.0));
    }

    #[test]
    fn empty_corpus_returns_no_hits() {
        let docs: Vec<Doc> = vec![];
        assert!(Index::build(&docs).search("anything", 10).is_empty());
    }

    #[test]
    fn repeated_query_terms_increase_score() {
        let docs = vec![Doc {
            title: "rust rust rust".into(),
            body: String::new(),
        }];
        let single = Index::build(&docs).search("rust", 10)[0].score;
        let repeated = Index::build(&docs).search("rust rust", 10)[0].score;
        assert!(repeated > single);
    }
}
