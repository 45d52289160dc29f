//! TF-IDF / cosine matching of free-text queries against catalog entries.
//!
//! Documents are tokenized into words of two or more characters. Term weights
//! use raw counts times the smoothed inverse document frequency
//! `ln((1 + n) / (1 + df)) + 1`, and every vector is L2-normalized, so the
//! cosine similarity is a plain dot product.

use std::collections::HashMap;

use crate::services::catalog::Catalog;
use crate::services::text::normalize;

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    /// Position of the winning entry in the catalog.
    pub index: usize,
    pub key: String,
    pub value: String,
    pub score: f64,
}

/// A service found by matching the query against service descriptions.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceMatch {
    pub service_name: String,
    pub score: f64,
}

/// A service recommended because the query resembles a known problem.
#[derive(Debug, Clone, PartialEq)]
pub struct ProblemMatch {
    pub problem: String,
    pub service_name: String,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Key,
    Value,
}

pub struct TfIdfIndex {
    vocab: HashMap<String, usize>,
    idf: Vec<f64>,
    docs: Vec<Vec<f64>>,
}

impl TfIdfIndex {
    /// Returns `None` when the documents share fewer than two distinct
    /// terms, since no meaningful ranking exists then.
    pub fn build<S: AsRef<str>>(documents: &[S]) -> Option<Self> {
        let tokenized: Vec<Vec<String>> = documents.iter().map(|d| tokenize(d.as_ref())).collect();

        let mut vocab: HashMap<String, usize> = HashMap::new();
        for tokens in &tokenized {
            for token in tokens {
                let next = vocab.len();
                vocab.entry(token.clone()).or_insert(next);
            }
        }

        if vocab.len() < 2 {
            return None;
        }

        let n_docs = tokenized.len() as f64;
        let mut df = vec![0.0f64; vocab.len()];
        for tokens in &tokenized {
            let mut seen = vec![false; vocab.len()];
            for token in tokens {
                let idx = vocab[token];
                if !seen[idx] {
                    seen[idx] = true;
                    df[idx] += 1.0;
                }
            }
        }

        let idf: Vec<f64> = df
            .iter()
            .map(|&d| ((1.0 + n_docs) / (1.0 + d)).ln() + 1.0)
            .collect();

        let mut index = TfIdfIndex {
            vocab,
            idf,
            docs: Vec::with_capacity(tokenized.len()),
        };
        index.docs = tokenized.iter().map(|t| index.weigh(t)).collect();

        Some(index)
    }

    pub fn vectorize(&self, text: &str) -> Vec<f64> {
        self.weigh(&tokenize(text))
    }

    /// Best document for the query. Ties go to the lowest index.
    pub fn rank(&self, query: &str) -> Option<(usize, f64)> {
        let q = self.vectorize(query);

        let mut best: Option<(usize, f64)> = None;
        for (i, doc) in self.docs.iter().enumerate() {
            let score = dot(&q, doc);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((i, score));
            }
        }
        best
    }

    fn weigh(&self, tokens: &[String]) -> Vec<f64> {
        let mut vec = vec![0.0f64; self.vocab.len()];
        for token in tokens {
            if let Some(&idx) = self.vocab.get(token) {
                vec[idx] += 1.0;
            }
        }
        for (v, idf) in vec.iter_mut().zip(&self.idf) {
            *v *= idf;
        }
        l2_normalize(&mut vec);
        vec
    }
}

/// Matches the query against the catalog values and returns the entry whose
/// value scores highest, provided it reaches `threshold`.
pub fn best_match(corpus: &Catalog, query: &str, threshold: f64) -> Option<Match> {
    best_match_on(corpus, query, threshold, Field::Value)
}

/// Service lookup: the query is compared with each service description.
pub fn find_service(services: &Catalog, query: &str, threshold: f64) -> Option<ServiceMatch> {
    best_match_on(services, query, threshold, Field::Value).map(|m| ServiceMatch {
        service_name: m.key,
        score: m.score,
    })
}

/// Complaint lookup: the query is compared with each problem phrase.
pub fn find_problem(problems: &Catalog, query: &str, threshold: f64) -> Option<ProblemMatch> {
    best_match_on(problems, query, threshold, Field::Key).map(|m| ProblemMatch {
        problem: m.key,
        service_name: m.value,
        score: m.score,
    })
}

fn best_match_on(corpus: &Catalog, query: &str, threshold: f64, field: Field) -> Option<Match> {
    let documents: Vec<&str> = corpus
        .entries()
        .iter()
        .map(|(k, v)| match field {
            Field::Key => k.as_str(),
            Field::Value => v.as_str(),
        })
        .collect();

    let index = TfIdfIndex::build(&documents)?;
    let (i, score) = index.rank(&normalize(query))?;

    if score < threshold {
        tracing::debug!(score, threshold, "best match below threshold");
        return None;
    }

    let (key, value) = &corpus.entries()[i];
    Some(Match {
        index: i,
        key: key.clone(),
        value: value.clone(),
        score,
    })
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .filter(|w| w.chars().count() >= 2)
        .collect()
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services() -> Catalog {
        [
            ("cambio de aceite", "reemplazo del aceite del motor y del filtro"),
            ("revision de frenos", "inspeccion de pastillas discos y liquido de frenos"),
            ("alineacion y balanceo", "ajuste de la direccion y equilibrado de llantas"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_identical_document_scores_one() {
        let corpus: Catalog = [("frenos", "pastillas y discos de freno")].into_iter().collect();
        let m = best_match(&corpus, "pastillas y discos de freno", 1.0).unwrap();
        assert_eq!(m.key, "frenos");
        assert!((m.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_below_threshold_is_no_match() {
        let corpus = services();
        assert!(best_match(&corpus, "quiero pintar mi carro", 0.2).is_none());
        // a real hit still fails an impossible threshold
        assert!(best_match(&corpus, "liquido de frenos", 1.01).is_none());
    }

    #[test]
    fn test_service_lookup_picks_description() {
        let m = find_service(&services(), "necesito cambiar las pastillas", 0.2).unwrap();
        assert_eq!(m.service_name, "revision de frenos");
        assert!(m.score >= 0.2);
    }

    #[test]
    fn test_problem_lookup_returns_recommended_service() {
        let problems: Catalog = [
            ("ruido al frenar", "revision de frenos"),
            ("el volante vibra", "alineacion y balanceo"),
        ]
        .into_iter()
        .collect();

        let m = find_problem(&problems, "Mi VOLANTE vibra mucho!", 0.2).unwrap();
        assert_eq!(m.problem, "el volante vibra");
        assert_eq!(m.service_name, "alineacion y balanceo");
    }

    #[test]
    fn test_degenerate_vocabulary_is_no_match() {
        let empty = Catalog::default();
        assert!(best_match(&empty, "frenos", 0.0).is_none());

        let one_term: Catalog = [("a", "frenos"), ("b", "frenos frenos")].into_iter().collect();
        assert!(best_match(&one_term, "frenos", 0.0).is_none());

        let short_tokens: Catalog = [("a", "x y z")].into_iter().collect();
        assert!(best_match(&short_tokens, "x", 0.0).is_none());
    }

    #[test]
    fn test_ties_resolve_to_first_entry() {
        let corpus: Catalog = [
            ("primero", "motor aceite"),
            ("segundo", "motor aceite"),
        ]
        .into_iter()
        .collect();

        for _ in 0..5 {
            let m = best_match(&corpus, "aceite", 0.1).unwrap();
            assert_eq!(m.key, "primero");
            assert_eq!(m.index, 0);
        }
    }

    #[test]
    fn test_smoothed_idf_weights() {
        let index = TfIdfIndex::build(&["motor aceite", "motor frenos"]).unwrap();
        let v = index.vectorize("aceite motor");
        // "motor" appears in both docs, so it weighs less than "aceite"
        let aceite = index.vocab["aceite"];
        let motor = index.vocab["motor"];
        assert!(v[aceite] > v[motor]);
        let expected_idf = (3.0f64 / 2.0).ln() + 1.0;
        assert!((index.idf[aceite] - expected_idf).abs() < 1e-12);
        assert!((index.idf[motor] - 1.0).abs() < 1e-12);
    }
}
