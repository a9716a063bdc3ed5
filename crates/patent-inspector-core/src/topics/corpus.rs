//! Bag-of-words corpus and TF-IDF weighting for the topic models.

use std::collections::{BTreeSet, HashMap};

/// Documents as sequences of term ids into a sorted vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct Corpus {
    pub vocab: Vec<String>,
    pub docs: Vec<Vec<usize>>,
}

/// Sparse `(term, weight)` rows, one per document.
pub type SparseRows = Vec<Vec<(usize, f64)>>;

impl Corpus {
    /// Lowercase and split every text on whitespace.
    pub fn from_texts<S: AsRef<str>>(texts: &[S]) -> Self {
        let tokenized: Vec<Vec<String>> = texts
            .iter()
            .map(|t| {
                t.as_ref()
                    .split_whitespace()
                    .map(|w| w.to_lowercase())
                    .collect()
            })
            .collect();

        let vocab: Vec<String> = tokenized
            .iter()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: HashMap<&str, usize> = vocab
            .iter()
            .enumerate()
            .map(|(i, w)| (w.as_str(), i))
            .collect();

        let docs = tokenized
            .iter()
            .map(|doc| doc.iter().map(|w| index[w.as_str()]).collect())
            .collect();
        Self { vocab, docs }
    }

    pub fn n_docs(&self) -> usize {
        self.docs.len()
    }

    /// Total occurrences of every term.
    pub fn term_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.vocab.len()];
        for w in self.docs.iter().flatten() {
            counts[*w] += 1;
        }
        counts
    }

    /// Number of documents containing every term.
    pub fn doc_freq(&self) -> Vec<usize> {
        let mut df = vec![0; self.vocab.len()];
        for doc in &self.docs {
            let distinct: BTreeSet<usize> = doc.iter().copied().collect();
            for w in distinct {
                df[w] += 1;
            }
        }
        df
    }

    /// Keep only the terms for which `keep(term_id)` holds, re-indexing the
    /// vocabulary. Documents keep their positions even if they end up empty.
    pub fn retain_terms(&self, keep: impl Fn(usize) -> bool) -> Corpus {
        let mut remap = vec![None; self.vocab.len()];
        let mut vocab = Vec::new();
        for (old, word) in self.vocab.iter().enumerate() {
            if keep(old) {
                remap[old] = Some(vocab.len());
                vocab.push(word.clone());
            }
        }
        let docs = self
            .docs
            .iter()
            .map(|doc| doc.iter().filter_map(|w| remap[*w]).collect())
            .collect();
        Corpus { vocab, docs }
    }

    /// Drop the `n` most frequent terms; ties go to the alphabetically
    /// first term.
    pub fn remove_top(&self, n: usize) -> Corpus {
        if n == 0 {
            return self.clone();
        }
        let counts = self.term_counts();
        let mut order: Vec<usize> = (0..self.vocab.len()).collect();
        order.sort_by(|a, b| counts[*b].cmp(&counts[*a]).then(a.cmp(b)));
        let mut removed = vec![false; self.vocab.len()];
        for w in order.into_iter().take(n) {
            removed[w] = true;
        }
        self.retain_terms(|w| !removed[w])
    }

    /// TF-IDF rows with smooth idf (`ln((1 + n) / (1 + df)) + 1`) and l2
    /// normalization. Terms appearing in more than `max_df · n_docs`
    /// documents are dropped first. Returns the pruned corpus alongside the
    /// rows so weights can be mapped back to words.
    pub fn tfidf(&self, max_df: f64) -> (Corpus, SparseRows) {
        let limit = max_df * self.n_docs() as f64;
        let df = self.doc_freq();
        let pruned = self.retain_terms(|w| df[w] as f64 <= limit);

        let n = pruned.n_docs() as f64;
        let idf: Vec<f64> = pruned
            .doc_freq()
            .iter()
            .map(|d| ((1.0 + n) / (1.0 + *d as f64)).ln() + 1.0)
            .collect();

        let rows = pruned
            .docs
            .iter()
            .map(|doc| {
                let mut tf: HashMap<usize, f64> = HashMap::new();
                for w in doc {
                    *tf.entry(*w).or_insert(0.0) += 1.0;
                }
                let mut row: Vec<(usize, f64)> =
                    tf.into_iter().map(|(w, c)| (w, c * idf[w])).collect();
                row.sort_by_key(|(w, _)| *w);
                let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
                if norm > 0.0 {
                    for (_, v) in row.iter_mut() {
                        *v /= norm;
                    }
                }
                row
            })
            .collect();
        (pruned, rows)
    }
}
