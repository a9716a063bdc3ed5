//! Latent Dirichlet Allocation by collapsed Gibbs sampling.

use std::collections::HashSet;

use super::corpus::Corpus;
use super::rng::Rng;
use super::TopicFit;

pub const ALPHA: f64 = 0.1;
pub const ETA: f64 = 0.01;

/// Fit `k` topics to `corpus` with `iterations` Gibbs sweeps.
pub fn fit(corpus: &Corpus, k: usize, iterations: usize, seed: u64) -> TopicFit {
    let v = corpus.vocab.len();
    let mut rng = Rng::new(seed);

    let mut n_dk = vec![vec![0usize; k]; corpus.n_docs()];
    let mut n_kw = vec![vec![0usize; v]; k];
    let mut n_k = vec![0usize; k];
    let mut z: Vec<Vec<usize>> = Vec::with_capacity(corpus.n_docs());

    for (d, doc) in corpus.docs.iter().enumerate() {
        let mut assignments = Vec::with_capacity(doc.len());
        for &w in doc {
            let t = rng.below(k);
            n_dk[d][t] += 1;
            n_kw[t][w] += 1;
            n_k[t] += 1;
            assignments.push(t);
        }
        z.push(assignments);
    }

    let v_eta = v as f64 * ETA;
    let mut weights = vec![0.0f64; k];
    for _ in 0..iterations {
        for (d, doc) in corpus.docs.iter().enumerate() {
            for (i, &w) in doc.iter().enumerate() {
                let old = z[d][i];
                n_dk[d][old] -= 1;
                n_kw[old][w] -= 1;
                n_k[old] -= 1;

                let mut total = 0.0;
                for t in 0..k {
                    let p = (n_dk[d][t] as f64 + ALPHA) * (n_kw[t][w] as f64 + ETA)
                        / (n_k[t] as f64 + v_eta);
                    total += p;
                    weights[t] = total;
                }
                let target = rng.next_f64() * total;
                let new = weights.iter().position(|c| target < *c).unwrap_or(k - 1);

                z[d][i] = new;
                n_dk[d][new] += 1;
                n_kw[new][w] += 1;
                n_k[new] += 1;
            }
        }
    }

    let topic_term = (0..k)
        .map(|t| {
            (0..v)
                .map(|w| (n_kw[t][w] as f64 + ETA) / (n_k[t] as f64 + v_eta))
                .collect()
        })
        .collect();
    let k_alpha = k as f64 * ALPHA;
    let doc_topic = corpus
        .docs
        .iter()
        .enumerate()
        .map(|(d, doc)| {
            (0..k)
                .map(|t| (n_dk[d][t] as f64 + ALPHA) / (doc.len() as f64 + k_alpha))
                .collect()
        })
        .collect();

    TopicFit {
        vocab: corpus.vocab.clone(),
        topic_term,
        doc_topic,
    }
}

/// Mean normalized PMI over all pairs of each topic's top words, using
/// document co-occurrence. Topics with fewer than two words are skipped;
/// `None` when no topic has a pair.
pub fn npmi_coherence(corpus: &Corpus, top_words: &[Vec<usize>]) -> Option<f64> {
    let n = corpus.n_docs() as f64;
    if n == 0.0 {
        return None;
    }
    let doc_sets: Vec<HashSet<usize>> = corpus
        .docs
        .iter()
        .map(|d| d.iter().copied().collect())
        .collect();
    let df = |w: usize| doc_sets.iter().filter(|s| s.contains(&w)).count() as f64;
    let co = |a: usize, b: usize| {
        doc_sets
            .iter()
            .filter(|s| s.contains(&a) && s.contains(&b))
            .count() as f64
    };

    let mut topic_scores = Vec::new();
    for words in top_words {
        let mut pair_scores = Vec::new();
        for i in 0..words.len() {
            for j in i + 1..words.len() {
                let (a, b) = (words[i], words[j]);
                let joint = co(a, b);
                let score = if joint == 0.0 {
                    -1.0
                } else {
                    let p_ab = joint / n;
                    let p_a = df(a) / n;
                    let p_b = df(b) / n;
                    let denom = -p_ab.ln();
                    if denom == 0.0 {
                        1.0
                    } else {
                        (p_ab / (p_a * p_b)).ln() / denom
                    }
                };
                pair_scores.push(score);
            }
        }
        if !pair_scores.is_empty() {
            topic_scores.push(pair_scores.iter().sum::<f64>() / pair_scores.len() as f64);
        }
    }

    if topic_scores.is_empty() {
        None
    } else {
        Some(topic_scores.iter().sum::<f64>() / topic_scores.len() as f64)
    }
}
