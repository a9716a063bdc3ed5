//! Non-negative matrix factorization of a TF-IDF matrix.
//!
//! Minimizes the Frobenius norm `‖X − WH‖` with the multiplicative update
//! rules of Lee & Seung. `X` stays sparse; `W` (docs × topics) and `H`
//! (topics × terms) are dense.

use super::corpus::SparseRows;
use super::rng::Rng;
use super::TopicFit;

const EPSILON: f64 = 1e-10;

pub fn fit(vocab: &[String], x: &SparseRows, k: usize, max_iter: usize, seed: u64) -> TopicFit {
    let n = x.len();
    let v = vocab.len();
    let mut rng = Rng::new(seed);

    let nnz_sum: f64 = x.iter().flatten().map(|(_, val)| val).sum();
    let mean = if n == 0 || v == 0 {
        0.0
    } else {
        nnz_sum / (n * v) as f64
    };
    let scale = (mean / k as f64).sqrt().max(EPSILON);

    let mut w: Vec<Vec<f64>> = (0..n)
        .map(|_| (0..k).map(|_| scale * (rng.next_f64() + 0.01)).collect())
        .collect();
    let mut h: Vec<Vec<f64>> = (0..k)
        .map(|_| (0..v).map(|_| scale * (rng.next_f64() + 0.01)).collect())
        .collect();

    for _ in 0..max_iter {
        update_h(x, &w, &mut h);
        update_w(x, &mut w, &h);
    }

    TopicFit {
        vocab: vocab.to_vec(),
        topic_term: h,
        doc_topic: w,
    }
}

/// `H ← H ∘ (WᵀX) / (WᵀW H)`
fn update_h(x: &SparseRows, w: &[Vec<f64>], h: &mut [Vec<f64>]) {
    let k = h.len();
    let v = h.first().map_or(0, Vec::len);

    let mut wt_x = vec![vec![0.0; v]; k];
    for (d, row) in x.iter().enumerate() {
        for &(term, val) in row {
            for t in 0..k {
                wt_x[t][term] += w[d][t] * val;
            }
        }
    }

    let mut wt_w = vec![vec![0.0; k]; k];
    for wd in w {
        for a in 0..k {
            for b in 0..k {
                wt_w[a][b] += wd[a] * wd[b];
            }
        }
    }

    for t in 0..k {
        for term in 0..v {
            let denom: f64 = (0..k).map(|s| wt_w[t][s] * h[s][term]).sum();
            h[t][term] *= wt_x[t][term] / (denom + EPSILON);
        }
    }
}

/// `W ← W ∘ (XHᵀ) / (W HHᵀ)`
fn update_w(x: &SparseRows, w: &mut [Vec<f64>], h: &[Vec<f64>]) {
    let k = h.len();

    let mut h_ht = vec![vec![0.0; k]; k];
    for a in 0..k {
        for b in 0..k {
            h_ht[a][b] = h[a].iter().zip(&h[b]).map(|(p, q)| p * q).sum();
        }
    }

    for (d, row) in x.iter().enumerate() {
        let mut x_ht = vec![0.0; k];
        for &(term, val) in row {
            for t in 0..k {
                x_ht[t] += val * h[t][term];
            }
        }
        let current = w[d].clone();
        for t in 0..k {
            let denom: f64 = (0..k).map(|s| current[s] * h_ht[s][t]).sum();
            w[d][t] = current[t] * x_ht[t] / (denom + EPSILON);
        }
    }
}
