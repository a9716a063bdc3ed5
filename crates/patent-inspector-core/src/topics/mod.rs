//! Topic modeling engine.
//!
//! Fits an LDA or NMF model to the processed title + abstract of every
//! patent in a report, assigns each patent to its strongest topic, and
//! measures how each topic's share of the set grew between two dates.
//!
//! # Growth
//!
//! For a date `x`, the *year ending at x* is the 365 days up to and
//! including `x`. A topic's share at `x` is
//! `topic_count(x) / (total_count(x) + 1)`, and
//!
//! ```text
//! cagr = (share_end / (share_start + 1e-9)) ^ (1 / years_diff) - 1
//! years_diff = days(end - start) / 365
//! ```
//!
//! Equal shares give a cagr of exactly zero.

pub mod corpus;
pub mod lda;
pub mod nmf;
mod rng;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ReportError;
use crate::models::PatentRecord;

use self::corpus::Corpus;

/// Guard added to the start share.
pub const SHARE_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicMethod {
    #[default]
    #[serde(rename = "LDA")]
    Lda,
    #[serde(rename = "NMF")]
    Nmf,
}

impl TopicMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            TopicMethod::Lda => "LDA",
            TopicMethod::Nmf => "NMF",
        }
    }
}

impl std::str::FromStr for TopicMethod {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, ReportError> {
        match s.to_ascii_uppercase().as_str() {
            "LDA" => Ok(TopicMethod::Lda),
            "NMF" => Ok(TopicMethod::Nmf),
            other => Err(ReportError::InvalidTopicParams(format!(
                "unknown method {other}, expected LDA or NMF"
            ))),
        }
    }
}

/// Topic parameters as requested; dates may be left to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicParams {
    pub method: TopicMethod,
    pub n_topics: usize,
    pub n_words: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    /// Most frequent terms removed before fitting (LDA only).
    pub rm_top: usize,
    /// Maximum document frequency ratio kept by TF-IDF (NMF only).
    pub max_df: f64,
}

impl Default for TopicParams {
    fn default() -> Self {
        Self {
            method: TopicMethod::Lda,
            n_topics: 10,
            n_words: 10,
            start_date: None,
            end_date: None,
            rm_top: 20,
            max_df: 0.8,
        }
    }
}

/// Parameters with the date window filled in. Stored with every result
/// and compared on reruns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedTopicParams {
    pub method: TopicMethod,
    pub n_topics: usize,
    pub n_words: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub rm_top: usize,
    pub max_df: f64,
}

/// Engine knobs that come from configuration rather than the request.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicSettings {
    pub lda_iterations: usize,
    pub nmf_max_iter: usize,
    pub default_end_lag_days: i64,
    pub default_lookback_days: i64,
    pub seed: u64,
}

impl Default for TopicSettings {
    fn default() -> Self {
        Self {
            lda_iterations: 1000,
            nmf_max_iter: 400,
            default_end_lag_days: 365 * 3,
            default_lookback_days: 365 * 5,
            seed: 42,
        }
    }
}

impl TopicParams {
    pub fn validate(&self) -> Result<(), ReportError> {
        let invalid = |msg: String| Err(ReportError::InvalidTopicParams(msg));
        if !(1..=100).contains(&self.n_topics) {
            return invalid(format!("n_topics must be in 1..=100, got {}", self.n_topics));
        }
        if !(1..=50).contains(&self.n_words) {
            return invalid(format!("n_words must be in 1..=50, got {}", self.n_words));
        }
        if !(self.max_df > 0.0 && self.max_df <= 1.0) {
            return invalid(format!("max_df must be in (0, 1], got {}", self.max_df));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start >= end {
                return invalid(format!("start_date {start} must precede end_date {end}"));
            }
        }
        Ok(())
    }

    /// Fill in the date window. `latest_grant` is the most recent grant date
    /// of the report's patents.
    pub fn resolve(
        &self,
        latest_grant: NaiveDate,
        settings: &TopicSettings,
    ) -> Result<ResolvedTopicParams, ReportError> {
        self.validate()?;
        let end_date = self
            .end_date
            .unwrap_or(latest_grant - Duration::days(settings.default_end_lag_days));
        let start_date = self
            .start_date
            .unwrap_or(end_date - Duration::days(settings.default_lookback_days));
        if start_date >= end_date {
            return Err(ReportError::InvalidTopicParams(format!(
                "start_date {start_date} must precede end_date {end_date}"
            )));
        }
        Ok(ResolvedTopicParams {
            method: self.method,
            n_topics: self.n_topics,
            n_words: self.n_words,
            start_date,
            end_date,
            rm_top: self.rm_top,
            max_df: self.max_df,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub words: Vec<String>,
    pub weights: Vec<f64>,
    pub count: usize,
    pub ratio: f64,
    pub cagr: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicModelResult {
    pub topics: Vec<Topic>,
    /// Mean NPMI of the topics' top words. LDA only.
    pub coherence: Option<f64>,
    pub params: ResolvedTopicParams,
    /// Latest grant date of the modeled patents; anchors default windows.
    pub latest_grant_date: NaiveDate,
}

/// Raw output of a model fit.
#[derive(Debug, Clone, PartialEq)]
pub struct TopicFit {
    pub vocab: Vec<String>,
    /// topics × terms
    pub topic_term: Vec<Vec<f64>>,
    /// documents × topics
    pub doc_topic: Vec<Vec<f64>>,
}

fn argmax(row: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in row.iter().enumerate() {
        if *v > row[best] {
            best = i;
        }
    }
    best
}

impl TopicFit {
    /// Strongest topic of every document; ties go to the lowest index.
    pub fn assignments(&self) -> Vec<usize> {
        self.doc_topic.iter().map(|row| argmax(row)).collect()
    }

    /// Term ids of the `n` heaviest terms of `topic`, heaviest first.
    pub fn top_terms(&self, topic: usize, n: usize) -> Vec<usize> {
        let row = &self.topic_term[topic];
        let mut order: Vec<usize> = (0..row.len()).collect();
        order.sort_by(|a, b| row[*b].total_cmp(&row[*a]).then(a.cmp(b)));
        order.truncate(n);
        order
    }
}

/// Compound growth of a share between two dates.
pub fn cagr(share_start: f64, share_end: f64, years_diff: f64) -> f64 {
    if share_start == share_end || years_diff <= 0.0 {
        return 0.0;
    }
    (share_end / (share_start + SHARE_EPSILON)).powf(1.0 / years_diff) - 1.0
}

fn in_year_ending_at(date: NaiveDate, at: NaiveDate) -> bool {
    date <= at && date >= at - Duration::days(365)
}

/// Fit the requested model to `records` and summarize every topic.
pub fn run(
    records: &[PatentRecord],
    params: &TopicParams,
    settings: &TopicSettings,
) -> Result<TopicModelResult, ReportError> {
    let latest_grant = records
        .iter()
        .map(|r| r.patent.granted_date)
        .max()
        .ok_or_else(|| ReportError::Compute("no patents to model".into()))?;
    let resolved = params.resolve(latest_grant, settings)?;
    let k = resolved.n_topics;

    let texts: Vec<String> = records.iter().map(|r| r.patent.processed_text()).collect();
    let corpus = Corpus::from_texts(&texts);

    let (fit, coherence) = match resolved.method {
        TopicMethod::Lda => {
            let trimmed = corpus.remove_top(resolved.rm_top);
            let fit = lda::fit(&trimmed, k, settings.lda_iterations, settings.seed);
            let tops: Vec<Vec<usize>> = (0..k).map(|t| fit.top_terms(t, resolved.n_words)).collect();
            let coherence = lda::npmi_coherence(&trimmed, &tops);
            (fit, coherence)
        }
        TopicMethod::Nmf => {
            let (pruned, x) = corpus.tfidf(resolved.max_df);
            if pruned.vocab.is_empty() {
                return Err(ReportError::InvalidTopicParams(format!(
                    "no terms remain after max_df pruning at {}",
                    resolved.max_df
                )));
            }
            let fit = nmf::fit(&pruned.vocab, &x, k, settings.nmf_max_iter, settings.seed);
            (fit, None)
        }
    };
    tracing::debug!(
        method = resolved.method.as_str(),
        topics = k,
        docs = records.len(),
        terms = fit.vocab.len(),
        "topic model fitted"
    );

    let assignments = fit.assignments();
    let total = records.len();
    let years_diff = (resolved.end_date - resolved.start_date).num_days() as f64 / 365.0;
    let window_count = |at: NaiveDate, topic: Option<usize>| {
        records
            .iter()
            .zip(&assignments)
            .filter(|(r, t)| {
                topic.map_or(true, |want| **t == want) && in_year_ending_at(r.patent.granted_date, at)
            })
            .count() as f64
    };
    let total_start = window_count(resolved.start_date, None);
    let total_end = window_count(resolved.end_date, None);

    let topics = (0..k)
        .map(|t| {
            let words: Vec<usize> = fit.top_terms(t, resolved.n_words);
            let count = assignments.iter().filter(|a| **a == t).count();
            let share_start = window_count(resolved.start_date, Some(t)) / (total_start + 1.0);
            let share_end = window_count(resolved.end_date, Some(t)) / (total_end + 1.0);
            Topic {
                words: words.iter().map(|w| fit.vocab[*w].clone()).collect(),
                weights: words.iter().map(|w| fit.topic_term[t][*w]).collect(),
                count,
                ratio: if total == 0 {
                    0.0
                } else {
                    count as f64 / total as f64
                },
                cagr: cagr(share_start, share_end, years_diff),
            }
        })
        .collect();

    Ok(TopicModelResult {
        topics,
        coherence,
        params: resolved,
        latest_grant_date: latest_grant,
    })
}
