//! Storage abstractions for Patent Inspector.
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`CorpusStore`] | Read-only access to patents, CPC titles and citations |
//! | [`ReportStore`] | Owner-scoped report persistence |
//! | [`BlobStore`] | Exported artifacts keyed by string |
//! | [`Notifier`] | Best-effort owner notification |
//!
//! All traits are async (via `async-trait`) and `Send + Sync` so a single
//! instance can be shared by concurrent report jobs. In-memory
//! implementations live in [`memory`].

pub mod memory;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::filter::{FilterSpec, Predicate};
use crate::models::{Citation, CpcLevel, PatentRecord, PatentSummary};
use crate::results::ResultsDocument;
use crate::stats::StatField;

/// Read-only interface over the canonical patent corpus.
///
/// Every id list returned is ascending and distinct; every method taking
/// ids accepts them in any order.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Number of patents satisfying `predicate`.
    async fn count_matching(&self, predicate: &Predicate) -> Result<usize>;

    /// Ids of the patents satisfying `predicate`.
    async fn resolve_ids(&self, predicate: &Predicate) -> Result<Vec<i64>>;

    /// Full records (patent plus related rows), ordered by id.
    async fn load_patents(&self, ids: &[i64]) -> Result<Vec<PatentRecord>>;

    /// Non-null values of one statistics field.
    async fn numeric_values(&self, ids: &[i64], field: StatField) -> Result<Vec<f64>>;

    /// Citations whose citing or cited side is in `ids`.
    async fn citations_touching(&self, ids: &[i64]) -> Result<Vec<Citation>>;

    async fn patent_summaries(&self, ids: &[i64]) -> Result<Vec<PatentSummary>>;

    /// Titles for CPC codes of any level. Unknown codes are absent.
    async fn cpc_titles(&self, codes: &[String]) -> Result<HashMap<String, String>>;

    /// The subset of `codes` that does not exist at `level`.
    async fn unknown_cpc_codes(&self, level: CpcLevel, codes: &[String]) -> Result<Vec<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Idle,
    #[default]
    WaitingForAnalysis,
    WaitingForTopicAnalysis,
}

impl ReportStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportStatus::Idle => "idle",
            ReportStatus::WaitingForAnalysis => "waiting_for_analysis",
            ReportStatus::WaitingForTopicAnalysis => "waiting_for_topic_analysis",
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "idle" => Ok(ReportStatus::Idle),
            "waiting_for_analysis" => Ok(ReportStatus::WaitingForAnalysis),
            "waiting_for_topic_analysis" => Ok(ReportStatus::WaitingForTopicAnalysis),
            other => bail!("unknown report status: {}", other),
        }
    }
}

/// A user-owned analytical report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub owner: String,
    pub notify_owner: bool,
    pub filters: FilterSpec,
    pub status: ReportStatus,
    pub results: Option<ResultsDocument>,
    /// Snapshot of the matching ids taken by the last full run.
    pub patent_ids: Option<Vec<i64>>,
    /// Unix seconds.
    pub created_at: i64,
    pub analysis_started_at: Option<i64>,
    pub analysis_ended_at: Option<i64>,
    pub executed_successfully: Option<bool>,
}

/// Fields supplied when a report is first persisted.
#[derive(Debug, Clone)]
pub struct NewReport {
    pub owner: String,
    pub notify_owner: bool,
    pub filters: FilterSpec,
    pub status: ReportStatus,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn create(&self, report: NewReport) -> Result<Report>;

    async fn get(&self, id: i64) -> Result<Option<Report>>;

    /// Reports of `owner`, newest first.
    async fn list(&self, owner: &str) -> Result<Vec<Report>>;

    /// Overwrite the stored report. Returns `false` when it no longer exists.
    async fn save(&self, report: &Report) -> Result<bool>;

    /// Returns `false` when there was nothing to delete.
    async fn delete(&self, id: i64) -> Result<bool>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Payload sent to a report owner when a job finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub report_id: i64,
    pub owner: String,
    pub url: String,
    pub succeeded: bool,
    pub filters: FilterSpec,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}
