//! Report lifecycle orchestration.
//!
//! [`ReportService`] owns the report state machine:
//!
//! ```text
//! submit ──▶ waiting_for_analysis ──(full job)──▶ idle
//! rerun  ──▶ waiting_for_topic_analysis ──(topic job)──▶ idle
//! ```
//!
//! Jobs run on the [`TaskQueue`]. Every job is followed by exactly one
//! completion hook, which records success, moves the report back to
//! `idle`, releases the report's single-flight slot and notifies the owner.
//! Jobs re-check that their report still exists before each write, so a
//! report deleted mid-run is dropped silently.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::Instrument;

use patent_inspector_core::error::{FilterError, ReportError};
use patent_inspector_core::filter::{self, FilterSpec};
use patent_inspector_core::models::CpcLevel;
use patent_inspector_core::results::{ErrorKind, ResultsDocument, GENERIC_ERROR, NO_PATENTS_FOUND};
use patent_inspector_core::store::{
    BlobStore, CorpusStore, NewReport, Notification, Notifier, Report, ReportStatus, ReportStore,
};
use patent_inspector_core::topics::{TopicParams, TopicSettings};

use crate::analysis;
use crate::blob::FsBlobStore;
use crate::config::Config;
use crate::db;
use crate::export::{build_workbook, export_key};
use crate::notify;
use crate::queue::{callback, job, TaskOutcome, TaskQueue};
use crate::sqlite_store::{SqliteCorpus, SqliteReports};

/// Orchestrator knobs taken from configuration.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub production: bool,
    pub max_records: usize,
    pub topics: TopicSettings,
    pub notify_enabled: bool,
    pub front_end_domain: String,
}

impl ServiceSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            production: config.reports.production,
            max_records: config.reports.max_records,
            topics: config.topics.settings(),
            notify_enabled: config.notify.enabled,
            front_end_domain: config.notify.front_end_domain.clone(),
        }
    }

    fn report_url(&self, id: i64) -> String {
        let scheme = if self.production { "https" } else { "http" };
        format!("{}://{}/report/{}", scheme, self.front_end_domain, id)
    }
}

/// Result of a topic rerun request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RerunOutcome {
    /// A topic job was queued.
    Accepted,
    /// The parameters resolve to the stored ones; nothing to do.
    Unchanged,
    /// Another job for this report is still running.
    Busy,
}

#[derive(Debug, Clone, Copy)]
enum JobKind {
    Full,
    Topics,
}

impl JobKind {
    fn as_str(self) -> &'static str {
        match self {
            JobKind::Full => "full_report",
            JobKind::Topics => "topic_rerun",
        }
    }
}

struct Inner {
    corpus: Arc<dyn CorpusStore>,
    reports: Arc<dyn ReportStore>,
    blobs: Arc<dyn BlobStore>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<TaskQueue>,
    settings: ServiceSettings,
    in_flight: Mutex<HashSet<i64>>,
}

/// Entry point for every report operation. Cheap to clone.
#[derive(Clone)]
pub struct ReportService {
    inner: Arc<Inner>,
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

impl ReportService {
    pub fn new(
        corpus: Arc<dyn CorpusStore>,
        reports: Arc<dyn ReportStore>,
        blobs: Arc<dyn BlobStore>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<TaskQueue>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                corpus,
                reports,
                blobs,
                notifier,
                queue,
                settings,
                in_flight: Mutex::new(HashSet::new()),
            }),
        }
    }

    /// Wire the SQLite stores, filesystem exports and configured notifier,
    /// and start the worker pool. The schema must already exist.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        let queue = TaskQueue::start(
            config.queue.workers,
            config.queue.max_attempts,
            config.queue.timeout(),
        );
        Ok(Self::new(
            Arc::new(SqliteCorpus::new(pool.clone())),
            Arc::new(SqliteReports::new(pool)),
            Arc::new(FsBlobStore::new(&config.reports.export_dir)),
            notify::from_config(&config.notify)?,
            Arc::new(queue),
            ServiceSettings::from_config(config),
        ))
    }

    pub fn queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    /// Wait for every queued job and its completion hook.
    pub async fn wait_idle(&self) {
        self.inner.queue.wait_idle().await;
    }

    /// Drain outstanding jobs and stop the workers.
    pub async fn shutdown(&self) {
        self.inner.queue.wait_idle().await;
        self.inner.queue.shutdown().await;
    }

    // ============ Single flight ============

    /// Claim the report's slot. `false` when a job already holds it.
    fn acquire(&self, id: i64) -> Result<bool, ReportError> {
        let mut set = self
            .inner
            .in_flight
            .lock()
            .map_err(|_| ReportError::compute("single-flight lock poisoned"))?;
        Ok(set.insert(id))
    }

    fn release(&self, id: i64) {
        if let Ok(mut set) = self.inner.in_flight.lock() {
            set.remove(&id);
        }
    }

    pub fn is_busy(&self, id: i64) -> bool {
        self.inner
            .in_flight
            .lock()
            .map(|set| set.contains(&id))
            .unwrap_or(false)
    }

    // ============ Operations ============

    /// Validate `filters`, persist a new report and queue its analysis.
    /// Invalid filters create nothing.
    pub async fn submit(
        &self,
        owner: &str,
        mut filters: FilterSpec,
        notify_owner: bool,
    ) -> Result<i64, ReportError> {
        filter::validate(&filters)?;
        for level in CpcLevel::ALL {
            let codes = filters.cpc.codes(level);
            if codes.is_empty() {
                continue;
            }
            let unknown = self.inner.corpus.unknown_cpc_codes(level, codes).await?;
            if !unknown.is_empty() {
                return Err(FilterError::UnknownCpc {
                    level,
                    codes: unknown,
                }
                .into());
            }
        }
        filter::remove_redundant_cpc(&mut filters.cpc);
        filter::compile(&filters)?;

        let report = self
            .inner
            .reports
            .create(NewReport {
                owner: owner.to_string(),
                notify_owner,
                filters,
                status: ReportStatus::WaitingForAnalysis,
            })
            .await?;
        let id = report.id;
        tracing::info!(report_id = id, owner, "report submitted");

        self.acquire(id)?;
        self.schedule(id, JobKind::Full, TopicParams::default())
            .await?;
        Ok(id)
    }

    /// A report of `owner`. Reports of other owners are reported as missing.
    pub async fn get(&self, owner: &str, id: i64) -> Result<Report, ReportError> {
        match self.inner.reports.get(id).await? {
            Some(report) if report.owner == owner => Ok(report),
            _ => Err(ReportError::NotFound(id)),
        }
    }

    /// Reports of `owner`, newest first.
    pub async fn list(&self, owner: &str) -> Result<Vec<Report>, ReportError> {
        Ok(self.inner.reports.list(owner).await?)
    }

    /// Queue a new topic model fit over the report's snapshot.
    ///
    /// The report's slot is claimed before the report is read, so the
    /// unchanged check and the status write see the latest stored state.
    pub async fn rerun_topic_modeling(
        &self,
        owner: &str,
        id: i64,
        params: TopicParams,
    ) -> Result<RerunOutcome, ReportError> {
        params.validate()?;
        if !self.acquire(id)? {
            self.get(owner, id).await?;
            return Ok(RerunOutcome::Busy);
        }
        match self.mark_topic_rerun(owner, id, &params).await {
            Ok(true) => {}
            Ok(false) => {
                self.release(id);
                return Ok(RerunOutcome::Unchanged);
            }
            Err(e) => {
                self.release(id);
                return Err(e);
            }
        }
        self.schedule(id, JobKind::Topics, params).await?;
        Ok(RerunOutcome::Accepted)
    }

    /// With the slot held: `false` when `params` resolve to the stored
    /// ones, otherwise move the report to `waiting_for_topic_analysis`.
    async fn mark_topic_rerun(
        &self,
        owner: &str,
        id: i64,
        params: &TopicParams,
    ) -> Result<bool, ReportError> {
        let mut report = self.get(owner, id).await?;
        let Some(current) = report
            .results
            .as_ref()
            .and_then(|r| r.topic_modeling.as_ref())
        else {
            return Err(ReportError::TopicsNotReady(id));
        };
        let resolved = params.resolve(current.latest_grant_date, &self.inner.settings.topics)?;
        if resolved == current.params {
            return Ok(false);
        }

        report.status = ReportStatus::WaitingForTopicAnalysis;
        if !self.inner.reports.save(&report).await? {
            return Err(ReportError::NotFound(id));
        }
        tracing::info!(report_id = id, method = resolved.method.as_str(), "topic rerun requested");
        Ok(true)
    }

    /// The spreadsheet export of a report. Rebuilt from the snapshot when
    /// the stored artifact is missing.
    pub async fn download_export(&self, owner: &str, id: i64) -> Result<Vec<u8>, ReportError> {
        let report = self.get(owner, id).await?;
        let key = export_key(id);
        if let Some(bytes) = self.inner.blobs.get(&key).await? {
            return Ok(bytes);
        }
        let ids = match report.patent_ids {
            Some(ids) if !ids.is_empty() => ids,
            _ => return Err(ReportError::NotFound(id)),
        };
        let records = self.inner.corpus.load_patents(&ids).await?;
        let bytes = build_workbook(&records)?;
        self.inner.blobs.put(&key, &bytes).await?;
        Ok(bytes)
    }

    /// Remove a report and its exported artifacts.
    pub async fn delete(&self, owner: &str, id: i64) -> Result<(), ReportError> {
        self.get(owner, id).await?;
        if !self.inner.reports.delete(id).await? {
            return Err(ReportError::NotFound(id));
        }
        self.inner.blobs.delete(&export_key(id)).await?;
        tracing::info!(report_id = id, "report deleted");
        Ok(())
    }

    // ============ Jobs ============

    /// Enqueue a job whose slot is already held. On failure to enqueue the
    /// completion hook runs immediately so the report does not stay waiting.
    async fn schedule(&self, id: i64, kind: JobKind, params: TopicParams) -> Result<(), ReportError> {
        let runner = self.clone();
        let body = job(move || {
            let svc = runner.clone();
            let params = params.clone();
            let span = tracing::info_span!("report_job", report_id = id, kind = kind.as_str());
            async move {
                match kind {
                    JobKind::Full => svc.run_full_report(id).await,
                    JobKind::Topics => svc.run_topic_rerun(id, params).await,
                }
            }
            .instrument(span)
        });
        let hook_svc = self.clone();
        let hook = callback(move |outcome| async move { hook_svc.complete(id, kind, outcome).await });

        if let Err(e) = self.inner.queue.enqueue(format!("{}:{}", kind.as_str(), id), body, hook) {
            tracing::error!(report_id = id, error = %e, "failed to enqueue report job");
            self.complete(
                id,
                kind,
                TaskOutcome {
                    success: false,
                    attempts: 0,
                    error: Some(e.into()),
                },
            )
            .await;
            return Err(ReportError::compute("report job could not be queued"));
        }
        Ok(())
    }

    async fn save_or_gone(&self, report: &Report) -> Result<bool, ReportError> {
        let saved = self.inner.reports.save(report).await?;
        if !saved {
            tracing::info!(report_id = report.id, "report deleted while processing");
        }
        Ok(saved)
    }

    async fn run_full_report(&self, id: i64) -> Result<(), ReportError> {
        let inner = &self.inner;
        let Some(mut report) = inner.reports.get(id).await? else {
            tracing::info!(report_id = id, "report gone before analysis started");
            return Ok(());
        };
        tracing::info!(report_id = id, "analysis started");
        report.analysis_started_at = Some(now());
        report.results = None;
        if !self.save_or_gone(&report).await? {
            return Ok(());
        }

        let predicate = filter::compile(&report.filters)?;
        // Geo filters are refined outside SQL, so counting them already
        // resolves the ids; keep that list for the snapshot.
        let resolved = if predicate.has_geo() {
            Some(inner.corpus.resolve_ids(&predicate).await?)
        } else {
            None
        };
        let count = match &resolved {
            Some(ids) => ids.len(),
            None => inner.corpus.count_matching(&predicate).await?,
        };
        tracing::info!(report_id = id, matched = count, "filters resolved");

        if inner.settings.production && count > inner.settings.max_records {
            let err = ReportError::Capacity {
                count,
                max: inner.settings.max_records,
            };
            tracing::warn!(report_id = id, matched = count, max = inner.settings.max_records, "report rejected: too many patents");
            report.results = Some(ResultsDocument::failure(ErrorKind::Capacity, err.to_string()));
            report.patent_ids = None;
            self.save_or_gone(&report).await?;
            return Err(err);
        }

        let ids = match resolved {
            Some(ids) => ids,
            None if count == 0 => Vec::new(),
            None => inner.corpus.resolve_ids(&predicate).await?,
        };
        if ids.is_empty() {
            report.results = Some(ResultsDocument::info(NO_PATENTS_FOUND));
            report.patent_ids = Some(Vec::new());
            self.save_or_gone(&report).await?;
            return Ok(());
        }

        report.patent_ids = Some(ids.clone());
        if !self.save_or_gone(&report).await? {
            return Ok(());
        }

        let input = Arc::new(analysis::load_input(inner.corpus.as_ref(), ids).await?);
        let sections =
            analysis::run_all(inner.corpus.as_ref(), input.clone(), inner.settings.topics.clone())
                .await?;

        let export_input = input.clone();
        let bytes = tokio::task::spawn_blocking(move || build_workbook(&export_input.records))
            .await
            .map_err(ReportError::compute)??;
        let key = export_key(id);
        inner.blobs.put(&key, &bytes).await?;

        report.results = Some(ResultsDocument {
            patents_count: Some(input.ids.len()),
            statistics: Some(sections.statistics),
            timeseries: Some(sections.timeseries),
            entity: Some(sections.entity),
            topic_modeling: Some(sections.topic_modeling),
            citations: Some(sections.citations),
            ..ResultsDocument::default()
        });
        if !self.save_or_gone(&report).await? {
            inner.blobs.delete(&key).await?;
            return Ok(());
        }
        tracing::info!(report_id = id, patents = input.ids.len(), "analysis finished");
        Ok(())
    }

    async fn run_topic_rerun(&self, id: i64, params: TopicParams) -> Result<(), ReportError> {
        let inner = &self.inner;
        let Some(mut report) = inner.reports.get(id).await? else {
            return Ok(());
        };
        let Some(current) = report
            .results
            .as_ref()
            .and_then(|r| r.topic_modeling.as_ref())
        else {
            return Err(ReportError::TopicsNotReady(id));
        };
        let resolved = params.resolve(current.latest_grant_date, &inner.settings.topics)?;
        if resolved == current.params {
            return Ok(());
        }

        report.analysis_started_at = Some(now());
        if !self.save_or_gone(&report).await? {
            return Ok(());
        }

        let ids = match report.patent_ids.clone() {
            Some(ids) => ids,
            None => {
                let predicate = filter::compile(&report.filters)?;
                inner.corpus.resolve_ids(&predicate).await?
            }
        };
        let records = inner.corpus.load_patents(&ids).await?;
        let topics =
            analysis::topic_model(records, params, inner.settings.topics.clone()).await?;

        // The stored report may have changed while the model was fitting.
        let Some(mut latest) = inner.reports.get(id).await? else {
            return Ok(());
        };
        let mut results = latest.results.take().unwrap_or_default();
        results.error = None;
        results.error_kind = None;
        results.topic_modeling = Some(topics);
        latest.results = Some(results);
        latest.patent_ids = Some(ids);
        latest.analysis_started_at = report.analysis_started_at;
        self.save_or_gone(&latest).await?;
        Ok(())
    }

    /// Runs once after every job, whatever its outcome.
    async fn complete(&self, id: i64, kind: JobKind, outcome: TaskOutcome) {
        if let Err(e) = self.finish(id, kind, &outcome).await {
            tracing::error!(report_id = id, error = %e, "completion hook failed");
        }
        self.release(id);
    }

    async fn finish(&self, id: i64, kind: JobKind, outcome: &TaskOutcome) -> anyhow::Result<()> {
        let inner = &self.inner;
        let Some(mut report) = inner.reports.get(id).await? else {
            return Ok(());
        };

        report.executed_successfully = Some(outcome.success);
        if !outcome.success {
            match &outcome.error {
                Some(e) => tracing::error!(
                    report_id = id,
                    kind = kind.as_str(),
                    attempts = outcome.attempts,
                    error = %e,
                    "report job failed"
                ),
                None => tracing::error!(report_id = id, kind = kind.as_str(), "report job failed"),
            }
            let has_error = report.results.as_ref().is_some_and(|r| r.has_error());
            if !has_error {
                let message = match &outcome.error {
                    Some(e @ ReportError::InvalidTopicParams(_)) => e.to_string(),
                    _ => GENERIC_ERROR.to_string(),
                };
                let mut results = report
                    .results
                    .take()
                    .unwrap_or_else(|| ResultsDocument::failure(ErrorKind::Compute, GENERIC_ERROR));
                results.error = Some(message);
                results.error_kind = Some(ErrorKind::Compute);
                report.results = Some(results);
            }
        }
        report.status = ReportStatus::Idle;
        report.analysis_ended_at = Some(now());
        if !inner.reports.save(&report).await? {
            return Ok(());
        }
        tracing::info!(
            report_id = id,
            kind = kind.as_str(),
            success = outcome.success,
            attempts = outcome.attempts,
            "report job finished"
        );

        if report.notify_owner && inner.settings.notify_enabled {
            let notification = Notification {
                report_id: id,
                owner: report.owner.clone(),
                url: inner.settings.report_url(id),
                succeeded: outcome.success,
                filters: report.filters.clone(),
            };
            if let Err(e) = inner.notifier.notify(&notification).await {
                tracing::warn!(report_id = id, error = %e, "owner notification failed");
            }
        }
        Ok(())
    }
}
