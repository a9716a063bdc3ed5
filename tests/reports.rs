mod common;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{date, fixture, harness, harness_with, memory_corpus, settings};
use patent_inspector::export::export_key;
use patent_inspector::report::RerunOutcome;
use patent_inspector_core::error::{FilterError, ReportError};
use patent_inspector_core::filter::{
    CpcFilter, DateRange, FilterSpec, IntRange, PatentFilter, Predicate,
};
use patent_inspector_core::models::{Citation, CpcLevel, PatentRecord, PatentSummary};
use patent_inspector_core::results::{ErrorKind, GENERIC_ERROR, NO_PATENTS_FOUND};
use patent_inspector_core::stats::StatField;
use patent_inspector_core::store::memory::{InMemoryCorpus, InMemoryReportStore};
use patent_inspector_core::store::{BlobStore, CorpusStore, ReportStatus, ReportStore};
use patent_inspector_core::topics::{TopicMethod, TopicParams};

fn us_utility_2010_2015() -> FilterSpec {
    FilterSpec {
        patent: PatentFilter {
            office: Some("US".into()),
            patent_type: Some("utility".into()),
            granted_date: Some(DateRange::new(
                Some(date("2010-01-01")),
                Some(date("2015-12-31")),
            )),
            ..PatentFilter::default()
        },
        ..FilterSpec::default()
    }
}

const EXPECTED_IDS: [i64; 15] = [2, 3, 4, 6, 7, 12, 13, 14, 16, 17, 22, 23, 24, 26, 27];

#[tokio::test]
async fn test_full_report_end_to_end() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), true)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.executed_successfully, Some(true));
    assert!(report.analysis_started_at.is_some());
    assert!(report.analysis_ended_at >= report.analysis_started_at);
    assert_eq!(report.patent_ids.as_deref(), Some(&EXPECTED_IDS[..]));

    let results = report.results.unwrap();
    assert!(results.is_complete());
    assert!(!results.has_error());
    assert_eq!(results.patents_count, Some(EXPECTED_IDS.len()));

    let stats = results.statistics.unwrap();
    assert_eq!(stats.len(), StatField::ALL.len());

    let ts = results.timeseries.unwrap();
    assert_eq!(ts.granted_per_year.values().sum::<u64>(), 15);
    assert!(ts.granted_per_year.keys().all(|y| (2010..=2015).contains(y)));

    let entity = results.entity.unwrap();
    assert_eq!(entity.patent.patent_type.len(), 1);
    assert_eq!(entity.patent.patent_type[0].label, "utility");
    assert_eq!(entity.patent.patent_type[0].count, 15);

    let topics = results.topic_modeling.unwrap();
    assert_eq!(topics.topics.len(), 10);
    assert_eq!(topics.latest_grant_date, date("2015-03-15"));
    assert_eq!(topics.params.method, TopicMethod::Lda);

    let citations = results.citations.unwrap();
    assert!(citations.graph.iter().all(|edge| {
        EXPECTED_IDS.contains(&edge.citing.id) && EXPECTED_IDS.contains(&edge.cited.id)
    }));

    assert_eq!(h.blobs.keys(), vec![export_key(id)]);

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].succeeded);
    assert_eq!(sent[0].owner, "alice");
    assert_eq!(sent[0].url, format!("https://reports.example.org/report/{}", id));
}

#[tokio::test]
async fn test_capacity_guard_in_production() {
    let mut s = settings();
    s.max_records = 5;
    let h = harness(s);
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), true)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.executed_successfully, Some(false));
    let results = report.results.unwrap();
    assert_eq!(results.error_kind, Some(ErrorKind::Capacity));
    assert!(results
        .error
        .as_deref()
        .unwrap()
        .starts_with("Too many patents (15)"));
    assert!(results.statistics.is_none());
    assert!(results.topic_modeling.is_none());
    assert!(h.blobs.keys().is_empty());
    assert!(!h.notifier.sent()[0].succeeded);
}

#[tokio::test]
async fn test_capacity_ignored_outside_production() {
    let mut s = settings();
    s.max_records = 5;
    s.production = false;
    let h = harness(s);
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.executed_successfully, Some(true));
    assert!(report.results.unwrap().is_complete());
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_no_matches_stores_info() {
    let h = harness(settings());
    let filters = FilterSpec {
        patent: PatentFilter {
            granted_date: Some(DateRange::new(Some(date("1990-01-01")), Some(date("1991-01-01")))),
            ..PatentFilter::default()
        },
        ..FilterSpec::default()
    };
    let id = h.service.submit("alice", filters, false).await.unwrap();
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.executed_successfully, Some(true));
    assert_eq!(report.patent_ids, Some(vec![]));
    let results = report.results.unwrap();
    assert_eq!(results.info.as_deref(), Some(NO_PATENTS_FOUND));
    assert_eq!(results.patents_count, Some(0));
    assert!(!results.is_complete());

    assert!(matches!(
        h.service.download_export("alice", id).await,
        Err(ReportError::NotFound(_))
    ));
    assert!(matches!(
        h.service
            .rerun_topic_modeling("alice", id, TopicParams::default())
            .await,
        Err(ReportError::TopicsNotReady(_))
    ));
}

#[tokio::test]
async fn test_invalid_filters_create_nothing() {
    let h = harness(settings());

    let bad_range = FilterSpec {
        patent: PatentFilter {
            claims_count: Some(IntRange::new(Some(10), Some(2))),
            ..PatentFilter::default()
        },
        ..FilterSpec::default()
    };
    assert!(matches!(
        h.service.submit("alice", bad_range, false).await,
        Err(ReportError::Validation(FilterError::InvalidRange { .. }))
    ));

    let unknown_cpc = FilterSpec {
        cpc: CpcFilter {
            group: vec!["H01S5/00".into(), "Z99Z1/00".into()],
            ..CpcFilter::default()
        },
        ..FilterSpec::default()
    };
    match h.service.submit("alice", unknown_cpc, false).await {
        Err(ReportError::Validation(FilterError::UnknownCpc { codes, .. })) => {
            assert_eq!(codes, vec!["Z99Z1/00".to_string()]);
        }
        other => panic!("expected unknown CPC error, got {:?}", other),
    }

    assert!(h.service.list("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redundant_cpc_codes_are_dropped_on_submit() {
    let h = harness(settings());
    let filters = FilterSpec {
        cpc: CpcFilter {
            section: vec!["H".into()],
            subclass: vec!["H01S".into(), "C12N".into()],
            ..CpcFilter::default()
        },
        ..FilterSpec::default()
    };
    let id = h.service.submit("alice", filters, false).await.unwrap();
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.filters.cpc.section, vec!["H".to_string()]);
    assert_eq!(report.filters.cpc.subclass, vec!["C12N".to_string()]);
    // Section H and subclass C12N together cover the whole corpus.
    assert_eq!(report.patent_ids.unwrap().len(), 30);
}

#[tokio::test]
async fn test_reports_are_scoped_to_owner() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    assert!(matches!(
        h.service.get("bob", id).await,
        Err(ReportError::NotFound(_))
    ));
    assert!(matches!(
        h.service.delete("bob", id).await,
        Err(ReportError::NotFound(_))
    ));
    assert!(h.service.list("bob").await.unwrap().is_empty());

    let second = h
        .service
        .submit("alice", FilterSpec::default(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;
    let listed: Vec<i64> = h
        .service
        .list("alice")
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![second, id]);
}

#[tokio::test]
async fn test_topic_rerun_replaces_only_topics() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;
    let before = h.service.get("alice", id).await.unwrap().results.unwrap();

    let params = TopicParams {
        method: TopicMethod::Nmf,
        n_topics: 2,
        n_words: 3,
        ..TopicParams::default()
    };
    let outcome = h
        .service
        .rerun_topic_modeling("alice", id, params)
        .await
        .unwrap();
    assert_eq!(outcome, RerunOutcome::Accepted);
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.executed_successfully, Some(true));
    let after = report.results.unwrap();
    let topics = after.topic_modeling.as_ref().unwrap();
    assert_eq!(topics.params.method, TopicMethod::Nmf);
    assert_eq!(topics.topics.len(), 2);
    assert!(topics.topics.iter().all(|t| t.words.len() <= 3));
    assert!(topics.coherence.is_none());

    assert_eq!(after.statistics, before.statistics);
    assert_eq!(after.timeseries, before.timeseries);
    assert_eq!(after.citations, before.citations);
}

#[tokio::test]
async fn test_topic_rerun_with_same_params_is_unchanged() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;
    let ended = h.service.get("alice", id).await.unwrap().analysis_ended_at;

    let outcome = h
        .service
        .rerun_topic_modeling("alice", id, TopicParams::default())
        .await
        .unwrap();
    assert_eq!(outcome, RerunOutcome::Unchanged);
    assert_eq!(h.service.queue().pending(), 0);
    assert!(!h.service.is_busy(id));

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.analysis_ended_at, ended);
}

#[tokio::test]
async fn test_topic_rerun_while_busy() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let nmf = TopicParams {
        method: TopicMethod::Nmf,
        n_topics: 3,
        ..TopicParams::default()
    };
    let first = h
        .service
        .rerun_topic_modeling("alice", id, nmf.clone())
        .await
        .unwrap();
    assert_eq!(first, RerunOutcome::Accepted);
    assert_eq!(
        h.service.get("alice", id).await.unwrap().status,
        ReportStatus::WaitingForTopicAnalysis
    );

    let second = h
        .service
        .rerun_topic_modeling(
            "alice",
            id,
            TopicParams {
                n_topics: 4,
                ..nmf
            },
        )
        .await
        .unwrap();
    assert_eq!(second, RerunOutcome::Busy);

    h.service.wait_idle().await;
    assert!(!h.service.is_busy(id));
    let topics = h
        .service
        .get("alice", id)
        .await
        .unwrap()
        .results
        .unwrap()
        .topic_modeling
        .unwrap();
    assert_eq!(topics.topics.len(), 3);
}

#[tokio::test]
async fn test_invalid_topic_params_are_rejected() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let params = TopicParams {
        n_topics: 0,
        ..TopicParams::default()
    };
    assert!(matches!(
        h.service.rerun_topic_modeling("alice", id, params).await,
        Err(ReportError::InvalidTopicParams(_))
    ));
    assert!(!h.service.is_busy(id));
}

#[tokio::test]
async fn test_export_is_rebuilt_when_missing() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let stored = h.service.download_export("alice", id).await.unwrap();
    assert_eq!(&stored[..2], b"PK");

    h.blobs.delete(&export_key(id)).await.unwrap();
    let rebuilt = h.service.download_export("alice", id).await.unwrap();
    assert_eq!(&rebuilt[..2], b"PK");
    assert_eq!(h.blobs.keys(), vec![export_key(id)]);
}

#[tokio::test]
async fn test_delete_removes_report_and_export() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;
    assert!(!h.blobs.keys().is_empty());

    h.service.delete("alice", id).await.unwrap();
    assert!(h.reports.get(id).await.unwrap().is_none());
    assert!(h.blobs.keys().is_empty());
    assert!(matches!(
        h.service.get("alice", id).await,
        Err(ReportError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_report_deleted_before_job_runs() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), true)
        .await
        .unwrap();
    // The current-thread runtime has not polled the worker yet.
    h.service.delete("alice", id).await.unwrap();
    h.service.wait_idle().await;

    assert!(h.reports.get(id).await.unwrap().is_none());
    assert!(h.blobs.keys().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert!(!h.service.is_busy(id));
}

#[tokio::test]
async fn test_failed_job_keeps_generic_error() {
    // A report whose stored snapshot points at patents that no longer exist
    // fails the topic rerun.
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let mut report = h.reports.get(id).await.unwrap().unwrap();
    report.patent_ids = Some(vec![9_999]);
    h.reports.save(&report).await.unwrap();

    let params = TopicParams {
        n_topics: 2,
        ..TopicParams::default()
    };
    assert_eq!(
        h.service
            .rerun_topic_modeling("alice", id, params)
            .await
            .unwrap(),
        RerunOutcome::Accepted
    );
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.executed_successfully, Some(false));
    let results = report.results.unwrap();
    assert_eq!(results.error.as_deref(), Some(GENERIC_ERROR));
    assert_eq!(results.error_kind, Some(ErrorKind::Compute));
    assert!(results.statistics.is_some());
}

/// What [`InterferingCorpus`] does when patents are loaded.
#[derive(Clone, Copy)]
enum OnLoad {
    DeleteReports,
    Panic,
}

/// Corpus that interferes with the running job when it loads patents.
struct InterferingCorpus {
    inner: Arc<InMemoryCorpus>,
    reports: Arc<InMemoryReportStore>,
    on_load: OnLoad,
}

#[async_trait]
impl CorpusStore for InterferingCorpus {
    async fn count_matching(&self, predicate: &Predicate) -> anyhow::Result<usize> {
        self.inner.count_matching(predicate).await
    }

    async fn resolve_ids(&self, predicate: &Predicate) -> anyhow::Result<Vec<i64>> {
        self.inner.resolve_ids(predicate).await
    }

    async fn load_patents(&self, ids: &[i64]) -> anyhow::Result<Vec<PatentRecord>> {
        match self.on_load {
            OnLoad::DeleteReports => {
                for report in self.reports.list("alice").await? {
                    self.reports.delete(report.id).await?;
                }
            }
            OnLoad::Panic => panic!("corrupt patent row"),
        }
        self.inner.load_patents(ids).await
    }

    async fn numeric_values(&self, ids: &[i64], field: StatField) -> anyhow::Result<Vec<f64>> {
        self.inner.numeric_values(ids, field).await
    }

    async fn citations_touching(&self, ids: &[i64]) -> anyhow::Result<Vec<Citation>> {
        self.inner.citations_touching(ids).await
    }

    async fn patent_summaries(&self, ids: &[i64]) -> anyhow::Result<Vec<PatentSummary>> {
        self.inner.patent_summaries(ids).await
    }

    async fn cpc_titles(&self, codes: &[String]) -> anyhow::Result<HashMap<String, String>> {
        self.inner.cpc_titles(codes).await
    }

    async fn unknown_cpc_codes(
        &self,
        level: CpcLevel,
        codes: &[String],
    ) -> anyhow::Result<Vec<String>> {
        self.inner.unknown_cpc_codes(level, codes).await
    }
}

fn interfering(on_load: OnLoad) -> common::Harness {
    harness_with(settings(), move |reports| {
        Arc::new(InterferingCorpus {
            inner: memory_corpus(&fixture()),
            reports,
            on_load,
        })
    })
}

#[tokio::test]
async fn test_report_deleted_during_analysis() {
    let h = interfering(OnLoad::DeleteReports);
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), true)
        .await
        .unwrap();
    h.service.wait_idle().await;

    assert!(h.reports.get(id).await.unwrap().is_none());
    assert!(h.blobs.keys().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert!(!h.service.is_busy(id));
    assert_eq!(h.service.queue().pending(), 0);
}

#[tokio::test]
async fn test_panicking_job_ends_idle() {
    let h = interfering(OnLoad::Panic);
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), true)
        .await
        .unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(10), h.service.wait_idle())
        .await
        .expect("job should complete after a panic");

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.executed_successfully, Some(false));
    assert!(report.analysis_ended_at.is_some());
    let results = report.results.unwrap();
    assert_eq!(results.error.as_deref(), Some(GENERIC_ERROR));
    assert_eq!(results.error_kind, Some(ErrorKind::Compute));
    assert!(!h.service.is_busy(id));

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(!sent[0].succeeded);
}

#[tokio::test]
async fn test_unprunable_vocabulary_reports_specific_error() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let params = TopicParams {
        method: TopicMethod::Nmf,
        n_topics: 2,
        max_df: 0.01,
        ..TopicParams::default()
    };
    assert_eq!(
        h.service
            .rerun_topic_modeling("alice", id, params)
            .await
            .unwrap(),
        RerunOutcome::Accepted
    );
    h.service.wait_idle().await;

    let report = h.service.get("alice", id).await.unwrap();
    assert_eq!(report.executed_successfully, Some(false));
    let results = report.results.unwrap();
    let error = results.error.unwrap();
    assert!(error.contains("no terms remain after max_df pruning"), "{}", error);
    assert_ne!(error, GENERIC_ERROR);
    assert!(results.statistics.is_some());
}

#[tokio::test]
async fn test_notification_link_uses_http_outside_production() {
    let mut s = settings();
    s.production = false;
    let h = harness(s);
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), true)
        .await
        .unwrap();
    h.service.wait_idle().await;

    let sent = h.notifier.sent();
    assert_eq!(sent[0].url, format!("http://reports.example.org/report/{}", id));
}

#[tokio::test]
async fn test_rejected_rerun_releases_slot() {
    let h = harness(settings());
    let id = h
        .service
        .submit("alice", us_utility_2010_2015(), false)
        .await
        .unwrap();
    h.service.wait_idle().await;

    assert!(matches!(
        h.service
            .rerun_topic_modeling("mallory", id, TopicParams::default())
            .await,
        Err(ReportError::NotFound(_))
    ));
    assert!(!h.service.is_busy(id));

    let unknown = 9_999;
    assert!(matches!(
        h.service
            .rerun_topic_modeling("alice", unknown, TopicParams::default())
            .await,
        Err(ReportError::NotFound(_))
    ));
    assert!(!h.service.is_busy(unknown));

    // The slot is free again, so a real change is accepted.
    let params = TopicParams {
        n_topics: 3,
        ..TopicParams::default()
    };
    assert_eq!(
        h.service
            .rerun_topic_modeling("alice", id, params)
            .await
            .unwrap(),
        RerunOutcome::Accepted
    );
    h.service.wait_idle().await;
    assert!(!h.service.is_busy(id));
}
