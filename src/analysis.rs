//! Concurrent computation of a report's analytical sections.
//!
//! The five sections are independent. Statistics are aggregated by the
//! corpus store; the other four are CPU-bound and run on the blocking
//! pool. All five are joined with `tokio::try_join!`, so the first failure
//! aborts the fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use patent_inspector_core::error::ReportError;
use patent_inspector_core::models::{Citation, PatentRecord, PatentSummary};
use patent_inspector_core::results::{CitationSection, EntitySection, TimeSeries};
use patent_inspector_core::stats::{StatField, StatisticsRow};
use patent_inspector_core::store::CorpusStore;
use patent_inspector_core::topics::{self, TopicModelResult, TopicParams, TopicSettings};
use patent_inspector_core::{aggregate, citations};

/// Everything the analytics read, loaded once per job.
pub struct AnalysisInput {
    pub ids: Vec<i64>,
    pub records: Vec<PatentRecord>,
    pub citations: Vec<Citation>,
    pub summaries: HashMap<i64, PatentSummary>,
    pub cpc_titles: HashMap<String, String>,
}

/// The computed sections of a full report.
pub struct Sections {
    pub statistics: Vec<StatisticsRow>,
    pub timeseries: TimeSeries,
    pub entity: EntitySection,
    pub topic_modeling: TopicModelResult,
    pub citations: CitationSection,
}

/// Load records, citations, endpoint summaries and CPC titles for `ids`.
pub async fn load_input(corpus: &dyn CorpusStore, ids: Vec<i64>) -> Result<AnalysisInput, ReportError> {
    let records = corpus.load_patents(&ids).await?;
    let citations = corpus.citations_touching(&ids).await?;
    let summaries = corpus
        .patent_summaries(&ids)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();
    let cpc_titles = corpus
        .cpc_titles(&aggregate::referenced_cpc_codes(&records))
        .await?;
    Ok(AnalysisInput {
        ids,
        records,
        citations,
        summaries,
        cpc_titles,
    })
}

/// Run `f` on the blocking pool.
async fn blocking<T, F>(f: F) -> Result<T, ReportError>
where
    F: FnOnce() -> Result<T, ReportError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ReportError::compute(format!("analysis task failed: {e}")))?
}

/// One statistics row per field, aggregated by the store.
pub async fn statistics(corpus: &dyn CorpusStore, ids: &[i64]) -> Result<Vec<StatisticsRow>, ReportError> {
    let mut rows = Vec::with_capacity(StatField::ALL.len());
    for field in StatField::ALL {
        let values = corpus.numeric_values(ids, field).await?;
        rows.push(StatisticsRow::new(field, &values));
    }
    Ok(rows)
}

/// Fit the topic model alone, as a topic rerun does.
pub async fn topic_model(
    records: Vec<PatentRecord>,
    params: TopicParams,
    settings: TopicSettings,
) -> Result<TopicModelResult, ReportError> {
    blocking(move || topics::run(&records, &params, &settings)).await
}

/// Compute every section concurrently.
pub async fn run_all(
    corpus: &dyn CorpusStore,
    input: Arc<AnalysisInput>,
    settings: TopicSettings,
) -> Result<Sections, ReportError> {
    let ts_input = input.clone();
    let entity_input = input.clone();
    let topic_input = input.clone();
    let citation_input = input.clone();

    let (statistics, timeseries, entity, topic_modeling, citations) = tokio::try_join!(
        statistics(corpus, &input.ids),
        blocking(move || {
            Ok(aggregate::timeseries(
                &ts_input.records,
                &ts_input.citations,
                &ts_input.cpc_titles,
            ))
        }),
        blocking(move || Ok(aggregate::entities(&entity_input.records, &entity_input.cpc_titles))),
        blocking(move || topics::run(&topic_input.records, &TopicParams::default(), &settings)),
        blocking(move || {
            Ok(citations::build(
                &citation_input.ids,
                &citation_input.citations,
                &citation_input.summaries,
            ))
        }),
    )?;

    Ok(Sections {
        statistics,
        timeseries,
        entity,
        topic_modeling,
        citations,
    })
}
