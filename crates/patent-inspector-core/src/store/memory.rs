//! In-memory store implementations for tests and small fixtures.
//!
//! Everything lives in `BTreeMap`/`HashMap`/`Vec` behind
//! `std::sync::RwLock`. The corpus evaluates the predicate AST directly
//! with [`Predicate::matches`], so it doubles as the reference the SQL
//! translation is checked against.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::filter::Predicate;
use crate::models::{Citation, CpcEntry, CpcLevel, PatentRecord, PatentSummary};
use crate::stats::StatField;

use super::{
    BlobStore, CorpusStore, NewReport, Notification, Notifier, Report, ReportStore,
};

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
}

/// In-memory patent corpus.
pub struct InMemoryCorpus {
    patents: RwLock<BTreeMap<i64, PatentRecord>>,
    citations: RwLock<Vec<Citation>>,
    cpc: RwLock<HashMap<String, CpcEntry>>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self {
            patents: RwLock::new(BTreeMap::new()),
            citations: RwLock::new(Vec::new()),
            cpc: RwLock::new(HashMap::new()),
        }
    }

    pub fn insert_patent(&self, record: PatentRecord) -> Result<()> {
        write(&self.patents)?.insert(record.id(), record);
        Ok(())
    }

    pub fn insert_citation(&self, citation: Citation) -> Result<()> {
        write(&self.citations)?.push(citation);
        Ok(())
    }

    pub fn insert_cpc(&self, entry: CpcEntry) -> Result<()> {
        write(&self.cpc)?.insert(entry.code.clone(), entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.patents.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn matching(&self, predicate: &Predicate) -> Result<Vec<i64>> {
        Ok(read(&self.patents)?
            .values()
            .filter(|r| predicate.matches(r))
            .map(|r| r.id())
            .collect())
    }

    fn select<T>(&self, ids: &[i64], f: impl Fn(&PatentRecord) -> Option<T>) -> Result<Vec<T>> {
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        Ok(read(&self.patents)?
            .values()
            .filter(|r| wanted.contains(&r.id()))
            .filter_map(f)
            .collect())
    }
}

impl Default for InMemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpus {
    async fn count_matching(&self, predicate: &Predicate) -> Result<usize> {
        Ok(self.matching(predicate)?.len())
    }

    async fn resolve_ids(&self, predicate: &Predicate) -> Result<Vec<i64>> {
        self.matching(predicate)
    }

    async fn load_patents(&self, ids: &[i64]) -> Result<Vec<PatentRecord>> {
        self.select(ids, |r| Some(r.clone()))
    }

    async fn numeric_values(&self, ids: &[i64], field: StatField) -> Result<Vec<f64>> {
        self.select(ids, |r| field.value(&r.patent))
    }

    async fn citations_touching(&self, ids: &[i64]) -> Result<Vec<Citation>> {
        let wanted: HashSet<i64> = ids.iter().copied().collect();
        let touches = |side: Option<i64>| side.is_some_and(|id| wanted.contains(&id));
        Ok(read(&self.citations)?
            .iter()
            .filter(|c| touches(c.citing_patent_id) || touches(c.cited_patent_id))
            .cloned()
            .collect())
    }

    async fn patent_summaries(&self, ids: &[i64]) -> Result<Vec<PatentSummary>> {
        self.select(ids, |r| Some(PatentSummary::from(&r.patent)))
    }

    async fn cpc_titles(&self, codes: &[String]) -> Result<HashMap<String, String>> {
        let cpc = read(&self.cpc)?;
        Ok(codes
            .iter()
            .filter_map(|c| cpc.get(c).map(|e| (c.clone(), e.title.clone())))
            .collect())
    }

    async fn unknown_cpc_codes(&self, level: CpcLevel, codes: &[String]) -> Result<Vec<String>> {
        let cpc = read(&self.cpc)?;
        Ok(codes
            .iter()
            .filter(|c| !cpc.get(*c).is_some_and(|e| e.level == level))
            .cloned()
            .collect())
    }
}

/// In-memory report store with sequential ids starting at 1.
pub struct InMemoryReportStore {
    next_id: Mutex<i64>,
    reports: RwLock<BTreeMap<i64, Report>>,
}

impl InMemoryReportStore {
    pub fn new() -> Self {
        Self {
            next_id: Mutex::new(1),
            reports: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for InMemoryReportStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn create(&self, new: NewReport) -> Result<Report> {
        let id = {
            let mut next = self
                .next_id
                .lock()
                .map_err(|_| anyhow!("in-memory store lock poisoned"))?;
            let id = *next;
            *next += 1;
            id
        };
        let report = Report {
            id,
            owner: new.owner,
            notify_owner: new.notify_owner,
            filters: new.filters,
            status: new.status,
            results: None,
            patent_ids: None,
            created_at: chrono::Utc::now().timestamp(),
            analysis_started_at: None,
            analysis_ended_at: None,
            executed_successfully: None,
        };
        write(&self.reports)?.insert(id, report.clone());
        Ok(report)
    }

    async fn get(&self, id: i64) -> Result<Option<Report>> {
        Ok(read(&self.reports)?.get(&id).cloned())
    }

    async fn list(&self, owner: &str) -> Result<Vec<Report>> {
        let mut reports: Vec<Report> = read(&self.reports)?
            .values()
            .filter(|r| r.owner == owner)
            .cloned()
            .collect();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(reports)
    }

    async fn save(&self, report: &Report) -> Result<bool> {
        let mut reports = write(&self.reports)?;
        match reports.get_mut(&report.id) {
            Some(slot) => {
                *slot = report.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        Ok(write(&self.reports)?.remove(&id).is_some())
    }
}

/// In-memory blob store.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .blobs
            .read()
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        write(&self.blobs)?.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(read(&self.blobs)?.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        write(&self.blobs)?.remove(key);
        Ok(())
    }
}

/// Notifier that keeps every notification it receives.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        write(&self.sent)?.push(notification.clone());
        Ok(())
    }
}
