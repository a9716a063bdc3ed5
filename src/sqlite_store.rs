//! SQLite-backed [`CorpusStore`] and [`ReportStore`] implementations.
//!
//! Predicates are translated with [`crate::sql::translate`] once per
//! query. Id lists are bound in batches of [`ID_BATCH`] so large reports
//! stay under SQLite's variable limit.

use std::collections::{BTreeMap, HashMap, HashSet};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use patent_inspector_core::filter::{FilterSpec, Predicate};
use patent_inspector_core::models::{
    Assignee, Citation, CpcLevel, GeoPoint, Inventor, Location, Patent, PatentRecord, PctRecord,
    PatentSummary,
};
use patent_inspector_core::results::ResultsDocument;
use patent_inspector_core::stats::StatField;
use patent_inspector_core::store::{CorpusStore, NewReport, Report, ReportStore};

use crate::sql::{placeholders, translate, ID_BATCH};

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("Invalid stored date: {}", s))
}

fn parse_opt_date(s: Option<String>) -> Result<Option<NaiveDate>> {
    s.as_deref().map(parse_date).transpose()
}

pub(crate) fn cpc_table(level: CpcLevel) -> &'static str {
    match level {
        CpcLevel::Section => "cpc_sections",
        CpcLevel::Class => "cpc_classes",
        CpcLevel::Subclass => "cpc_subclasses",
        CpcLevel::Group => "cpc_groups",
    }
}

/// SQLite implementation of [`CorpusStore`].
pub struct SqliteCorpus {
    pool: SqlitePool,
}

impl SqliteCorpus {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Drop bounding-box candidates that fall outside the radius. Only the
    /// inventor and assignee rows are read; every other clause is already
    /// exact in SQL.
    async fn refine_geo(&self, predicate: &Predicate, ids: Vec<i64>) -> Result<Vec<i64>> {
        let geo = predicate.geo_part();
        let mut inventors: HashMap<i64, Vec<Inventor>> = HashMap::new();
        for (patent_id, inventor) in self.fetch_inventors(&ids).await? {
            inventors.entry(patent_id).or_default().push(inventor);
        }
        let mut assignees: HashMap<i64, Vec<Assignee>> = HashMap::new();
        for (patent_id, assignee) in self.fetch_assignees(&ids).await? {
            assignees.entry(patent_id).or_default().push(assignee);
        }
        Ok(ids
            .into_iter()
            .filter(|id| {
                geo.matches_parties(
                    inventors.get(id).map_or(&[][..], Vec::as_slice),
                    assignees.get(id).map_or(&[][..], Vec::as_slice),
                )
            })
            .collect())
    }

    async fn fetch_inventors(&self, ids: &[i64]) -> Result<Vec<(i64, Inventor)>> {
        let rows = self
            .fetch_related(
                "SELECT i.patent_id, i.first_name, i.last_name, i.location_id, \
                 l.country_code, l.state, l.city, l.lat, l.lng \
                 FROM inventors i LEFT JOIN locations l ON l.id = i.location_id",
                ids,
                "i.id",
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                (
                    row.get::<i64, _>("patent_id"),
                    Inventor {
                        first_name: row.get("first_name"),
                        last_name: row.get("last_name"),
                        location: row_to_location(row),
                    },
                )
            })
            .collect())
    }

    async fn fetch_assignees(&self, ids: &[i64]) -> Result<Vec<(i64, Assignee)>> {
        let rows = self
            .fetch_related(
                "SELECT a.patent_id, a.first_name, a.last_name, a.organization, a.is_organization, \
                 a.location_id, l.country_code, l.state, l.city, l.lat, l.lng \
                 FROM assignees a LEFT JOIN locations l ON l.id = a.location_id",
                ids,
                "a.id",
            )
            .await?;
        Ok(rows
            .iter()
            .map(|row| {
                let is_org: Option<i64> = row.get("is_organization");
                (
                    row.get::<i64, _>("patent_id"),
                    Assignee {
                        first_name: row.get("first_name"),
                        last_name: row.get("last_name"),
                        organization: row.get("organization"),
                        is_organization: is_org.map(|v| v != 0),
                        location: row_to_location(row),
                    },
                )
            })
            .collect())
    }

    /// Candidate ids from SQL alone. Exact only when the predicate has no
    /// geo clause.
    async fn candidate_ids(&self, predicate: &Predicate) -> Result<(Vec<i64>, bool)> {
        let filter = translate(predicate);
        let sql = format!(
            "SELECT p.id FROM patents p WHERE {} ORDER BY p.id",
            filter.clause
        );
        let rows = filter
            .bind_to(sqlx::query(&sql))
            .fetch_all(&self.pool)
            .await?;
        let ids = rows.iter().map(|r| r.get::<i64, _>("id")).collect();
        Ok((ids, filter.needs_refine))
    }

    async fn fetch_patents(&self, ids: &[i64]) -> Result<Vec<Patent>> {
        let mut patents = Vec::with_capacity(ids.len());
        for batch in ids.chunks(ID_BATCH) {
            let sql = format!(
                "SELECT * FROM patents WHERE id IN ({}) ORDER BY id",
                placeholders(batch.len())
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(*id);
            }
            for row in query.fetch_all(&self.pool).await? {
                patents.push(row_to_patent(&row)?);
            }
        }
        Ok(patents)
    }

    /// Rows of a per-patent table for every id, in batches.
    async fn fetch_related(&self, select: &str, ids: &[i64], order: &str) -> Result<Vec<SqliteRow>> {
        let mut rows = Vec::new();
        for batch in ids.chunks(ID_BATCH) {
            let sql = format!(
                "{} WHERE patent_id IN ({}) ORDER BY {}",
                select,
                placeholders(batch.len()),
                order
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(*id);
            }
            rows.extend(query.fetch_all(&self.pool).await?);
        }
        Ok(rows)
    }
}

fn row_to_patent(row: &SqliteRow) -> Result<Patent> {
    let granted: String = row.get("granted_date");
    Ok(Patent {
        id: row.get("id"),
        office: row.get("office"),
        office_patent_id: row.get("office_patent_id"),
        patent_type: row.get("type"),
        application_filed_date: parse_opt_date(row.get("application_filed_date"))?,
        granted_date: parse_date(&granted)?,
        title: row.get("title"),
        abstract_text: row.get("abstract"),
        title_processed: row.get("title_processed"),
        abstract_processed: row.get("abstract_processed"),
        claims_count: row.get("claims_count"),
        figures_count: row.get("figures_count"),
        sheets_count: row.get("sheets_count"),
        withdrawn: row.get::<i64, _>("withdrawn") != 0,
        granted_year: row.get("granted_year"),
        application_year: row.get("application_year"),
        years_to_grant: row.get("years_to_grant"),
        title_word_count_raw: row.get("title_word_count_raw"),
        title_word_count_processed: row.get("title_word_count_processed"),
        abstract_word_count_raw: row.get("abstract_word_count_raw"),
        abstract_word_count_processed: row.get("abstract_word_count_processed"),
        cpc_groups_count: row.get("cpc_groups_count"),
        assignee_count: row.get("assignee_count"),
        inventor_count: row.get("inventor_count"),
        incoming_citations_count: row.get("incoming_citations_count"),
        outgoing_citations_count: row.get("outgoing_citations_count"),
    })
}

fn row_to_location(row: &SqliteRow) -> Option<Location> {
    let location_id: Option<i64> = row.get("location_id");
    location_id?;
    let lat: Option<f64> = row.get("lat");
    let lng: Option<f64> = row.get("lng");
    Some(Location {
        country_code: row.get("country_code"),
        state: row.get("state"),
        city: row.get("city"),
        point: lat.zip(lng).map(|(lat, lng)| GeoPoint { lat, lng }),
    })
}

fn row_to_citation(row: &SqliteRow) -> Result<Citation> {
    Ok(Citation {
        id: row.get("id"),
        citing_patent_id: row.get("citing_patent_id"),
        cited_patent_id: row.get("cited_patent_id"),
        citation_date: parse_opt_date(row.get("citation_date"))?,
        citation_year: row.get("citation_year"),
        cited_patent_number: row.get("cited_patent_number"),
        cited_patent_office: row.get("cited_patent_office"),
    })
}

#[async_trait]
impl CorpusStore for SqliteCorpus {
    async fn count_matching(&self, predicate: &Predicate) -> Result<usize> {
        if predicate.has_geo() {
            return Ok(self.resolve_ids(predicate).await?.len());
        }
        let filter = translate(predicate);
        let sql = format!("SELECT COUNT(*) AS n FROM patents p WHERE {}", filter.clause);
        let row = filter
            .bind_to(sqlx::query(&sql))
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("n") as usize)
    }

    async fn resolve_ids(&self, predicate: &Predicate) -> Result<Vec<i64>> {
        let (ids, needs_refine) = self.candidate_ids(predicate).await?;
        if !needs_refine {
            return Ok(ids);
        }
        self.refine_geo(predicate, ids).await
    }

    async fn load_patents(&self, ids: &[i64]) -> Result<Vec<PatentRecord>> {
        let mut ids = ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        let mut records: BTreeMap<i64, PatentRecord> = self
            .fetch_patents(&ids)
            .await?
            .into_iter()
            .map(|patent| {
                (
                    patent.id,
                    PatentRecord {
                        patent,
                        cpc_groups: Vec::new(),
                        pct: Vec::new(),
                        inventors: Vec::new(),
                        assignees: Vec::new(),
                    },
                )
            })
            .collect();

        let cpc_rows = self
            .fetch_related(
                "SELECT patent_id, cpc_group_code FROM patent_cpc_groups",
                &ids,
                "patent_id, cpc_group_code",
            )
            .await?;
        for row in cpc_rows {
            if let Some(r) = records.get_mut(&row.get::<i64, _>("patent_id")) {
                r.cpc_groups.push(row.get("cpc_group_code"));
            }
        }

        let pct_rows = self
            .fetch_related(
                "SELECT patent_id, pct_id, published_or_filed_date, filed_country, granted FROM pct_data",
                &ids,
                "id",
            )
            .await?;
        for row in pct_rows {
            if let Some(r) = records.get_mut(&row.get::<i64, _>("patent_id")) {
                let date: String = row.get("published_or_filed_date");
                r.pct.push(PctRecord {
                    pct_id: row.get("pct_id"),
                    published_or_filed_date: parse_date(&date)?,
                    filed_country: row.get("filed_country"),
                    granted: row.get::<i64, _>("granted") != 0,
                });
            }
        }

        for (patent_id, inventor) in self.fetch_inventors(&ids).await? {
            if let Some(r) = records.get_mut(&patent_id) {
                r.inventors.push(inventor);
            }
        }
        for (patent_id, assignee) in self.fetch_assignees(&ids).await? {
            if let Some(r) = records.get_mut(&patent_id) {
                r.assignees.push(assignee);
            }
        }

        Ok(records.into_values().collect())
    }

    async fn numeric_values(&self, ids: &[i64], field: StatField) -> Result<Vec<f64>> {
        let column = field.column();
        let mut values = Vec::new();
        for batch in ids.chunks(ID_BATCH) {
            let sql = format!(
                "SELECT CAST({col} AS REAL) AS v FROM patents WHERE id IN ({ph}) AND {col} IS NOT NULL",
                col = column,
                ph = placeholders(batch.len())
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(*id);
            }
            for row in query.fetch_all(&self.pool).await? {
                values.push(row.get::<f64, _>("v"));
            }
        }
        Ok(values)
    }

    async fn citations_touching(&self, ids: &[i64]) -> Result<Vec<Citation>> {
        let mut citations: BTreeMap<i64, Citation> = BTreeMap::new();
        for batch in ids.chunks(ID_BATCH) {
            let ph = placeholders(batch.len());
            let sql = format!(
                "SELECT * FROM patent_citations \
                 WHERE citing_patent_id IN ({ph}) OR cited_patent_id IN ({ph})"
            );
            let mut query = sqlx::query(&sql);
            for id in batch.iter().chain(batch) {
                query = query.bind(*id);
            }
            for row in query.fetch_all(&self.pool).await? {
                let citation = row_to_citation(&row)?;
                citations.insert(citation.id, citation);
            }
        }
        Ok(citations.into_values().collect())
    }

    async fn patent_summaries(&self, ids: &[i64]) -> Result<Vec<PatentSummary>> {
        let mut summaries = Vec::with_capacity(ids.len());
        for batch in ids.chunks(ID_BATCH) {
            let sql = format!(
                "SELECT id, office, office_patent_id, title, granted_date FROM patents \
                 WHERE id IN ({}) ORDER BY id",
                placeholders(batch.len())
            );
            let mut query = sqlx::query(&sql);
            for id in batch {
                query = query.bind(*id);
            }
            for row in query.fetch_all(&self.pool).await? {
                let office: String = row.get("office");
                let number: String = row.get("office_patent_id");
                let granted: String = row.get("granted_date");
                summaries.push(PatentSummary {
                    id: row.get("id"),
                    code: format!("{}{}", office, number),
                    title: row.get("title"),
                    granted_date: parse_date(&granted)?,
                });
            }
        }
        Ok(summaries)
    }

    async fn cpc_titles(&self, codes: &[String]) -> Result<HashMap<String, String>> {
        let mut titles = HashMap::new();
        for level in CpcLevel::ALL {
            for batch in codes.chunks(ID_BATCH) {
                let sql = format!(
                    "SELECT code, title FROM {} WHERE code IN ({})",
                    cpc_table(level),
                    placeholders(batch.len())
                );
                let mut query = sqlx::query(&sql);
                for code in batch {
                    query = query.bind(code.as_str());
                }
                for row in query.fetch_all(&self.pool).await? {
                    titles.insert(row.get("code"), row.get("title"));
                }
            }
        }
        Ok(titles)
    }

    async fn unknown_cpc_codes(&self, level: CpcLevel, codes: &[String]) -> Result<Vec<String>> {
        let mut known = HashSet::new();
        for batch in codes.chunks(ID_BATCH) {
            let sql = format!(
                "SELECT code FROM {} WHERE code IN ({})",
                cpc_table(level),
                placeholders(batch.len())
            );
            let mut query = sqlx::query(&sql);
            for code in batch {
                query = query.bind(code.as_str());
            }
            for row in query.fetch_all(&self.pool).await? {
                known.insert(row.get::<String, _>("code"));
            }
        }
        Ok(codes
            .iter()
            .filter(|c| !known.contains(*c))
            .cloned()
            .collect())
    }
}

/// SQLite implementation of [`ReportStore`]. Filters, results and the id
/// snapshot are stored as JSON text.
pub struct SqliteReports {
    pool: SqlitePool,
}

impl SqliteReports {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).context("Failed to serialize report column")
}

fn row_to_report(row: &SqliteRow) -> Result<Report> {
    let filters: String = row.get("filters_json");
    let status: String = row.get("status");
    let results: Option<String> = row.get("results_json");
    let patent_ids: Option<String> = row.get("patent_ids_json");
    let succeeded: Option<i64> = row.get("executed_successfully");

    Ok(Report {
        id: row.get("id"),
        owner: row.get("owner"),
        notify_owner: row.get::<i64, _>("notify_owner") != 0,
        filters: serde_json::from_str::<FilterSpec>(&filters)
            .context("Invalid filters_json in reports table")?,
        status: status.parse()?,
        results: results
            .as_deref()
            .map(serde_json::from_str::<ResultsDocument>)
            .transpose()
            .context("Invalid results_json in reports table")?,
        patent_ids: patent_ids
            .as_deref()
            .map(serde_json::from_str::<Vec<i64>>)
            .transpose()
            .context("Invalid patent_ids_json in reports table")?,
        created_at: row.get("created_at"),
        analysis_started_at: row.get("analysis_started_at"),
        analysis_ended_at: row.get("analysis_ended_at"),
        executed_successfully: succeeded.map(|v| v != 0),
    })
}

#[async_trait]
impl ReportStore for SqliteReports {
    async fn create(&self, new: NewReport) -> Result<Report> {
        let created_at = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO reports (owner, notify_owner, filters_json, status, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&new.owner)
        .bind(new.notify_owner)
        .bind(to_json(&new.filters)?)
        .bind(new.status.as_str())
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(Report {
            id: result.last_insert_rowid(),
            owner: new.owner,
            notify_owner: new.notify_owner,
            filters: new.filters,
            status: new.status,
            results: None,
            patent_ids: None,
            created_at,
            analysis_started_at: None,
            analysis_ended_at: None,
            executed_successfully: None,
        })
    }

    async fn get(&self, id: i64) -> Result<Option<Report>> {
        let row = sqlx::query("SELECT * FROM reports WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_report).transpose()
    }

    async fn list(&self, owner: &str) -> Result<Vec<Report>> {
        let rows = sqlx::query(
            "SELECT * FROM reports WHERE owner = ? ORDER BY created_at DESC, id DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(row_to_report).collect()
    }

    async fn save(&self, report: &Report) -> Result<bool> {
        let results = report.results.as_ref().map(to_json).transpose()?;
        let patent_ids = report.patent_ids.as_ref().map(to_json).transpose()?;
        let result = sqlx::query(
            r#"
            UPDATE reports SET
                owner = ?,
                notify_owner = ?,
                filters_json = ?,
                status = ?,
                results_json = ?,
                patent_ids_json = ?,
                analysis_started_at = ?,
                analysis_ended_at = ?,
                executed_successfully = ?
            WHERE id = ?
            "#,
        )
        .bind(&report.owner)
        .bind(report.notify_owner)
        .bind(to_json(&report.filters)?)
        .bind(report.status.as_str())
        .bind(results)
        .bind(patent_ids)
        .bind(report.analysis_started_at)
        .bind(report.analysis_ended_at)
        .bind(report.executed_successfully)
        .bind(report.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM reports WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
