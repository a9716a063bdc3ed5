//! JSON fixture import.
//!
//! Loads a small corpus into SQLite so the CLI and tests have something to
//! analyze. The fixture mirrors the core models:
//!
//! ```json
//! {
//!   "cpc": [{ "level": "section", "code": "H", "title": "Electricity" }],
//!   "patents": [{ "id": 1, "office": "US", "office_patent_id": "9000001", ... }],
//!   "citations": [{ "id": 1, "citing_patent_id": 2, "cited_patent_id": 1 }]
//! }
//! ```
//!
//! Re-importing a patent replaces it together with its related rows.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use sqlx::{Sqlite, SqlitePool, Transaction};

use patent_inspector_core::models::{Citation, CpcEntry, Location, PatentRecord};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::cpc_table;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Fixture {
    pub cpc: Vec<CpcEntry>,
    pub patents: Vec<PatentRecord>,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub cpc_entries: usize,
    pub patents: usize,
    pub citations: usize,
}

pub fn read_fixture(path: &Path) -> Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read fixture: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse fixture: {}", path.display()))
}

/// Write every entry of `fixture` in a single transaction.
pub async fn import_fixture(pool: &SqlitePool, fixture: &Fixture) -> Result<ImportSummary> {
    let mut tx = pool.begin().await?;

    for entry in &fixture.cpc {
        let sql = format!(
            "INSERT INTO {} (code, title) VALUES (?, ?) \
             ON CONFLICT(code) DO UPDATE SET title = excluded.title",
            cpc_table(entry.level)
        );
        sqlx::query(&sql)
            .bind(&entry.code)
            .bind(&entry.title)
            .execute(&mut *tx)
            .await?;
    }

    for record in &fixture.patents {
        insert_patent(&mut tx, record)
            .await
            .with_context(|| format!("Failed to import patent {}", record.patent.code()))?;
    }

    for c in &fixture.citations {
        sqlx::query(
            r#"
            INSERT INTO patent_citations (id, citing_patent_id, cited_patent_id, citation_date, citation_year, cited_patent_number, cited_patent_office)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                citing_patent_id = excluded.citing_patent_id,
                cited_patent_id = excluded.cited_patent_id,
                citation_date = excluded.citation_date,
                citation_year = excluded.citation_year,
                cited_patent_number = excluded.cited_patent_number,
                cited_patent_office = excluded.cited_patent_office
            "#,
        )
        .bind(c.id)
        .bind(c.citing_patent_id)
        .bind(c.cited_patent_id)
        .bind(c.citation_date.map(|d| d.to_string()))
        .bind(c.citation_year)
        .bind(&c.cited_patent_number)
        .bind(&c.cited_patent_office)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(ImportSummary {
        cpc_entries: fixture.cpc.len(),
        patents: fixture.patents.len(),
        citations: fixture.citations.len(),
    })
}

async fn insert_patent(tx: &mut Transaction<'_, Sqlite>, record: &PatentRecord) -> Result<()> {
    let p = &record.patent;

    for table in ["patent_cpc_groups", "pct_data", "inventors", "assignees"] {
        sqlx::query(&format!("DELETE FROM {} WHERE patent_id = ?", table))
            .bind(p.id)
            .execute(&mut **tx)
            .await?;
    }
    sqlx::query("DELETE FROM patents WHERE id = ?")
        .bind(p.id)
        .execute(&mut **tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO patents (
            id, office, office_patent_id, type, application_filed_date, granted_date,
            title, abstract, title_processed, abstract_processed,
            claims_count, figures_count, sheets_count, withdrawn,
            granted_year, application_year, years_to_grant,
            title_word_count_raw, title_word_count_processed,
            abstract_word_count_raw, abstract_word_count_processed,
            cpc_groups_count, assignee_count, inventor_count,
            incoming_citations_count, outgoing_citations_count
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(p.id)
    .bind(&p.office)
    .bind(&p.office_patent_id)
    .bind(&p.patent_type)
    .bind(p.application_filed_date.map(|d| d.to_string()))
    .bind(p.granted_date.to_string())
    .bind(&p.title)
    .bind(&p.abstract_text)
    .bind(&p.title_processed)
    .bind(&p.abstract_processed)
    .bind(p.claims_count)
    .bind(p.figures_count)
    .bind(p.sheets_count)
    .bind(p.withdrawn)
    .bind(p.granted_year)
    .bind(p.application_year)
    .bind(p.years_to_grant)
    .bind(p.title_word_count_raw)
    .bind(p.title_word_count_processed)
    .bind(p.abstract_word_count_raw)
    .bind(p.abstract_word_count_processed)
    .bind(p.cpc_groups_count)
    .bind(p.assignee_count)
    .bind(p.inventor_count)
    .bind(p.incoming_citations_count)
    .bind(p.outgoing_citations_count)
    .execute(&mut **tx)
    .await?;

    for code in &record.cpc_groups {
        sqlx::query(
            "INSERT OR IGNORE INTO patent_cpc_groups (patent_id, cpc_group_code) VALUES (?, ?)",
        )
        .bind(p.id)
        .bind(code)
        .execute(&mut **tx)
        .await?;
    }

    for pct in &record.pct {
        sqlx::query(
            "INSERT INTO pct_data (patent_id, pct_id, published_or_filed_date, filed_country, granted) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(p.id)
        .bind(&pct.pct_id)
        .bind(pct.published_or_filed_date.to_string())
        .bind(&pct.filed_country)
        .bind(pct.granted)
        .execute(&mut **tx)
        .await?;
    }

    for inventor in &record.inventors {
        let location_id = insert_location(tx, inventor.location.as_ref()).await?;
        sqlx::query(
            "INSERT INTO inventors (patent_id, first_name, last_name, location_id) VALUES (?, ?, ?, ?)",
        )
        .bind(p.id)
        .bind(&inventor.first_name)
        .bind(&inventor.last_name)
        .bind(location_id)
        .execute(&mut **tx)
        .await?;
    }

    for assignee in &record.assignees {
        let location_id = insert_location(tx, assignee.location.as_ref()).await?;
        sqlx::query(
            "INSERT INTO assignees (patent_id, first_name, last_name, organization, is_organization, location_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(p.id)
        .bind(&assignee.first_name)
        .bind(&assignee.last_name)
        .bind(&assignee.organization)
        .bind(assignee.is_organization)
        .bind(location_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

async fn insert_location(
    tx: &mut Transaction<'_, Sqlite>,
    location: Option<&Location>,
) -> Result<Option<i64>> {
    let Some(loc) = location else {
        return Ok(None);
    };
    let result = sqlx::query(
        "INSERT INTO locations (country_code, state, city, lat, lng) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&loc.country_code)
    .bind(&loc.state)
    .bind(&loc.city)
    .bind(loc.point.map(|p| p.lat))
    .bind(loc.point.map(|p| p.lng))
    .execute(&mut **tx)
    .await?;
    Ok(Some(result.last_insert_rowid()))
}

/// `pinspect import`: load a fixture file into the configured database.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let fixture = read_fixture(path)?;
    let pool = db::connect(config).await?;
    let summary = import_fixture(&pool, &fixture).await?;
    pool.close().await;

    tracing::info!(
        patents = summary.patents,
        citations = summary.citations,
        cpc = summary.cpc_entries,
        "fixture imported"
    );
    println!(
        "Imported {} patents, {} citations, {} CPC entries from {}",
        summary.patents,
        summary.citations,
        summary.cpc_entries,
        path.display()
    );
    Ok(())
}
