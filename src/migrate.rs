use anyhow::{Context, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Corpus tables. CPC membership is derived from code prefixes, so the
/// hierarchy tables carry no parent columns.
const CORPUS_TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS cpc_sections (
        code TEXT PRIMARY KEY,
        title TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cpc_classes (
        code TEXT PRIMARY KEY,
        title TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cpc_subclasses (
        code TEXT PRIMARY KEY,
        title TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS cpc_groups (
        code TEXT PRIMARY KEY,
        title TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS patents (
        id INTEGER PRIMARY KEY,
        office TEXT NOT NULL,
        office_patent_id TEXT NOT NULL,
        type TEXT,
        application_filed_date TEXT,
        granted_date TEXT NOT NULL,
        title TEXT NOT NULL,
        abstract TEXT,
        title_processed TEXT,
        abstract_processed TEXT,
        claims_count INTEGER NOT NULL,
        figures_count INTEGER,
        sheets_count INTEGER,
        withdrawn INTEGER NOT NULL DEFAULT 0,
        granted_year INTEGER,
        application_year INTEGER,
        years_to_grant REAL,
        title_word_count_raw INTEGER,
        title_word_count_processed INTEGER,
        abstract_word_count_raw INTEGER,
        abstract_word_count_processed INTEGER,
        cpc_groups_count INTEGER,
        assignee_count INTEGER,
        inventor_count INTEGER,
        incoming_citations_count INTEGER,
        outgoing_citations_count INTEGER,
        UNIQUE(office, office_patent_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS patent_cpc_groups (
        patent_id INTEGER NOT NULL,
        cpc_group_code TEXT NOT NULL,
        PRIMARY KEY (patent_id, cpc_group_code),
        FOREIGN KEY (patent_id) REFERENCES patents(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pct_data (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patent_id INTEGER NOT NULL,
        pct_id TEXT NOT NULL,
        published_or_filed_date TEXT NOT NULL,
        filed_country TEXT,
        granted INTEGER NOT NULL DEFAULT 0,
        FOREIGN KEY (patent_id) REFERENCES patents(id) ON DELETE CASCADE
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS locations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        country_code TEXT,
        state TEXT,
        city TEXT,
        lat REAL,
        lng REAL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS inventors (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patent_id INTEGER NOT NULL,
        first_name TEXT,
        last_name TEXT,
        location_id INTEGER,
        FOREIGN KEY (patent_id) REFERENCES patents(id) ON DELETE CASCADE,
        FOREIGN KEY (location_id) REFERENCES locations(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS assignees (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        patent_id INTEGER NOT NULL,
        first_name TEXT,
        last_name TEXT,
        organization TEXT,
        is_organization INTEGER,
        location_id INTEGER,
        FOREIGN KEY (patent_id) REFERENCES patents(id) ON DELETE CASCADE,
        FOREIGN KEY (location_id) REFERENCES locations(id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS patent_citations (
        id INTEGER PRIMARY KEY,
        citing_patent_id INTEGER,
        cited_patent_id INTEGER,
        citation_date TEXT,
        citation_year INTEGER,
        cited_patent_number TEXT,
        cited_patent_office TEXT
    )
    "#,
];

const REPORT_TABLES: &[&str] = &[r#"
    CREATE TABLE IF NOT EXISTS reports (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        owner TEXT NOT NULL,
        notify_owner INTEGER NOT NULL DEFAULT 0,
        filters_json TEXT NOT NULL,
        status TEXT NOT NULL,
        results_json TEXT,
        patent_ids_json TEXT,
        created_at INTEGER NOT NULL,
        analysis_started_at INTEGER,
        analysis_ended_at INTEGER,
        executed_successfully INTEGER
    )
    "#];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_patents_granted_date ON patents(granted_date)",
    "CREATE INDEX IF NOT EXISTS idx_patents_office_type ON patents(office, type)",
    "CREATE INDEX IF NOT EXISTS idx_patent_cpc_groups_code ON patent_cpc_groups(cpc_group_code)",
    "CREATE INDEX IF NOT EXISTS idx_pct_data_patent_id ON pct_data(patent_id)",
    "CREATE INDEX IF NOT EXISTS idx_inventors_patent_id ON inventors(patent_id)",
    "CREATE INDEX IF NOT EXISTS idx_assignees_patent_id ON assignees(patent_id)",
    "CREATE INDEX IF NOT EXISTS idx_citations_citing ON patent_citations(citing_patent_id)",
    "CREATE INDEX IF NOT EXISTS idx_citations_cited ON patent_citations(cited_patent_id)",
    "CREATE INDEX IF NOT EXISTS idx_reports_owner_created ON reports(owner, created_at DESC)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    create_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Idempotently create every table and index on an open pool.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    for statement in CORPUS_TABLES
        .iter()
        .chain(REPORT_TABLES)
        .chain(INDEXES)
    {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Migration failed: {}", statement.trim()))?;
    }
    Ok(())
}
