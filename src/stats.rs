//! Corpus and report overview.
//!
//! `pinspect corpus-stats` prints row counts for the corpus tables, the
//! grant year span, a per-type breakdown and report status totals. Useful
//! after an import to confirm what a report would see.

use anyhow::Result;
use sqlx::Row;

use crate::config::Config;
use crate::db;

/// Per-type breakdown of the patents table.
struct TypeStats {
    patent_type: String,
    patents: i64,
    first_year: Option<i64>,
    last_year: Option<i64>,
}

async fn count(pool: &sqlx::SqlitePool, table: &str) -> Result<i64> {
    let n: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await?;
    Ok(n)
}

/// Run the corpus-stats command: query the database and print a summary.
pub async fn run_corpus_stats(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    let total_patents = count(&pool, "patents").await?;
    let total_citations = count(&pool, "patent_citations").await?;
    let total_inventors = count(&pool, "inventors").await?;
    let total_assignees = count(&pool, "assignees").await?;
    let total_pct = count(&pool, "pct_data").await?;
    let cpc_counts = [
        ("sections", count(&pool, "cpc_sections").await?),
        ("classes", count(&pool, "cpc_classes").await?),
        ("subclasses", count(&pool, "cpc_subclasses").await?),
        ("groups", count(&pool, "cpc_groups").await?),
    ];

    let span = sqlx::query("SELECT MIN(granted_date) AS first, MAX(granted_date) AS last FROM patents")
        .fetch_one(&pool)
        .await?;
    let first: Option<String> = span.get("first");
    let last: Option<String> = span.get("last");

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Patent Inspector — Corpus Stats");
    println!("===============================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Patents:     {}", total_patents);
    println!(
        "  Granted:     {} .. {}",
        first.as_deref().unwrap_or("-"),
        last.as_deref().unwrap_or("-")
    );
    println!("  Citations:   {}", total_citations);
    println!("  Inventors:   {}", total_inventors);
    println!("  Assignees:   {}", total_assignees);
    println!("  PCT docs:    {}", total_pct);
    println!(
        "  CPC:         {}",
        cpc_counts
            .iter()
            .map(|(name, n)| format!("{} {}", n, name))
            .collect::<Vec<_>>()
            .join(", ")
    );

    let type_rows = sqlx::query(
        r#"
        SELECT
            COALESCE(type, '(none)') AS patent_type,
            COUNT(*) AS patents,
            MIN(granted_year) AS first_year,
            MAX(granted_year) AS last_year
        FROM patents
        GROUP BY COALESCE(type, '(none)')
        ORDER BY patents DESC, patent_type ASC
        "#,
    )
    .fetch_all(&pool)
    .await?;

    let type_stats: Vec<TypeStats> = type_rows
        .iter()
        .map(|row| TypeStats {
            patent_type: row.get("patent_type"),
            patents: row.get("patents"),
            first_year: row.get("first_year"),
            last_year: row.get("last_year"),
        })
        .collect();

    if !type_stats.is_empty() {
        println!();
        println!("  By type:");
        println!("  {:<24} {:>8}   {}", "TYPE", "PATENTS", "YEARS");
        println!("  {}", "-".repeat(48));
        for t in &type_stats {
            let years = match (t.first_year, t.last_year) {
                (Some(a), Some(b)) => format!("{}-{}", a, b),
                _ => "-".to_string(),
            };
            println!("  {:<24} {:>8}   {}", t.patent_type, t.patents, years);
        }
    }

    let status_rows = sqlx::query(
        "SELECT status, COUNT(*) AS n FROM reports GROUP BY status ORDER BY status",
    )
    .fetch_all(&pool)
    .await?;
    if !status_rows.is_empty() {
        println!();
        println!("  Reports:");
        for row in &status_rows {
            let status: String = row.get("status");
            let n: i64 = row.get("n");
            println!("    {:<28} {:>6}", status, n);
        }
    }

    println!();

    pool.close().await;
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_sizes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}
