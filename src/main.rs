//! # Patent Inspector CLI (`pinspect`)
//!
//! The `pinspect` binary drives the report engine locally: it initializes
//! the database, imports fixture corpora, submits reports and reruns topic
//! models on an in-process worker pool, and prints results as JSON.
//!
//! ## Usage
//!
//! ```bash
//! pinspect --config ./config/pinspect.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pinspect init` | Create the SQLite database and run schema migrations |
//! | `pinspect import <file>` | Load a JSON fixture corpus |
//! | `pinspect corpus-stats` | Print corpus and report totals |
//! | `pinspect submit <filters.json>` | Create a report and run its analysis |
//! | `pinspect show <id>` | Print a report as JSON |
//! | `pinspect list` | List the owner's reports |
//! | `pinspect rerun <id>` | Refit the topic model with new parameters |
//! | `pinspect export <id>` | Write the report's `.xlsx` export |
//! | `pinspect delete <id>` | Delete a report and its export |
//! | `pinspect completions <shell>` | Print shell completions |
//!
//! ## Examples
//!
//! ```bash
//! pinspect init
//! pinspect import ./fixtures/corpus.json
//! pinspect submit ./filters.json --owner alice --notify
//! pinspect rerun 1 --owner alice --method NMF --topics 5 --max-df 0.7
//! pinspect export 1 --owner alice --output ./report-1.xlsx
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{CommandFactory, Parser, Subcommand};

use patent_inspector::report::{ReportService, RerunOutcome};
use patent_inspector::{config, export, import, logging, migrate, stats};
use patent_inspector_core::filter::FilterSpec;
use patent_inspector_core::topics::{TopicMethod, TopicParams};

/// Patent Inspector CLI: analytical reports over a patent corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "pinspect",
    about = "Patent Inspector: analytical reports over a patent corpus",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/pinspect.toml")]
    config: PathBuf,

    /// Report owner. Reports of other owners are invisible.
    #[arg(long, global = true, default_value = "local")]
    owner: String,

    /// Debug-level logging (overridden by `PINSPECT_LOG`).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Import a JSON fixture of CPC entries, patents and citations.
    Import {
        /// Fixture file.
        file: PathBuf,
    },

    /// Print corpus row counts and report status totals.
    CorpusStats,

    /// Submit a report and wait for its analysis to finish.
    Submit {
        /// JSON file holding the filter specification.
        filters: PathBuf,

        /// Notify the owner when the analysis finishes.
        #[arg(long)]
        notify: bool,
    },

    /// Print a report as JSON.
    Show { id: i64 },

    /// List reports, newest first.
    List,

    /// Refit a report's topic model and wait for it to finish.
    ///
    /// Omitted options take their defaults; omitted dates are derived from
    /// the latest grant date of the report's patents.
    Rerun {
        id: i64,

        /// `LDA` or `NMF`.
        #[arg(long, default_value = "LDA")]
        method: String,

        /// Number of topics.
        #[arg(long, default_value_t = 10)]
        topics: usize,

        /// Words per topic.
        #[arg(long, default_value_t = 10)]
        words: usize,

        /// Window start (YYYY-MM-DD).
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Window end (YYYY-MM-DD).
        #[arg(long)]
        end: Option<NaiveDate>,

        /// Most frequent terms dropped before fitting (LDA).
        #[arg(long, default_value_t = 20)]
        rm_top: usize,

        /// Maximum document frequency kept by TF-IDF (NMF).
        #[arg(long, default_value_t = 0.8)]
        max_df: f64,
    },

    /// Write a report's spreadsheet export.
    Export {
        id: i64,

        /// Output file. Defaults to stdout.
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Delete a report and its export.
    Delete { id: i64 },

    /// Print shell completions.
    Completions { shell: clap_complete::Shell },
}

fn read_filters(path: &Path) -> Result<FilterSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read filters: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse filters: {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn format_ts(ts: Option<i64>) -> String {
    ts.and_then(|ts| chrono::DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "pinspect", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    let owner = cli.owner.as_str();

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Import { file } => {
            import::run_import(&cfg, &file).await?;
        }
        Commands::CorpusStats => {
            stats::run_corpus_stats(&cfg).await?;
        }
        Commands::Submit { filters, notify } => {
            let spec = read_filters(&filters)?;
            let service = ReportService::open(&cfg).await?;
            let id = service.submit(owner, spec, notify).await?;
            service.shutdown().await;
            print_json(&service.get(owner, id).await?)?;
        }
        Commands::Show { id } => {
            let service = ReportService::open(&cfg).await?;
            print_json(&service.get(owner, id).await?)?;
        }
        Commands::List => {
            let service = ReportService::open(&cfg).await?;
            let reports = service.list(owner).await?;
            println!(
                "{:>6}  {:<28} {:<17} {:<8} {}",
                "ID", "STATUS", "CREATED", "SUCCESS", "PATENTS"
            );
            for r in &reports {
                let success = match r.executed_successfully {
                    Some(true) => "yes",
                    Some(false) => "no",
                    None => "-",
                };
                let patents = r
                    .results
                    .as_ref()
                    .and_then(|res| res.patents_count)
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>6}  {:<28} {:<17} {:<8} {}",
                    r.id,
                    r.status,
                    format_ts(Some(r.created_at)),
                    success,
                    patents
                );
            }
        }
        Commands::Rerun {
            id,
            method,
            topics,
            words,
            start,
            end,
            rm_top,
            max_df,
        } => {
            let params = TopicParams {
                method: method.parse::<TopicMethod>()?,
                n_topics: topics,
                n_words: words,
                start_date: start,
                end_date: end,
                rm_top,
                max_df,
            };
            let service = ReportService::open(&cfg).await?;
            match service.rerun_topic_modeling(owner, id, params).await? {
                RerunOutcome::Accepted => {
                    service.shutdown().await;
                    print_json(&service.get(owner, id).await?)?;
                }
                RerunOutcome::Unchanged => {
                    eprintln!("Topic parameters unchanged; nothing to recompute.");
                }
                RerunOutcome::Busy => {
                    anyhow::bail!("Report {} is still being processed", id);
                }
            }
        }
        Commands::Export { id, output } => {
            let service = ReportService::open(&cfg).await?;
            let bytes = service.download_export(owner, id).await?;
            export::write_output(&bytes, output.as_deref())?;
        }
        Commands::Delete { id } => {
            let service = ReportService::open(&cfg).await?;
            service.delete(owner, id).await?;
            println!("Deleted report {}.", id);
        }
        Commands::Completions { .. } => {}
    }

    Ok(())
}
