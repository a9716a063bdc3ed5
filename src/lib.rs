//! # Patent Inspector
//!
//! Analytical reports over a patent corpus.
//!
//! A user submits declarative filters; Patent Inspector resolves the
//! matching patents, snapshots their ids, computes five analytical sections
//! concurrently (descriptive statistics, time series, entity breakdowns, a
//! topic model and a citation graph), stores an `.xlsx` export and
//! notifies the owner. Topic models can be refit later with new
//! parameters against the same snapshot.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │   CLI    │──▶│ ReportService │──▶│ TaskQueue  │
//! │(pinspect)│   │ submit/rerun  │   │  workers   │
//! └──────────┘   └──────┬───────┘   └─────┬──────┘
//!                       │                 ▼
//!                       │          ┌────────────┐   ┌──────────┐
//!                       └─────────▶│  Analysis  │──▶│  SQLite  │
//!                                  │  fan-out   │   │  corpus  │
//!                                  └────────────┘   └──────────┘
//! ```
//!
//! Runtime-free logic (models, filter compiler, analytics, store traits)
//! lives in the `patent-inspector-core` crate.
//!
//! ## Quick Start
//!
//! ```bash
//! pinspect init
//! pinspect import ./fixtures/corpus.json
//! pinspect submit ./filters.json --owner alice
//! pinspect show 1 --owner alice
//! pinspect rerun 1 --method NMF --topics 5
//! pinspect export 1 --output report-1.xlsx
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | tracing subscriber setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sql`] | Predicate to SQL translation |
//! | [`sqlite_store`] | SQLite corpus and report stores |
//! | [`blob`] | Filesystem blob store |
//! | [`export`] | `.xlsx` export |
//! | [`queue`] | Worker pool with retries and timeouts |
//! | [`analysis`] | Concurrent section computation |
//! | [`report`] | Report lifecycle orchestration |
//! | [`notify`] | Owner notifications |
//! | [`import`] | JSON fixture import |
//! | [`stats`] | Corpus overview |

pub mod analysis;
pub mod blob;
pub mod config;
pub mod db;
pub mod export;
pub mod import;
pub mod logging;
pub mod migrate;
pub mod notify;
pub mod queue;
pub mod report;
pub mod sql;
pub mod sqlite_store;
pub mod stats;
