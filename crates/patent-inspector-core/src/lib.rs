//! # Patent Inspector Core
//!
//! Runtime-free logic for Patent Inspector: data models, the filter
//! compiler and its predicate AST, store abstractions with in-memory
//! implementations, and the analytics that turn a resolved patent set into
//! a report (statistics, time series, entity breakdowns, topic models and
//! citation graphs).
//!
//! This crate contains no tokio, sqlx, or filesystem I/O. The native
//! application crate supplies the SQLite store, task queue and CLI.

pub mod aggregate;
pub mod citations;
pub mod error;
pub mod filter;
pub mod models;
pub mod results;
pub mod stats;
pub mod store;
pub mod topics;

#[cfg(test)]
mod fixtures;
