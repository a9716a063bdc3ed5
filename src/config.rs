use anyhow::{Context, Result};
use patent_inspector_core::topics::TopicSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    /// Enables the `max_records` cap.
    #[serde(default = "default_production")]
    pub production: bool,
    #[serde(default = "default_max_records")]
    pub max_records: usize,
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            production: default_production(),
            max_records: default_max_records(),
            export_dir: default_export_dir(),
        }
    }
}

fn default_production() -> bool {
    true
}
fn default_max_records() -> usize {
    200_000
}
fn default_export_dir() -> PathBuf {
    PathBuf::from("./data/exports")
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueueConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            max_attempts: default_max_attempts(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl QueueConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_workers() -> usize {
    2
}
fn default_max_attempts() -> u32 {
    1
}
fn default_timeout_secs() -> u64 {
    3600
}

#[derive(Debug, Deserialize, Clone)]
pub struct TopicsConfig {
    #[serde(default = "default_lda_iterations")]
    pub lda_iterations: usize,
    #[serde(default = "default_nmf_max_iter")]
    pub nmf_max_iter: usize,
    #[serde(default = "default_end_lag_days")]
    pub default_end_lag_days: i64,
    #[serde(default = "default_lookback_days")]
    pub default_lookback_days: i64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            lda_iterations: default_lda_iterations(),
            nmf_max_iter: default_nmf_max_iter(),
            default_end_lag_days: default_end_lag_days(),
            default_lookback_days: default_lookback_days(),
            seed: default_seed(),
        }
    }
}

impl TopicsConfig {
    pub fn settings(&self) -> TopicSettings {
        TopicSettings {
            lda_iterations: self.lda_iterations,
            nmf_max_iter: self.nmf_max_iter,
            default_end_lag_days: self.default_end_lag_days,
            default_lookback_days: self.default_lookback_days,
            seed: self.seed,
        }
    }
}

fn default_lda_iterations() -> usize {
    1000
}
fn default_nmf_max_iter() -> usize {
    400
}
fn default_end_lag_days() -> i64 {
    365 * 3
}
fn default_lookback_days() -> i64 {
    365 * 5
}
fn default_seed() -> u64 {
    42
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotifyConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_front_end_domain")]
    pub front_end_domain: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: None,
            front_end_domain: default_front_end_domain(),
        }
    }
}

fn default_front_end_domain() -> String {
    "localhost:8080".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.reports.max_records == 0 {
        anyhow::bail!("reports.max_records must be >= 1");
    }

    if config.queue.workers == 0 {
        anyhow::bail!("queue.workers must be >= 1");
    }
    if config.queue.max_attempts == 0 {
        anyhow::bail!("queue.max_attempts must be >= 1");
    }
    if config.queue.timeout_secs == 0 {
        anyhow::bail!("queue.timeout_secs must be >= 1");
    }

    if config.topics.lda_iterations == 0 {
        anyhow::bail!("topics.lda_iterations must be >= 1");
    }
    if config.topics.nmf_max_iter == 0 {
        anyhow::bail!("topics.nmf_max_iter must be >= 1");
    }
    if config.topics.default_lookback_days < 1 {
        anyhow::bail!("topics.default_lookback_days must be >= 1");
    }

    if let Some(url) = &config.notify.webhook_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            anyhow::bail!(
                "notify.webhook_url must start with http:// or https://, got '{}'",
                url
            );
        }
    }

    Ok(config)
}
