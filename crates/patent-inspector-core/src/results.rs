//! The versioned results document stored on every report.
//!
//! Each section is an explicit type. A document either carries the
//! computed sections, an `info` note (nothing matched), or an `error`
//! together with its [`ErrorKind`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::PatentSummary;
use crate::stats::StatisticsRow;
use crate::topics::TopicModelResult;

pub const SCHEMA_VERSION: u32 = 1;

/// Message stored when a job fails without a more specific one.
pub const GENERIC_ERROR: &str = "An unexpected error occurred while processing the report.";

pub const NO_PATENTS_FOUND: &str = "No patents found.";

pub type YearCounts = BTreeMap<i32, u64>;

/// `category → year → count`, zero-filled over the table's years.
pub type CategoryYearCounts = BTreeMap<String, YearCounts>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The filters matched more patents than the server processes.
    Capacity,
    Compute,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub applications_per_year: YearCounts,
    pub granted_per_year: YearCounts,
    pub granted_per_type_year: CategoryYearCounts,
    pub granted_per_office_year: CategoryYearCounts,
    pub pct_protected_per_year: YearCounts,
    pub granted_per_cpc_year: CategoryYearCounts,
    pub citations_made_per_year: YearCounts,
    pub citations_received_per_year: YearCounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelCount {
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCount {
    pub label: String,
    pub lat: f64,
    pub lng: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatentEntities {
    pub pct: Vec<LabelCount>,
    #[serde(rename = "type")]
    pub patent_type: Vec<LabelCount>,
    pub office: Vec<LabelCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventorEntities {
    pub top10: Vec<LabelCount>,
    pub locations: Vec<LocationCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssigneeEntities {
    pub top10: Vec<LabelCount>,
    #[serde(rename = "type")]
    pub assignee_type: Vec<LabelCount>,
    pub locations: Vec<LocationCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpcEntities {
    pub section: Vec<LabelCount>,
    pub top5_classes: Vec<LabelCount>,
    pub top5_subclasses: Vec<LabelCount>,
    pub top5_groups: Vec<LabelCount>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitySection {
    pub patent: PatentEntities,
    pub inventor: InventorEntities,
    pub assignees: AssigneeEntities,
    pub cpc: CpcEntities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationEdge {
    pub citing: PatentSummary,
    pub cited: PatentSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedPatent {
    pub id: i64,
    pub label: String,
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CitationSection {
    pub graph: Vec<CitationEdge>,
    pub most_cited_local: Vec<RankedPatent>,
    pub most_cited_global: Vec<RankedPatent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    pub schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patents_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<Vec<StatisticsRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeseries: Option<TimeSeries>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity: Option<EntitySection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_modeling: Option<TopicModelResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub citations: Option<CitationSection>,
}

impl Default for ResultsDocument {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            error: None,
            error_kind: None,
            info: None,
            patents_count: None,
            statistics: None,
            timeseries: None,
            entity: None,
            topic_modeling: None,
            citations: None,
        }
    }
}

impl ResultsDocument {
    /// A document holding only an error. Any computed sections are dropped.
    pub fn failure(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            error_kind: Some(kind),
            ..Self::default()
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            info: Some(message.into()),
            patents_count: Some(0),
            ..Self::default()
        }
    }

    pub fn has_error(&self) -> bool {
        self.error.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Whether every analytical section is present.
    pub fn is_complete(&self) -> bool {
        self.statistics.is_some()
            && self.timeseries.is_some()
            && self.entity.is_some()
            && self.topic_modeling.is_some()
            && self.citations.is_some()
    }
}
