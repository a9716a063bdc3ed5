//! Descriptive statistics over the numeric patent fields.
//!
//! Each [`StatField`] yields one [`StatisticsRow`] with the average,
//! median, sample standard deviation, minimum and maximum of its non-null
//! values. An empty input yields a row of `None`s; a single value has no
//! standard deviation.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::models::Patent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatField {
    ClaimsCount,
    FiguresCount,
    SheetsCount,
    YearsToGetGranted,
    TitleWordCountWithoutProcessing,
    TitleWordCountWithProcessing,
    AbstractWordCountWithoutProcessing,
    AbstractWordCountWithProcessing,
    CpcGroupsCount,
    AssigneeCount,
    InventorCount,
    IncomingCitationsCount,
    OutgoingCitationsCount,
}

impl StatField {
    pub const ALL: [StatField; 13] = [
        StatField::ClaimsCount,
        StatField::FiguresCount,
        StatField::SheetsCount,
        StatField::YearsToGetGranted,
        StatField::TitleWordCountWithoutProcessing,
        StatField::TitleWordCountWithProcessing,
        StatField::AbstractWordCountWithoutProcessing,
        StatField::AbstractWordCountWithProcessing,
        StatField::CpcGroupsCount,
        StatField::AssigneeCount,
        StatField::InventorCount,
        StatField::IncomingCitationsCount,
        StatField::OutgoingCitationsCount,
    ];

    pub fn label(self) -> &'static str {
        match self {
            StatField::ClaimsCount => "Claims Count",
            StatField::FiguresCount => "Figures Count",
            StatField::SheetsCount => "Sheets Count",
            StatField::YearsToGetGranted => "Years To Get Granted",
            StatField::TitleWordCountWithoutProcessing => "Title Word Count Without Processing",
            StatField::TitleWordCountWithProcessing => "Title Word Count With Processing",
            StatField::AbstractWordCountWithoutProcessing => {
                "Abstract Word Count Without Processing"
            }
            StatField::AbstractWordCountWithProcessing => "Abstract Word Count With Processing",
            StatField::CpcGroupsCount => "Cpc Groups Count",
            StatField::AssigneeCount => "Assignee Count",
            StatField::InventorCount => "Inventor Count",
            StatField::IncomingCitationsCount => "Incoming Citations Count",
            StatField::OutgoingCitationsCount => "Outgoing Citations Count",
        }
    }

    /// Column holding this field in the `patents` table.
    pub fn column(self) -> &'static str {
        match self {
            StatField::ClaimsCount => "claims_count",
            StatField::FiguresCount => "figures_count",
            StatField::SheetsCount => "sheets_count",
            StatField::YearsToGetGranted => "years_to_grant",
            StatField::TitleWordCountWithoutProcessing => "title_word_count_raw",
            StatField::TitleWordCountWithProcessing => "title_word_count_processed",
            StatField::AbstractWordCountWithoutProcessing => "abstract_word_count_raw",
            StatField::AbstractWordCountWithProcessing => "abstract_word_count_processed",
            StatField::CpcGroupsCount => "cpc_groups_count",
            StatField::AssigneeCount => "assignee_count",
            StatField::InventorCount => "inventor_count",
            StatField::IncomingCitationsCount => "incoming_citations_count",
            StatField::OutgoingCitationsCount => "outgoing_citations_count",
        }
    }

    pub fn value(self, p: &Patent) -> Option<f64> {
        let int = |v: Option<i64>| v.map(|n| n as f64);
        match self {
            StatField::ClaimsCount => Some(p.claims_count as f64),
            StatField::FiguresCount => int(p.figures_count),
            StatField::SheetsCount => int(p.sheets_count),
            StatField::YearsToGetGranted => p.years_to_grant,
            StatField::TitleWordCountWithoutProcessing => int(p.title_word_count_raw),
            StatField::TitleWordCountWithProcessing => int(p.title_word_count_processed),
            StatField::AbstractWordCountWithoutProcessing => int(p.abstract_word_count_raw),
            StatField::AbstractWordCountWithProcessing => int(p.abstract_word_count_processed),
            StatField::CpcGroupsCount => int(p.cpc_groups_count),
            StatField::AssigneeCount => int(p.assignee_count),
            StatField::InventorCount => int(p.inventor_count),
            StatField::IncomingCitationsCount => int(p.incoming_citations_count),
            StatField::OutgoingCitationsCount => int(p.outgoing_citations_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsRow {
    pub field: StatField,
    pub label: String,
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl StatisticsRow {
    pub fn new(field: StatField, values: &[f64]) -> Self {
        let mut row = Self {
            field,
            label: field.label().to_string(),
            average: None,
            median: None,
            std_dev: None,
            min: None,
            max: None,
        };
        if values.is_empty() {
            return row;
        }

        row.average = Some(Statistics::mean(values));
        row.min = Some(Statistics::min(values));
        row.max = Some(Statistics::max(values));
        if values.len() > 1 {
            row.std_dev = Some(Statistics::std_dev(values));
        }
        // The 0.5 quantile of statrs interpolates between the two middle
        // order statistics, matching PERCENTILE_CONT(0.5).
        let mut data = Data::new(values.to_vec());
        row.median = Some(data.median());
        row
    }
}

/// Statistics for every [`StatField`] over already loaded patents.
pub fn compute<'a>(patents: impl IntoIterator<Item = &'a Patent> + Clone) -> Vec<StatisticsRow> {
    StatField::ALL
        .iter()
        .map(|field| {
            let values: Vec<f64> = patents
                .clone()
                .into_iter()
                .filter_map(|p| field.value(p))
                .collect();
            StatisticsRow::new(*field, &values)
        })
        .collect()
}
