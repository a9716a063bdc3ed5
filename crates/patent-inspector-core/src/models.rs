//! Core data models shared by every Patent Inspector component.
//!
//! Patents are immutable once ingested. The analytics never see a bare
//! [`Patent`]: they work on [`PatentRecord`]s, which bundle the patent with
//! its CPC groups, PCT filings, inventors and assignees.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Offices accepted by the filter compiler.
pub const OFFICES: &[&str] = &["US"];

/// Patent types accepted by the filter compiler.
pub const PATENT_TYPES: &[&str] = &[
    "utility",
    "design",
    "plant",
    "reissue",
    "defensive publication",
];

/// A canonical patent row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patent {
    pub id: i64,
    pub office: String,
    pub office_patent_id: String,
    #[serde(default, rename = "type")]
    pub patent_type: Option<String>,
    #[serde(default)]
    pub application_filed_date: Option<NaiveDate>,
    pub granted_date: NaiveDate,
    pub title: String,
    #[serde(default)]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub title_processed: Option<String>,
    #[serde(default)]
    pub abstract_processed: Option<String>,
    pub claims_count: i64,
    #[serde(default)]
    pub figures_count: Option<i64>,
    #[serde(default)]
    pub sheets_count: Option<i64>,
    #[serde(default)]
    pub withdrawn: bool,
    #[serde(default)]
    pub granted_year: Option<i32>,
    #[serde(default)]
    pub application_year: Option<i32>,
    #[serde(default)]
    pub years_to_grant: Option<f64>,
    #[serde(default)]
    pub title_word_count_raw: Option<i64>,
    #[serde(default)]
    pub title_word_count_processed: Option<i64>,
    #[serde(default)]
    pub abstract_word_count_raw: Option<i64>,
    #[serde(default)]
    pub abstract_word_count_processed: Option<i64>,
    #[serde(default)]
    pub cpc_groups_count: Option<i64>,
    #[serde(default)]
    pub assignee_count: Option<i64>,
    #[serde(default)]
    pub inventor_count: Option<i64>,
    #[serde(default)]
    pub incoming_citations_count: Option<i64>,
    #[serde(default)]
    pub outgoing_citations_count: Option<i64>,
}

impl Patent {
    /// Office-qualified code, e.g. `US10123456`.
    pub fn code(&self) -> String {
        format!("{}{}", self.office, self.office_patent_id)
    }

    /// Processed title and abstract joined by a single space.
    pub fn processed_text(&self) -> String {
        format!(
            "{} {}",
            self.title_processed.as_deref().unwrap_or(""),
            self.abstract_processed.as_deref().unwrap_or("")
        )
    }
}

/// Latitude / longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub point: Option<GeoPoint>,
}

impl Location {
    /// Display label used by the location breakdowns: `"CC - City"`.
    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            self.country_code.as_deref().unwrap_or(""),
            self.city.as_deref().unwrap_or("")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Inventor {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Inventor {
    pub fn display_name(&self) -> String {
        join_name_parts(&[self.first_name.as_deref(), self.last_name.as_deref()])
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Assignee {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub is_organization: Option<bool>,
    #[serde(default)]
    pub location: Option<Location>,
}

impl Assignee {
    pub fn display_name(&self) -> String {
        join_name_parts(&[
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            self.organization.as_deref(),
        ])
    }
}

fn join_name_parts(parts: &[Option<&str>]) -> String {
    parts
        .iter()
        .flatten()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A PCT (Patent Cooperation Treaty) filing attached to a patent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PctRecord {
    pub pct_id: String,
    pub published_or_filed_date: NaiveDate,
    #[serde(default)]
    pub filed_country: Option<String>,
    pub granted: bool,
}

impl PctRecord {
    pub fn representation(&self) -> String {
        format!("{} ({})", self.pct_id, self.published_or_filed_date)
    }
}

/// A patent together with every related row the analytics need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentRecord {
    #[serde(flatten)]
    pub patent: Patent,
    #[serde(default)]
    pub cpc_groups: Vec<String>,
    #[serde(default)]
    pub pct: Vec<PctRecord>,
    #[serde(default)]
    pub inventors: Vec<Inventor>,
    #[serde(default)]
    pub assignees: Vec<Assignee>,
}

impl PatentRecord {
    pub fn id(&self) -> i64 {
        self.patent.id
    }
}

/// A directed citation edge. The cited side may be an external record that
/// was never matched to a patent in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: i64,
    #[serde(default)]
    pub citing_patent_id: Option<i64>,
    #[serde(default)]
    pub cited_patent_id: Option<i64>,
    #[serde(default)]
    pub citation_date: Option<NaiveDate>,
    #[serde(default)]
    pub citation_year: Option<i32>,
    #[serde(default)]
    pub cited_patent_number: Option<String>,
    #[serde(default)]
    pub cited_patent_office: Option<String>,
}

/// Lightweight patent description used for citation endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatentSummary {
    pub id: i64,
    pub code: String,
    pub title: String,
    pub granted_date: NaiveDate,
}

impl From<&Patent> for PatentSummary {
    fn from(p: &Patent) -> Self {
        Self {
            id: p.id,
            code: p.code(),
            title: p.title.clone(),
            granted_date: p.granted_date,
        }
    }
}

/// The four levels of the CPC hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CpcLevel {
    Section,
    Class,
    Subclass,
    Group,
}

impl CpcLevel {
    /// Top-down order.
    pub const ALL: [CpcLevel; 4] = [
        CpcLevel::Section,
        CpcLevel::Class,
        CpcLevel::Subclass,
        CpcLevel::Group,
    ];

    /// Code length at this level; `None` for groups, which use the full code.
    pub fn code_len(self) -> Option<usize> {
        match self {
            CpcLevel::Section => Some(1),
            CpcLevel::Class => Some(3),
            CpcLevel::Subclass => Some(4),
            CpcLevel::Group => None,
        }
    }

    /// Truncate a CPC group code to this level. Returns `None` when the code
    /// is too short to have an ancestor at this level.
    pub fn truncate(self, group_code: &str) -> Option<&str> {
        match self.code_len() {
            None => (!group_code.is_empty()).then_some(group_code),
            Some(n) => group_code.get(..n).filter(|c| c.chars().count() == n),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CpcLevel::Section => "section",
            CpcLevel::Class => "class",
            CpcLevel::Subclass => "subclass",
            CpcLevel::Group => "group",
        }
    }
}

/// A node of the CPC hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpcEntry {
    pub level: CpcLevel,
    pub code: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cpc_truncation_follows_prefix_lengths() {
        let code = "H01L21/02";
        assert_eq!(CpcLevel::Section.truncate(code), Some("H"));
        assert_eq!(CpcLevel::Class.truncate(code), Some("H01"));
        assert_eq!(CpcLevel::Subclass.truncate(code), Some("H01L"));
        assert_eq!(CpcLevel::Group.truncate(code), Some("H01L21/02"));
        assert_eq!(CpcLevel::Subclass.truncate("H0"), None);
    }

    #[test]
    fn display_names_skip_blank_parts() {
        let assignee = Assignee {
            first_name: None,
            last_name: Some("  ".into()),
            organization: Some("Acme Corp".into()),
            ..Default::default()
        };
        assert_eq!(assignee.display_name(), "Acme Corp");

        let inventor = Inventor {
            first_name: Some("Ada".into()),
            last_name: Some("Lovelace".into()),
            location: None,
        };
        assert_eq!(inventor.display_name(), "Ada Lovelace");
    }
}
