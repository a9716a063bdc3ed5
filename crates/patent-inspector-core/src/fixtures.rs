//! Small record builders shared by the unit tests.

use chrono::NaiveDate;

use crate::models::{Citation, Patent, PatentRecord};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// A US utility patent granted on `granted` with everything else empty.
pub fn record(id: i64, granted: &str) -> PatentRecord {
    let granted_date = date(granted);
    PatentRecord {
        patent: Patent {
            id,
            office: "US".into(),
            office_patent_id: format!("{}", 9_000_000 + id),
            patent_type: Some("utility".into()),
            application_filed_date: None,
            granted_date,
            title: format!("Patent {id}"),
            abstract_text: None,
            title_processed: None,
            abstract_processed: None,
            claims_count: 1,
            figures_count: None,
            sheets_count: None,
            withdrawn: false,
            granted_year: Some(chrono::Datelike::year(&granted_date)),
            application_year: None,
            years_to_grant: None,
            title_word_count_raw: None,
            title_word_count_processed: None,
            abstract_word_count_raw: None,
            abstract_word_count_processed: None,
            cpc_groups_count: None,
            assignee_count: None,
            inventor_count: None,
            incoming_citations_count: None,
            outgoing_citations_count: None,
        },
        cpc_groups: vec![],
        pct: vec![],
        inventors: vec![],
        assignees: vec![],
    }
}

/// A citation edge between two corpus patents, dated in `year`.
pub fn cite(id: i64, citing: i64, cited: i64, year: i32) -> Citation {
    Citation {
        id,
        citing_patent_id: Some(citing),
        cited_patent_id: Some(cited),
        citation_date: NaiveDate::from_ymd_opt(year, 6, 1),
        citation_year: Some(year),
        cited_patent_number: None,
        cited_patent_office: None,
    }
}
