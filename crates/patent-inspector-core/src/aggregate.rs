//! Time series and entity breakdowns.
//!
//! Every count is a number of distinct patents, except the citation series
//! which count edges. Rankings are ordered by count descending, then label
//! ascending.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::Datelike;

use crate::models::{Citation, CpcLevel, Location, PatentRecord};
use crate::results::{
    AssigneeEntities, CategoryYearCounts, CpcEntities, EntitySection, InventorEntities,
    LabelCount, LocationCount, PatentEntities, TimeSeries, YearCounts,
};

pub const PCT_NOT_APPLIED: &str = "Not Applied";
pub const PCT_NOT_GRANTED: &str = "Not Granted";
pub const PCT_GRANTED: &str = "Granted";

/// Every CPC code (groups and all their ancestors) referenced by `records`.
/// This is the set whose titles the breakdowns need.
pub fn referenced_cpc_codes(records: &[PatentRecord]) -> Vec<String> {
    let mut codes = BTreeSet::new();
    for record in records {
        for group in &record.cpc_groups {
            for level in CpcLevel::ALL {
                if let Some(code) = level.truncate(group) {
                    codes.insert(code.to_string());
                }
            }
        }
    }
    codes.into_iter().collect()
}

/// `"<code> - <title>"`, or the bare code when the title is unknown.
pub fn cpc_label(code: &str, titles: &HashMap<String, String>) -> String {
    match titles.get(code) {
        Some(title) => format!("{} - {}", code, title),
        None => code.to_string(),
    }
}

fn granted_year(record: &PatentRecord) -> i32 {
    record
        .patent
        .granted_year
        .unwrap_or_else(|| record.patent.granted_date.year())
}

fn application_year(record: &PatentRecord) -> Option<i32> {
    record
        .patent
        .application_year
        .or_else(|| record.patent.application_filed_date.map(|d| d.year()))
}

fn citation_year(citation: &Citation) -> Option<i32> {
    citation
        .citation_year
        .or_else(|| citation.citation_date.map(|d| d.year()))
}

fn bump_year(counts: &mut YearCounts, year: i32) {
    *counts.entry(year).or_insert(0) += 1;
}

/// Fill every category with a zero for each year present anywhere in the
/// table.
fn zero_fill(table: &mut CategoryYearCounts) {
    let years: BTreeSet<i32> = table.values().flat_map(|y| y.keys().copied()).collect();
    for per_year in table.values_mut() {
        for year in &years {
            per_year.entry(*year).or_insert(0);
        }
    }
}

pub fn timeseries(
    records: &[PatentRecord],
    citations: &[Citation],
    cpc_titles: &HashMap<String, String>,
) -> TimeSeries {
    let mut ts = TimeSeries::default();
    let ids: HashSet<i64> = records.iter().map(|r| r.id()).collect();

    for record in records {
        let granted = granted_year(record);

        if let Some(year) = application_year(record) {
            bump_year(&mut ts.applications_per_year, year);
        }
        bump_year(&mut ts.granted_per_year, granted);

        if let Some(kind) = &record.patent.patent_type {
            bump_year(
                ts.granted_per_type_year.entry(kind.clone()).or_default(),
                granted,
            );
        }
        bump_year(
            ts.granted_per_office_year
                .entry(record.patent.office.clone())
                .or_default(),
            granted,
        );

        if record.pct.iter().any(|p| p.granted) {
            bump_year(&mut ts.pct_protected_per_year, granted);
        }

        let sections: BTreeSet<&str> = record
            .cpc_groups
            .iter()
            .filter_map(|g| CpcLevel::Section.truncate(g))
            .collect();
        for section in sections {
            bump_year(
                ts.granted_per_cpc_year
                    .entry(cpc_label(section, cpc_titles))
                    .or_default(),
                granted,
            );
        }
    }

    for citation in citations {
        let Some(year) = citation_year(citation) else {
            continue;
        };
        if citation.citing_patent_id.is_some_and(|id| ids.contains(&id)) {
            bump_year(&mut ts.citations_made_per_year, year);
        }
        if citation.cited_patent_id.is_some_and(|id| ids.contains(&id)) {
            bump_year(&mut ts.citations_received_per_year, year);
        }
    }

    zero_fill(&mut ts.granted_per_type_year);
    zero_fill(&mut ts.granted_per_office_year);
    zero_fill(&mut ts.granted_per_cpc_year);
    ts
}

/// Counts labels once per patent.
#[derive(Default)]
struct Tally {
    counts: HashMap<String, u64>,
}

impl Tally {
    fn add_patent<I, S>(&mut self, labels: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let distinct: HashSet<String> = labels.into_iter().map(Into::into).collect();
        for label in distinct {
            *self.counts.entry(label).or_insert(0) += 1;
        }
    }

    fn ranked(self, limit: Option<usize>) -> Vec<LabelCount> {
        let mut rows: Vec<LabelCount> = self
            .counts
            .into_iter()
            .map(|(label, count)| LabelCount { label, count })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        if let Some(n) = limit {
            rows.truncate(n);
        }
        rows
    }
}

/// Location counts keyed by `"CC - City"`; the first point seen for a
/// label is reported.
#[derive(Default)]
struct LocationTally {
    counts: HashMap<String, (f64, f64, u64)>,
}

impl LocationTally {
    fn add_patent<'a>(&mut self, locations: impl IntoIterator<Item = &'a Location>) {
        let mut seen = HashSet::new();
        for location in locations {
            let Some(point) = location.point else {
                continue;
            };
            let label = location.label();
            if !seen.insert(label.clone()) {
                continue;
            }
            self.counts
                .entry(label)
                .or_insert((point.lat, point.lng, 0))
                .2 += 1;
        }
    }

    fn ranked(self) -> Vec<LocationCount> {
        let mut rows: Vec<LocationCount> = self
            .counts
            .into_iter()
            .map(|(label, (lat, lng, count))| LocationCount {
                label,
                lat,
                lng,
                count,
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        rows
    }
}

fn cpc_labels_at<'a>(
    record: &'a PatentRecord,
    level: CpcLevel,
    titles: &'a HashMap<String, String>,
) -> impl Iterator<Item = String> + 'a {
    record
        .cpc_groups
        .iter()
        .filter_map(move |g| level.truncate(g))
        .map(move |code| cpc_label(code, titles))
}

pub fn entities(records: &[PatentRecord], cpc_titles: &HashMap<String, String>) -> EntitySection {
    let mut pct: BTreeMap<&str, u64> = [PCT_NOT_APPLIED, PCT_NOT_GRANTED, PCT_GRANTED]
        .into_iter()
        .map(|label| (label, 0))
        .collect();
    let mut kinds = Tally::default();
    let mut offices = Tally::default();
    let mut inventors = Tally::default();
    let mut inventor_locations = LocationTally::default();
    let mut assignees = Tally::default();
    let mut assignee_types = Tally::default();
    let mut assignee_locations = LocationTally::default();
    let mut sections = Tally::default();
    let mut classes = Tally::default();
    let mut subclasses = Tally::default();
    let mut groups = Tally::default();

    for record in records {
        let status = if record.pct.is_empty() {
            PCT_NOT_APPLIED
        } else if record.pct.iter().any(|p| p.granted) {
            PCT_GRANTED
        } else {
            PCT_NOT_GRANTED
        };
        *pct.entry(status).or_insert(0) += 1;

        kinds.add_patent(record.patent.patent_type.clone());
        offices.add_patent([record.patent.office.clone()]);

        inventors.add_patent(
            record
                .inventors
                .iter()
                .map(|i| i.display_name())
                .filter(|n| !n.is_empty()),
        );
        inventor_locations.add_patent(record.inventors.iter().filter_map(|i| i.location.as_ref()));

        assignees.add_patent(
            record
                .assignees
                .iter()
                .map(|a| a.display_name())
                .filter(|n| !n.is_empty()),
        );
        assignee_types.add_patent(record.assignees.iter().filter_map(|a| {
            a.is_organization
                .map(|org| if org { "Corporation" } else { "Individual" })
        }));
        assignee_locations.add_patent(record.assignees.iter().filter_map(|a| a.location.as_ref()));

        sections.add_patent(cpc_labels_at(record, CpcLevel::Section, cpc_titles));
        classes.add_patent(cpc_labels_at(record, CpcLevel::Class, cpc_titles));
        subclasses.add_patent(cpc_labels_at(record, CpcLevel::Subclass, cpc_titles));
        groups.add_patent(cpc_labels_at(record, CpcLevel::Group, cpc_titles));
    }

    let mut pct: Vec<LabelCount> = pct
        .into_iter()
        .map(|(label, count)| LabelCount {
            label: label.to_string(),
            count,
        })
        .collect();
    pct.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));

    EntitySection {
        patent: PatentEntities {
            pct,
            patent_type: kinds.ranked(None),
            office: offices.ranked(None),
        },
        inventor: InventorEntities {
            top10: inventors.ranked(Some(10)),
            locations: inventor_locations.ranked(),
        },
        assignees: AssigneeEntities {
            top10: assignees.ranked(Some(10)),
            assignee_type: assignee_types.ranked(None),
            locations: assignee_locations.ranked(),
        },
        cpc: CpcEntities {
            section: sections.ranked(None),
            top5_classes: classes.ranked(Some(5)),
            top5_subclasses: subclasses.ranked(Some(5)),
            top5_groups: groups.ranked(Some(5)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{cite, date, record};
    use crate::models::{Assignee, GeoPoint, Inventor, PctRecord};

    fn titles() -> HashMap<String, String> {
        [
            ("H", "Electricity"),
            ("G", "Physics"),
            ("H01", "Electric elements"),
        ]
        .into_iter()
        .map(|(c, t)| (c.to_string(), t.to_string()))
        .collect()
    }

    fn pct(granted: bool) -> PctRecord {
        PctRecord {
            pct_id: "PCT/US2010/000001".into(),
            published_or_filed_date: date("2010-01-01"),
            filed_country: Some("US".into()),
            granted,
        }
    }

    #[test]
    fn multi_key_tables_are_zero_filled() {
        let mut a = record(1, "2011-03-01");
        a.patent.patent_type = Some("utility".into());
        let mut b = record(2, "2013-03-01");
        b.patent.patent_type = Some("design".into());

        let ts = timeseries(&[a, b], &[], &titles());
        let design = &ts.granted_per_type_year["design"];
        let utility = &ts.granted_per_type_year["utility"];
        assert_eq!(design.get(&2011), Some(&0));
        assert_eq!(design.get(&2013), Some(&1));
        assert_eq!(utility.get(&2011), Some(&1));
        assert_eq!(utility.get(&2013), Some(&0));
        assert_eq!(ts.granted_per_year.len(), 2);
    }

    #[test]
    fn cpc_year_counts_distinct_patents_per_section() {
        let mut a = record(1, "2012-01-01");
        a.cpc_groups = vec!["H01L21/02".into(), "H04W4/00".into(), "G06F3/01".into()];
        let ts = timeseries(&[a], &[], &titles());
        assert_eq!(ts.granted_per_cpc_year["H - Electricity"][&2012], 1);
        assert_eq!(ts.granted_per_cpc_year["G - Physics"][&2012], 1);
    }

    #[test]
    fn citation_series_split_by_direction() {
        let a = record(1, "2012-01-01");
        let b = record(2, "2012-01-01");
        let citations = vec![cite(1, 1, 2, 2013), cite(2, 99, 1, 2014), cite(3, 2, 77, 2014)];
        let ts = timeseries(&[a, b], &citations, &titles());
        assert_eq!(ts.citations_made_per_year, YearCounts::from([(2013, 1), (2014, 1)]));
        assert_eq!(
            ts.citations_received_per_year,
            YearCounts::from([(2013, 1), (2014, 1)])
        );
    }

    #[test]
    fn pct_status_distribution() {
        let a = record(1, "2012-01-01");
        let mut b = record(2, "2012-01-01");
        b.pct = vec![pct(false)];
        let mut c = record(3, "2012-01-01");
        c.pct = vec![pct(false), pct(true)];
        let mut d = record(4, "2012-01-01");
        d.pct = vec![pct(true)];

        let e = entities(&[a.clone(), b, c.clone(), d.clone()], &titles());
        let get = |label: &str| e.patent.pct.iter().find(|r| r.label == label).unwrap().count;
        assert_eq!(get(PCT_NOT_APPLIED), 1);
        assert_eq!(get(PCT_NOT_GRANTED), 1);
        assert_eq!(get(PCT_GRANTED), 2);
        assert_eq!(e.patent.pct[0].label, PCT_GRANTED);

        let ts = timeseries(&[a, c, d], &[], &titles());
        assert_eq!(ts.pct_protected_per_year[&2012], 2);
    }

    #[test]
    fn top_inventors_skip_blank_names_and_tie_break_by_label() {
        let person = |first: &str, last: &str| Inventor {
            first_name: Some(first.into()),
            last_name: Some(last.into()),
            location: None,
        };
        let mut a = record(1, "2012-01-01");
        a.inventors = vec![person("Zoe", "Zed"), person("", " ")];
        let mut b = record(2, "2012-01-01");
        b.inventors = vec![person("Amy", "Abe"), person("Zoe", "Zed")];
        let mut c = record(3, "2012-01-01");
        c.inventors = vec![person("Amy", "Abe")];
        let mut d = record(4, "2012-01-01");
        d.inventors = vec![person("Bob", "Bee")];

        let e = entities(&[a, b, c, d], &titles());
        let labels: Vec<&str> = e.inventor.top10.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["Amy Abe", "Zoe Zed", "Bob Bee"]);
    }

    #[test]
    fn assignee_types_and_locations() {
        let org = Assignee {
            organization: Some("Acme".into()),
            is_organization: Some(true),
            location: Some(Location {
                country_code: Some("US".into()),
                city: Some("Boston".into()),
                point: Some(GeoPoint {
                    lat: 42.36,
                    lng: -71.06,
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let person = Assignee {
            first_name: Some("Ann".into()),
            is_organization: Some(false),
            ..Default::default()
        };
        let mut a = record(1, "2012-01-01");
        a.assignees = vec![org.clone(), person];
        let mut b = record(2, "2012-01-01");
        b.assignees = vec![org];

        let e = entities(&[a, b], &titles());
        assert_eq!(e.assignees.assignee_type[0].label, "Corporation");
        assert_eq!(e.assignees.assignee_type[0].count, 2);
        assert_eq!(e.assignees.assignee_type[1].label, "Individual");
        assert_eq!(e.assignees.locations.len(), 1);
        assert_eq!(e.assignees.locations[0].label, "US - Boston");
        assert_eq!(e.assignees.locations[0].count, 2);
    }

    #[test]
    fn cpc_breakdowns_use_titles() {
        let mut a = record(1, "2012-01-01");
        a.cpc_groups = vec!["H01L21/02".into(), "H01L21/04".into()];
        let e = entities(&[a.clone()], &titles());
        assert_eq!(e.cpc.section[0].label, "H - Electricity");
        assert_eq!(e.cpc.section[0].count, 1);
        assert_eq!(e.cpc.top5_classes[0].label, "H01 - Electric elements");
        assert_eq!(e.cpc.top5_subclasses[0].label, "H01L");
        assert_eq!(e.cpc.top5_groups.len(), 2);

        let codes = referenced_cpc_codes(&[a]);
        assert_eq!(codes, vec!["H", "H01", "H01L", "H01L21/02", "H01L21/04"]);
    }
}
