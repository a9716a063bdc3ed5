#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use patent_inspector::import::Fixture;
use patent_inspector::report::{ReportService, ServiceSettings};
use patent_inspector::queue::TaskQueue;
use patent_inspector_core::models::{
    Assignee, Citation, CpcEntry, CpcLevel, GeoPoint, Inventor, Location, Patent, PatentRecord,
    PctRecord,
};
use patent_inspector_core::store::memory::{
    InMemoryBlobStore, InMemoryCorpus, InMemoryReportStore, RecordingNotifier,
};
use patent_inspector_core::store::CorpusStore;
use patent_inspector_core::topics::TopicSettings;

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn location(country: &str, city: &str, lat: f64, lng: f64) -> Location {
    Location {
        country_code: Some(country.into()),
        state: None,
        city: Some(city.into()),
        point: Some(GeoPoint { lat, lng }),
    }
}

/// Patent `id` of the test corpus. Ids divisible by 5 are designs, odd ids
/// are optics patents and even ids biotech; grant years cycle 2008..=2017.
pub fn record(id: i64) -> PatentRecord {
    let year = 2008 + (id % 10) as i32;
    let granted = NaiveDate::from_ymd_opt(year, 3, 15).unwrap();
    let optics = id % 2 == 1;
    let (title, processed, group, org) = if optics {
        (
            "Laser diode array",
            "laser diode optical beam cavity mirror wavelength photon gain pump resonator semiconductor",
            "H01S5/00",
            "Photon Works",
        )
    } else {
        (
            "Enzyme assay",
            "protein enzyme cell assay culture antibody gene sequence peptide buffer plasma ligand",
            "C12N9/00",
            "Bio Labs",
        )
    };
    let (inventor_loc, assignee_loc) = if optics {
        (
            location("US", "Boston", 42.36, -71.06),
            location("US", "Cambridge", 42.37, -71.11),
        )
    } else {
        (
            location("DE", "Berlin", 52.52, 13.40),
            location("DE", "Munich", 48.14, 11.58),
        )
    };

    PatentRecord {
        patent: Patent {
            id,
            office: "US".into(),
            office_patent_id: format!("{}", 9_000_000 + id),
            patent_type: Some(if id % 5 == 0 { "design" } else { "utility" }.into()),
            application_filed_date: Some(NaiveDate::from_ymd_opt(year - 2, 6, 1).unwrap()),
            granted_date: granted,
            title: format!("{title} {id}"),
            abstract_text: Some(format!("An abstract about {}", processed)),
            title_processed: Some(format!("{} marker{}", processed, id % 9)),
            abstract_processed: Some(processed.into()),
            claims_count: 5 + id % 7,
            figures_count: Some(id % 4),
            sheets_count: Some(1 + id % 3),
            withdrawn: id == 29,
            granted_year: Some(granted.year()),
            application_year: Some(year - 2),
            years_to_grant: Some(1.8),
            title_word_count_raw: Some(3),
            title_word_count_processed: Some(3),
            abstract_word_count_raw: Some(8),
            abstract_word_count_processed: Some(5),
            cpc_groups_count: Some(1),
            assignee_count: Some(1),
            inventor_count: Some(1),
            incoming_citations_count: None,
            outgoing_citations_count: None,
        },
        cpc_groups: vec![group.into()],
        pct: if id % 3 == 0 {
            vec![PctRecord {
                pct_id: format!("PCT/US{}/{:04}", year - 2, id),
                published_or_filed_date: NaiveDate::from_ymd_opt(year - 2, 1, 10).unwrap(),
                filed_country: Some("US".into()),
                granted: true,
            }]
        } else {
            vec![]
        },
        inventors: vec![Inventor {
            first_name: Some(if optics { "Ada" } else { "Grace" }.into()),
            last_name: Some(format!("Inventor{}", id % 3)),
            location: Some(inventor_loc),
        }],
        assignees: vec![Assignee {
            first_name: None,
            last_name: None,
            organization: Some(org.into()),
            is_organization: Some(true),
            location: Some(assignee_loc),
        }],
    }
}

fn cite(id: i64, citing: i64, cited: Option<i64>, year: i32) -> Citation {
    Citation {
        id,
        citing_patent_id: Some(citing),
        cited_patent_id: cited,
        citation_date: NaiveDate::from_ymd_opt(year, 6, 1),
        citation_year: Some(year),
        cited_patent_number: cited.is_none().then(|| "US5000000".to_string()),
        cited_patent_office: cited.is_none().then(|| "US".to_string()),
    }
}

/// Thirty patents, a CPC hierarchy for both themes and a small citation web
/// including one external citation.
pub fn fixture() -> Fixture {
    let cpc = [
        (CpcLevel::Section, "H", "Electricity"),
        (CpcLevel::Section, "C", "Chemistry; Metallurgy"),
        (CpcLevel::Class, "H01", "Basic electric elements"),
        (CpcLevel::Class, "C12", "Biochemistry"),
        (CpcLevel::Subclass, "H01S", "Devices using stimulated emission"),
        (CpcLevel::Subclass, "C12N", "Microorganisms or enzymes"),
        (CpcLevel::Group, "H01S5/00", "Semiconductor lasers"),
        (CpcLevel::Group, "C12N9/00", "Enzymes"),
    ]
    .into_iter()
    .map(|(level, code, title)| CpcEntry {
        level,
        code: code.into(),
        title: title.into(),
    })
    .collect();

    let patents = (1..=30).map(record).collect();

    let mut citations = Vec::new();
    let mut next = 1;
    for citing in 2..=30 {
        for cited in [1, citing - 1] {
            if cited < citing {
                citations.push(cite(next, citing, Some(cited), 2008 + (citing % 10) as i32));
                next += 1;
            }
        }
    }
    citations.push(cite(next, 3, None, 2011));

    Fixture {
        cpc,
        patents,
        citations,
    }
}

pub fn memory_corpus(fixture: &Fixture) -> Arc<InMemoryCorpus> {
    let corpus = InMemoryCorpus::new();
    for entry in &fixture.cpc {
        corpus.insert_cpc(entry.clone()).unwrap();
    }
    for record in &fixture.patents {
        corpus.insert_patent(record.clone()).unwrap();
    }
    for citation in &fixture.citations {
        corpus.insert_citation(citation.clone()).unwrap();
    }
    Arc::new(corpus)
}

pub fn settings() -> ServiceSettings {
    ServiceSettings {
        production: true,
        max_records: 1000,
        topics: TopicSettings {
            lda_iterations: 30,
            nmf_max_iter: 50,
            ..TopicSettings::default()
        },
        notify_enabled: true,
        front_end_domain: "reports.example.org".into(),
    }
}

/// A service over in-memory stores, with handles to inspect them.
pub struct Harness {
    pub service: ReportService,
    pub reports: Arc<InMemoryReportStore>,
    pub blobs: Arc<InMemoryBlobStore>,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn harness(settings: ServiceSettings) -> Harness {
    harness_with(settings, |_| memory_corpus(&fixture()))
}

/// Like [`harness`], with the corpus built by `corpus` from the report store.
pub fn harness_with<F>(settings: ServiceSettings, corpus: F) -> Harness
where
    F: FnOnce(Arc<InMemoryReportStore>) -> Arc<dyn CorpusStore>,
{
    let reports = Arc::new(InMemoryReportStore::new());
    let blobs = Arc::new(InMemoryBlobStore::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let queue = Arc::new(TaskQueue::start(
        2,
        1,
        std::time::Duration::from_secs(60),
    ));
    let service = ReportService::new(
        corpus(reports.clone()),
        reports.clone(),
        blobs.clone(),
        notifier.clone(),
        queue,
        settings,
    );
    Harness {
        service,
        reports,
        blobs,
        notifier,
    }
}
