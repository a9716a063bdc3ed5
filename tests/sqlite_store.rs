mod common;

use std::fs;
use std::path::Path;

use common::{date, fixture, memory_corpus};
use patent_inspector::config::{load_config, Config};
use patent_inspector::report::ReportService;
use patent_inspector::sqlite_store::{SqliteCorpus, SqliteReports};
use patent_inspector::{db, import, migrate};
use patent_inspector_core::filter::{
    compile, AssigneeFilter, CpcFilter, DateRange, FilterSpec, GeoRadius, IntRange,
    InventorFilter, KeywordLogic, PatentFilter, PctFilter,
};
use patent_inspector_core::stats::StatField;
use patent_inspector_core::store::{CorpusStore, NewReport, ReportStatus, ReportStore};
use tempfile::TempDir;

fn test_config(tmp: &TempDir) -> Config {
    let root = tmp.path();
    let body = format!(
        r#"[db]
path = "{root}/data/patents.sqlite"

[reports]
export_dir = "{root}/data/exports"

[queue]
workers = 2

[topics]
lda_iterations = 30
nmf_max_iter = 50
"#,
        root = root.display()
    );
    let path = root.join("pinspect.toml");
    fs::write(&path, body).unwrap();
    load_config(&path).unwrap()
}

async fn seeded(tmp: &TempDir) -> (Config, SqliteCorpus) {
    let cfg = test_config(tmp);
    migrate::run_migrations(&cfg).await.unwrap();
    let pool = db::connect(&cfg).await.unwrap();
    let summary = import::import_fixture(&pool, &fixture()).await.unwrap();
    assert_eq!(summary.patents, 30);
    (cfg, SqliteCorpus::new(pool))
}

fn patent(f: PatentFilter) -> FilterSpec {
    FilterSpec {
        patent: f,
        ..FilterSpec::default()
    }
}

fn parity_specs() -> Vec<(&'static str, FilterSpec)> {
    vec![
        ("empty", FilterSpec::default()),
        (
            "us utility 2010-2015",
            patent(PatentFilter {
                office: Some("US".into()),
                patent_type: Some("utility".into()),
                granted_date: Some(DateRange::new(
                    Some(date("2010-01-01")),
                    Some(date("2015-12-31")),
                )),
                ..PatentFilter::default()
            }),
        ),
        (
            "keywords and",
            patent(PatentFilter {
                keywords: vec!["laser".into(), "Diode".into()],
                ..PatentFilter::default()
            }),
        ),
        (
            "keywords or",
            patent(PatentFilter {
                keywords: vec!["enzyme".into(), "marker3".into()],
                keywords_logic: KeywordLogic::Or,
                ..PatentFilter::default()
            }),
        ),
        (
            "partial keyword does not match",
            patent(PatentFilter {
                keywords: vec!["las".into()],
                ..PatentFilter::default()
            }),
        ),
        (
            "claims range inclusive",
            patent(PatentFilter {
                claims_count: Some(IntRange::new(Some(6), Some(8))),
                ..PatentFilter::default()
            }),
        ),
        (
            "withdrawn only",
            patent(PatentFilter {
                withdrawn: Some(true),
                ..PatentFilter::default()
            }),
        ),
        (
            "cpc subclass",
            FilterSpec {
                cpc: CpcFilter {
                    subclass: vec!["H01S".into()],
                    ..CpcFilter::default()
                },
                ..FilterSpec::default()
            },
        ),
        (
            "pct granted",
            FilterSpec {
                pct: PctFilter {
                    granted: Some(true),
                    application_date: Some(DateRange::new(Some(date("2010-01-01")), None)),
                },
                ..FilterSpec::default()
            },
        ),
        (
            "inventor name prefixes",
            FilterSpec {
                inventor: InventorFilter {
                    first_name: vec!["ad".into()],
                    last_name: vec!["Inventor1".into()],
                    location: None,
                },
                ..FilterSpec::default()
            },
        ),
        (
            "assignee organization",
            FilterSpec {
                assignee: AssigneeFilter {
                    organization: vec!["bio".into()],
                    ..AssigneeFilter::default()
                },
                ..FilterSpec::default()
            },
        ),
        (
            "inventor near boston",
            FilterSpec {
                inventor: InventorFilter {
                    location: Some(GeoRadius {
                        lat: 42.35,
                        lng: -71.05,
                        radius: 20_000.0,
                    }),
                    ..InventorFilter::default()
                },
                ..FilterSpec::default()
            },
        ),
        (
            "assignee near berlin",
            FilterSpec {
                assignee: AssigneeFilter {
                    location: Some(GeoRadius {
                        lat: 52.52,
                        lng: 13.40,
                        radius: 10_000.0,
                    }),
                    ..AssigneeFilter::default()
                },
                ..FilterSpec::default()
            },
        ),
    ]
}

#[tokio::test]
async fn test_sql_resolution_matches_in_memory() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, sql) = seeded(&tmp).await;
    let mem = memory_corpus(&fixture());

    for (name, spec) in parity_specs() {
        let predicate = compile(&spec).unwrap();
        let expected = mem.resolve_ids(&predicate).await.unwrap();
        let got = sql.resolve_ids(&predicate).await.unwrap();
        assert_eq!(got, expected, "filter '{}' diverged", name);
        assert_eq!(
            sql.count_matching(&predicate).await.unwrap(),
            expected.len(),
            "count for '{}' diverged",
            name
        );
    }
}

#[tokio::test]
async fn test_geo_filters_refine_bounding_box() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, sql) = seeded(&tmp).await;

    let near_boston = compile(&FilterSpec {
        inventor: InventorFilter {
            location: Some(GeoRadius {
                lat: 42.35,
                lng: -71.05,
                radius: 20_000.0,
            }),
            ..InventorFilter::default()
        },
        ..FilterSpec::default()
    })
    .unwrap();
    let ids = sql.resolve_ids(&near_boston).await.unwrap();
    assert_eq!(ids.len(), 15);
    assert!(ids.iter().all(|id| id % 2 == 1));

    // No assignee sits within 10 km of Berlin.
    let berlin = compile(&FilterSpec {
        assignee: AssigneeFilter {
            location: Some(GeoRadius {
                lat: 52.52,
                lng: 13.40,
                radius: 10_000.0,
            }),
            ..AssigneeFilter::default()
        },
        ..FilterSpec::default()
    })
    .unwrap();
    assert!(sql.resolve_ids(&berlin).await.unwrap().is_empty());

    // Boston sits inside the box around this centre but about 23 km away.
    let corner = compile(&FilterSpec {
        inventor: InventorFilter {
            location: Some(GeoRadius {
                lat: 42.51,
                lng: -70.86,
                radius: 20_000.0,
            }),
            ..InventorFilter::default()
        },
        ..FilterSpec::default()
    })
    .unwrap();
    assert!(sql.resolve_ids(&corner).await.unwrap().is_empty());
    assert_eq!(sql.count_matching(&corner).await.unwrap(), 0);
    let mem = memory_corpus(&fixture());
    assert!(mem.resolve_ids(&corner).await.unwrap().is_empty());
}

fn near_boston() -> FilterSpec {
    FilterSpec {
        inventor: InventorFilter {
            last_name: vec!["inventor".into()],
            location: Some(GeoRadius {
                lat: 42.35,
                lng: -71.05,
                radius: 20_000.0,
            }),
            ..InventorFilter::default()
        },
        ..FilterSpec::default()
    }
}

#[tokio::test]
async fn test_geo_report_snapshots_refined_ids() {
    let tmp = TempDir::new().unwrap();
    let (cfg, _sql) = seeded(&tmp).await;
    let service = ReportService::open(&cfg).await.unwrap();

    let id = service.submit("alice", near_boston(), false).await.unwrap();
    service.shutdown().await;

    let report = service.get("alice", id).await.unwrap();
    assert_eq!(report.executed_successfully, Some(true));
    let ids = report.patent_ids.unwrap();
    assert_eq!(ids.len(), 15);
    assert!(ids.iter().all(|id| id % 2 == 1));
    assert_eq!(report.results.unwrap().patents_count, Some(15));
}

#[tokio::test]
async fn test_geo_report_respects_capacity() {
    let tmp = TempDir::new().unwrap();
    let (mut cfg, _sql) = seeded(&tmp).await;
    cfg.reports.max_records = 10;
    let service = ReportService::open(&cfg).await.unwrap();

    let id = service.submit("alice", near_boston(), false).await.unwrap();
    service.shutdown().await;

    let report = service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.executed_successfully, Some(false));
    assert!(report.patent_ids.is_none());
    let results = report.results.unwrap();
    assert!(results.error.unwrap().starts_with("Too many patents (15)"));
    assert!(results.statistics.is_none());
}

#[tokio::test]
async fn test_loaded_records_round_trip() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, sql) = seeded(&tmp).await;
    let mem = memory_corpus(&fixture());
    let ids: Vec<i64> = (1..=30).collect();

    assert_eq!(
        sql.load_patents(&ids).await.unwrap(),
        mem.load_patents(&ids).await.unwrap()
    );
    let mut claims = sql.numeric_values(&ids, StatField::ClaimsCount).await.unwrap();
    claims.sort_by(f64::total_cmp);
    let mut expected = mem.numeric_values(&ids, StatField::ClaimsCount).await.unwrap();
    expected.sort_by(f64::total_cmp);
    assert_eq!(claims, expected);
    assert!(sql
        .numeric_values(&ids, StatField::IncomingCitationsCount)
        .await
        .unwrap()
        .is_empty());

    let mut from_sql = sql.citations_touching(&[3]).await.unwrap();
    let mut from_mem = mem.citations_touching(&[3]).await.unwrap();
    from_sql.sort_by_key(|c| c.id);
    from_mem.sort_by_key(|c| c.id);
    assert_eq!(from_sql, from_mem);
    assert!(from_sql.iter().any(|c| c.cited_patent_id.is_none()));

    let titles = sql
        .cpc_titles(&["H".into(), "H01S5/00".into(), "X99".into()])
        .await
        .unwrap();
    assert_eq!(titles.len(), 2);
    assert_eq!(titles["H01S5/00"], "Semiconductor lasers");
}

#[tokio::test]
async fn test_unknown_cpc_codes_respect_level() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, sql) = seeded(&tmp).await;
    use patent_inspector_core::models::CpcLevel;

    let unknown = sql
        .unknown_cpc_codes(CpcLevel::Class, &["H01".into(), "H".into(), "Z99".into()])
        .await
        .unwrap();
    assert_eq!(unknown, vec!["H".to_string(), "Z99".to_string()]);
}

#[tokio::test]
async fn test_reimport_replaces_related_rows() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, sql) = seeded(&tmp).await;

    let again = import::import_fixture(sql.pool(), &fixture()).await.unwrap();
    assert_eq!(again.patents, 30);

    let inventors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM inventors")
        .fetch_one(sql.pool())
        .await
        .unwrap();
    assert_eq!(inventors, 30);
    let record = sql.load_patents(&[4]).await.unwrap();
    assert_eq!(record[0].inventors.len(), 1);
}

#[tokio::test]
async fn test_report_store_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let (_cfg, sql) = seeded(&tmp).await;
    let store = SqliteReports::new(sql.pool().clone());

    let first = store
        .create(NewReport {
            owner: "alice".into(),
            notify_owner: true,
            filters: FilterSpec::default(),
            status: ReportStatus::WaitingForAnalysis,
        })
        .await
        .unwrap();
    let second = store
        .create(NewReport {
            owner: "alice".into(),
            notify_owner: false,
            filters: FilterSpec::default(),
            status: ReportStatus::WaitingForAnalysis,
        })
        .await
        .unwrap();

    let listed: Vec<i64> = store
        .list("alice")
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(listed, vec![second.id, first.id]);
    assert!(store.list("bob").await.unwrap().is_empty());

    let mut updated = first.clone();
    updated.status = ReportStatus::Idle;
    updated.patent_ids = Some(vec![1, 2, 3]);
    updated.executed_successfully = Some(true);
    assert!(store.save(&updated).await.unwrap());
    assert_eq!(store.get(first.id).await.unwrap(), Some(updated.clone()));

    assert!(store.delete(first.id).await.unwrap());
    assert!(!store.delete(first.id).await.unwrap());
    assert!(!store.save(&updated).await.unwrap());
    assert_eq!(store.get(first.id).await.unwrap(), None);
}

#[tokio::test]
async fn test_full_report_over_sqlite() {
    let tmp = TempDir::new().unwrap();
    let (cfg, _sql) = seeded(&tmp).await;
    let service = ReportService::open(&cfg).await.unwrap();

    let filters = patent(PatentFilter {
        office: Some("US".into()),
        patent_type: Some("utility".into()),
        granted_date: Some(DateRange::new(
            Some(date("2010-01-01")),
            Some(date("2015-12-31")),
        )),
        ..PatentFilter::default()
    });
    let id = service.submit("alice", filters, false).await.unwrap();
    service.shutdown().await;

    let report = service.get("alice", id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Idle);
    assert_eq!(report.executed_successfully, Some(true));
    let results = report.results.unwrap();
    assert!(results.is_complete());
    assert_eq!(results.patents_count, Some(15));

    let export = cfg.reports.export_dir.join("exports").join(format!("{}.xlsx", id));
    assert!(Path::new(&export).exists());
    let bytes = service.download_export("alice", id).await.unwrap();
    assert_eq!(bytes, fs::read(&export).unwrap());

}
