//! Translation of the filter predicate AST into SQLite `WHERE` clauses.
//!
//! The outer query always ranges over `patents p`. Each
//! [`Predicate::Any`] becomes a correlated `EXISTS` subquery over the
//! related table with a fresh alias, so nested clauses test a single
//! related row:
//!
//! | Relation | Table | Joined |
//! |----------|-------|--------|
//! | `CpcGroups` | `patent_cpc_groups` | |
//! | `Pct` | `pct_data` | |
//! | `Inventors` | `inventors` | `locations` |
//! | `Assignees` | `assignees` | `locations` |
//!
//! Keywords use the `REGEXP` operator with the same pattern the in-memory
//! evaluator uses. Geo-radius clauses only emit a bounding box; callers
//! must refine candidates with [`Predicate::matches`] when
//! [`SqlFilter::needs_refine`] is set.

use patent_inspector_core::filter::{
    Condition, DateRange, Field, IntRange, KeywordLogic, Predicate, Relation,
};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments};

/// Maximum number of ids bound into one `IN (...)` list.
pub const ID_BATCH: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
}

/// A translated predicate: SQL text plus positional bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    pub clause: String,
    pub binds: Vec<SqlValue>,
    /// Some clause was approximated and must be re-checked in Rust.
    pub needs_refine: bool,
}

impl SqlFilter {
    pub fn bind_to<'q>(
        &self,
        mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    ) -> Query<'q, Sqlite, SqliteArguments<'q>> {
        for value in &self.binds {
            query = match value {
                SqlValue::Text(s) => query.bind(s.clone()),
                SqlValue::Int(n) => query.bind(*n),
                SqlValue::Float(f) => query.bind(*f),
            };
        }
        query
    }
}

#[derive(Clone, Copy)]
enum Scope {
    Patent,
    Related(Relation, usize),
}

struct Translator {
    binds: Vec<SqlValue>,
    needs_refine: bool,
    next_alias: usize,
}

/// Translate `predicate` for a query whose patent table is aliased `p`.
pub fn translate(predicate: &Predicate) -> SqlFilter {
    let mut t = Translator {
        binds: Vec::new(),
        needs_refine: false,
        next_alias: 0,
    };
    let clause = t.predicate(predicate, Scope::Patent);
    SqlFilter {
        clause,
        binds: t.binds,
        needs_refine: t.needs_refine,
    }
}

/// `?, ?, ?` with `n` placeholders.
pub fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Escape `%`, `_` and `\` for a `LIKE ... ESCAPE '\'` pattern.
fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

impl Translator {
    fn predicate(&mut self, predicate: &Predicate, scope: Scope) -> String {
        match predicate {
            Predicate::Always => "1".to_string(),
            Predicate::Clause(c) => self.condition(&c.condition, column(scope, c.field)),
            Predicate::And { all } => self.join(all, " AND ", "1", scope),
            Predicate::Or { any } => self.join(any, " OR ", "0", scope),
            Predicate::Any {
                relation,
                predicate,
            } => {
                if !matches!(scope, Scope::Patent) {
                    return "0".to_string();
                }
                self.next_alias += 1;
                let n = self.next_alias;
                let inner = self.predicate(predicate, Scope::Related(*relation, n));
                let from = match relation {
                    Relation::CpcGroups => format!("patent_cpc_groups r{n}"),
                    Relation::Pct => format!("pct_data r{n}"),
                    Relation::Inventors => {
                        format!("inventors r{n} LEFT JOIN locations l{n} ON l{n}.id = r{n}.location_id")
                    }
                    Relation::Assignees => {
                        format!("assignees r{n} LEFT JOIN locations l{n} ON l{n}.id = r{n}.location_id")
                    }
                };
                format!("EXISTS (SELECT 1 FROM {from} WHERE r{n}.patent_id = p.id AND ({inner}))")
            }
        }
    }

    fn join(&mut self, parts: &[Predicate], sep: &str, empty: &str, scope: Scope) -> String {
        if parts.is_empty() {
            return empty.to_string();
        }
        let rendered: Vec<String> = parts
            .iter()
            .map(|p| format!("({})", self.predicate(p, scope)))
            .collect();
        rendered.join(sep)
    }

    fn condition(&mut self, condition: &Condition, column: Option<Column>) -> String {
        let Some(column) = column else {
            return "0".to_string();
        };
        match (condition, column) {
            (Condition::Equals(v), Column::Scalar(col)) => {
                self.binds.push(SqlValue::Text(v.clone()));
                format!("{col} = ?")
            }
            (Condition::Flag(v), Column::Scalar(col)) => {
                self.binds.push(SqlValue::Int(i64::from(*v)));
                format!("{col} = ?")
            }
            (Condition::DateRange(r), Column::Scalar(col)) => self.date_range(&col, r),
            (Condition::IntRange(r), Column::Scalar(col)) => self.int_range(&col, r),
            (Condition::WholeWords { words, logic }, Column::Scalar(col)) => {
                if words.is_empty() {
                    return "1".to_string();
                }
                let sep = match logic {
                    KeywordLogic::And => " AND ",
                    KeywordLogic::Or => " OR ",
                };
                let parts: Vec<String> = words
                    .iter()
                    .map(|w| {
                        self.binds.push(SqlValue::Text(w.pattern().to_string()));
                        format!("{col} REGEXP ?")
                    })
                    .collect();
                format!("({})", parts.join(sep))
            }
            (Condition::PrefixAny(prefixes), Column::Scalar(col)) => {
                if prefixes.is_empty() {
                    return "0".to_string();
                }
                let parts: Vec<String> = prefixes
                    .iter()
                    .map(|prefix| {
                        self.binds
                            .push(SqlValue::Text(format!("{}%", escape_like(prefix))));
                        format!("{col} LIKE ? ESCAPE '\\'")
                    })
                    .collect();
                format!("({})", parts.join(" OR "))
            }
            (Condition::WithinRadius(geo), Column::Point { lat, lng }) => {
                self.needs_refine = true;
                let bbox = geo.bounding_box();
                self.binds.extend([
                    SqlValue::Float(bbox.min_lat),
                    SqlValue::Float(bbox.max_lat),
                    SqlValue::Float(bbox.min_lng),
                    SqlValue::Float(bbox.max_lng),
                ]);
                format!("({lat} BETWEEN ? AND ? AND {lng} BETWEEN ? AND ?)")
            }
            _ => "0".to_string(),
        }
    }

    fn date_range(&mut self, col: &str, range: &DateRange) -> String {
        let mut parts = vec![format!("{col} IS NOT NULL")];
        if let Some(start) = range.start {
            self.binds.push(SqlValue::Text(start.to_string()));
            parts.push(format!("{col} >= ?"));
        }
        if let Some(end) = range.end {
            self.binds.push(SqlValue::Text(end.to_string()));
            parts.push(format!("{col} <= ?"));
        }
        parts.join(" AND ")
    }

    fn int_range(&mut self, col: &str, range: &IntRange) -> String {
        let mut parts = vec![format!("{col} IS NOT NULL")];
        if let Some(min) = range.min {
            self.binds.push(SqlValue::Int(min));
            parts.push(format!("{col} >= ?"));
        }
        if let Some(max) = range.max {
            self.binds.push(SqlValue::Int(max));
            parts.push(format!("{col} <= ?"));
        }
        parts.join(" AND ")
    }
}

enum Column {
    Scalar(String),
    Point { lat: String, lng: String },
}

/// The SQL expression for `field` in `scope`; `None` when the field does
/// not exist there.
fn column(scope: Scope, field: Field) -> Option<Column> {
    let scalar = |s: String| Some(Column::Scalar(s));
    match scope {
        Scope::Patent => match field {
            Field::Office => scalar("p.office".into()),
            Field::PatentType => scalar("p.type".into()),
            Field::ProcessedText => scalar(
                "(COALESCE(p.title_processed, '') || ' ' || COALESCE(p.abstract_processed, ''))"
                    .into(),
            ),
            Field::ApplicationFiledDate => scalar("p.application_filed_date".into()),
            Field::GrantedDate => scalar("p.granted_date".into()),
            Field::FiguresCount => scalar("p.figures_count".into()),
            Field::ClaimsCount => scalar("p.claims_count".into()),
            Field::SheetsCount => scalar("p.sheets_count".into()),
            Field::Withdrawn => scalar("p.withdrawn".into()),
            _ => None,
        },
        Scope::Related(relation, n) => match (relation, field) {
            (Relation::CpcGroups, Field::CpcGroup) => scalar(format!("r{n}.cpc_group_code")),
            (Relation::Pct, Field::PctDate) => scalar(format!("r{n}.published_or_filed_date")),
            (Relation::Pct, Field::PctGranted) => scalar(format!("r{n}.granted")),
            (Relation::Inventors | Relation::Assignees, Field::FirstName) => {
                scalar(format!("r{n}.first_name"))
            }
            (Relation::Inventors | Relation::Assignees, Field::LastName) => {
                scalar(format!("r{n}.last_name"))
            }
            (Relation::Assignees, Field::Organization) => scalar(format!("r{n}.organization")),
            (Relation::Inventors | Relation::Assignees, Field::Location) => Some(Column::Point {
                lat: format!("l{n}.lat"),
                lng: format!("l{n}.lng"),
            }),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use patent_inspector_core::filter::{compile, FilterSpec, GeoRadius};

    #[test]
    fn empty_spec_is_true() {
        let sql = translate(&compile(&FilterSpec::default()).unwrap());
        assert_eq!(sql.clause, "1");
        assert!(sql.binds.is_empty());
        assert!(!sql.needs_refine);
    }

    #[test]
    fn open_ended_date_range_binds_one_value() {
        let pred = Predicate::clause(
            Field::GrantedDate,
            Condition::DateRange(DateRange::new(
                NaiveDate::from_ymd_opt(2010, 1, 1),
                None,
            )),
        );
        let sql = translate(&pred);
        assert_eq!(
            sql.clause,
            "p.granted_date IS NOT NULL AND p.granted_date >= ?"
        );
        assert_eq!(sql.binds, vec![SqlValue::Text("2010-01-01".into())]);
    }

    #[test]
    fn related_clauses_share_one_exists() {
        let mut spec = FilterSpec::default();
        spec.inventor.last_name = vec!["Smi_th".into()];
        spec.inventor.location = Some(GeoRadius {
            lat: 40.0,
            lng: -74.0,
            radius: 10_000.0,
        });
        let sql = translate(&compile(&spec).unwrap());
        assert!(sql.clause.starts_with("EXISTS (SELECT 1 FROM inventors r1"));
        assert_eq!(sql.clause.matches("EXISTS").count(), 1);
        assert!(sql.needs_refine);
        assert_eq!(sql.binds[0], SqlValue::Text("Smi\\_th%".into()));
        assert_eq!(sql.binds.len(), 5);
    }

    #[test]
    fn keywords_use_regexp() {
        let mut spec = FilterSpec::default();
        spec.patent.keywords = vec!["laser".into(), "diode".into()];
        let sql = translate(&compile(&spec).unwrap());
        assert_eq!(sql.clause.matches("REGEXP ?").count(), 2);
        assert!(sql.clause.contains(" AND "));
    }

    #[test]
    fn field_outside_its_scope_is_false() {
        let pred = Predicate::clause(Field::FirstName, Condition::PrefixAny(vec!["a".into()]));
        assert_eq!(translate(&pred).clause, "0");
    }

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
