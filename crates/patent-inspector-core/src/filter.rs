//! Filter compiler.
//!
//! A report's filters arrive as a declarative [`FilterSpec`] split into five
//! namespaces (patent, CPC, PCT, inventor, assignee). This module:
//!
//! 1. Removes CPC selections made redundant by a selected ancestor
//!    ([`remove_redundant_cpc`]).
//! 2. Checks the spec for structural problems ([`validate`]).
//! 3. Compiles it into a store-agnostic [`Predicate`] AST ([`compile`]).
//!
//! The AST is evaluated directly by the in-memory corpus through
//! [`Predicate::matches`] and translated to SQL by the SQLite corpus.
//!
//! # Matching rules
//!
//! | Filter | Rule |
//! |--------|------|
//! | office, type | exact |
//! | date / integer ranges | inclusive on both ends, either end open |
//! | keywords | whole word, case-insensitive, `and` / `or` |
//! | names, organizations | case-insensitive prefix, any of the list |
//! | CPC codes | prefix of some CPC group of the patent, ORed across levels |
//! | locations | haversine distance ≤ radius (metres) |
//!
//! PCT, inventor and assignee clauses are wrapped in [`Predicate::Any`]: a
//! single related row must satisfy every clause of its namespace.

use std::borrow::Cow;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FilterError;
use crate::models::{
    Assignee, CpcLevel, GeoPoint, Inventor, Location, PatentRecord, PctRecord, OFFICES,
    PATENT_TYPES,
};

/// Mean earth radius in metres.
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

// ============ Filter spec ============

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub start: Option<NaiveDate>,
    #[serde(default)]
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self { start, end }
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.map_or(true, |s| date >= s) && self.end.map_or(true, |e| date <= e)
    }

    fn is_ordered(&self) -> bool {
        match (self.start, self.end) {
            (Some(s), Some(e)) => s <= e,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    #[serde(default)]
    pub min: Option<i64>,
    #[serde(default)]
    pub max: Option<i64>,
}

impl IntRange {
    pub fn new(min: Option<i64>, max: Option<i64>) -> Self {
        Self { min, max }
    }

    pub fn is_unbounded(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    pub fn contains(&self, value: i64) -> bool {
        self.min.map_or(true, |m| value >= m) && self.max.map_or(true, |m| value <= m)
    }

    fn is_ordered(&self) -> bool {
        match (self.min, self.max) {
            (Some(lo), Some(hi)) => lo <= hi,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordLogic {
    #[default]
    And,
    Or,
}

/// A circle on the earth's surface; `radius` is in metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoRadius {
    pub lat: f64,
    pub lng: f64,
    pub radius: f64,
}

/// Axis-aligned lat/lng box enclosing a [`GeoRadius`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl GeoRadius {
    pub fn center(&self) -> GeoPoint {
        GeoPoint {
            lat: self.lat,
            lng: self.lng,
        }
    }

    pub fn contains(&self, point: GeoPoint) -> bool {
        haversine_m(self.center(), point) <= self.radius
    }

    /// A box guaranteed to contain every point within the radius. Boxes that
    /// would reach a pole or cross the antimeridian widen to all longitudes.
    pub fn bounding_box(&self) -> BoundingBox {
        let dlat = (self.radius / EARTH_RADIUS_M).to_degrees();
        let min_lat = (self.lat - dlat).max(-90.0);
        let max_lat = (self.lat + dlat).min(90.0);
        let cos_lat = self.lat.to_radians().cos();

        let full = BoundingBox {
            min_lat,
            max_lat,
            min_lng: -180.0,
            max_lng: 180.0,
        };
        if max_lat >= 90.0 || min_lat <= -90.0 || cos_lat < 1e-9 {
            return full;
        }
        let dlng = (dlat / cos_lat).min(180.0);
        let (min_lng, max_lng) = (self.lng - dlng, self.lng + dlng);
        if min_lng < -180.0 || max_lng > 180.0 {
            return full;
        }
        BoundingBox {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        }
    }

    fn check(&self, field: &'static str) -> Result<(), FilterError> {
        let fail = |reason: &str| {
            Err(FilterError::InvalidLocation {
                field,
                reason: reason.to_string(),
            })
        };
        if !(-90.0..=90.0).contains(&self.lat) {
            return fail("latitude must be within [-90, 90]");
        }
        if !(-180.0..=180.0).contains(&self.lng) {
            return fail("longitude must be within [-180, 180]");
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return fail("radius must be a positive number of metres");
        }
        Ok(())
    }
}

/// Great-circle distance in metres.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatentFilter {
    pub office: Option<String>,
    #[serde(rename = "type")]
    pub patent_type: Option<String>,
    pub keywords: Vec<String>,
    pub keywords_logic: KeywordLogic,
    pub application_filed_date: Option<DateRange>,
    pub granted_date: Option<DateRange>,
    pub figures_count: Option<IntRange>,
    pub claims_count: Option<IntRange>,
    pub sheets_count: Option<IntRange>,
    pub withdrawn: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpcFilter {
    pub section: Vec<String>,
    pub class: Vec<String>,
    pub subclass: Vec<String>,
    pub group: Vec<String>,
}

impl CpcFilter {
    pub fn codes(&self, level: CpcLevel) -> &[String] {
        match level {
            CpcLevel::Section => &self.section,
            CpcLevel::Class => &self.class,
            CpcLevel::Subclass => &self.subclass,
            CpcLevel::Group => &self.group,
        }
    }

    fn codes_mut(&mut self, level: CpcLevel) -> &mut Vec<String> {
        match level {
            CpcLevel::Section => &mut self.section,
            CpcLevel::Class => &mut self.class,
            CpcLevel::Subclass => &mut self.subclass,
            CpcLevel::Group => &mut self.group,
        }
    }

    pub fn is_empty(&self) -> bool {
        CpcLevel::ALL.iter().all(|l| self.codes(*l).is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PctFilter {
    pub application_date: Option<DateRange>,
    pub granted: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorFilter {
    pub first_name: Vec<String>,
    pub last_name: Vec<String>,
    pub location: Option<GeoRadius>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssigneeFilter {
    pub first_name: Vec<String>,
    pub last_name: Vec<String>,
    pub organization: Vec<String>,
    pub location: Option<GeoRadius>,
}

/// The declarative filters of a report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    pub patent: PatentFilter,
    pub cpc: CpcFilter,
    pub pct: PctFilter,
    pub inventor: InventorFilter,
    pub assignee: AssigneeFilter,
}

// ============ CPC redundancy ============

/// Drop every CPC selection already covered by a selected ancestor.
///
/// Levels are processed top-down, so selecting `A01` removes `A01B` and
/// `A01B1/00` but leaves `A02` alone. Running it twice changes nothing.
pub fn remove_redundant_cpc(cpc: &mut CpcFilter) {
    for (i, level) in CpcLevel::ALL.iter().enumerate() {
        let selected = cpc.codes(*level).to_vec();
        if selected.is_empty() {
            continue;
        }
        for lower in &CpcLevel::ALL[i + 1..] {
            cpc.codes_mut(*lower)
                .retain(|code| !selected.iter().any(|s| code.starts_with(s.as_str())));
        }
    }
}

// ============ Validation ============

/// Structural validation. CPC code existence needs the corpus and is
/// checked by the report service.
pub fn validate(spec: &FilterSpec) -> Result<(), FilterError> {
    let p = &spec.patent;
    if let Some(office) = &p.office {
        if !OFFICES.contains(&office.as_str()) {
            return Err(FilterError::UnknownOffice(office.clone()));
        }
    }
    if let Some(kind) = &p.patent_type {
        if !PATENT_TYPES.contains(&kind.as_str()) {
            return Err(FilterError::UnknownType(kind.clone()));
        }
    }
    if p.keywords.iter().any(|k| k.trim().is_empty()) {
        return Err(FilterError::BlankKeyword);
    }

    let date_ranges = [
        ("patent.application_filed_date", &p.application_filed_date),
        ("patent.granted_date", &p.granted_date),
        ("pct.application_date", &spec.pct.application_date),
    ];
    for (field, range) in date_ranges {
        if range.is_some_and(|r| !r.is_ordered()) {
            return Err(FilterError::InvalidRange { field });
        }
    }
    let int_ranges = [
        ("patent.figures_count", &p.figures_count),
        ("patent.claims_count", &p.claims_count),
        ("patent.sheets_count", &p.sheets_count),
    ];
    for (field, range) in int_ranges {
        if range.is_some_and(|r| !r.is_ordered()) {
            return Err(FilterError::InvalidRange { field });
        }
    }

    if let Some(geo) = &spec.inventor.location {
        geo.check("inventor")?;
    }
    if let Some(geo) = &spec.assignee.location {
        geo.check("assignee")?;
    }
    Ok(())
}

// ============ Predicate AST ============

/// A keyword matched as a whole word, ignoring case.
///
/// Serializes as the bare keyword; the pattern is rebuilt on deserialize.
#[derive(Debug, Clone)]
pub struct WholeWord {
    word: String,
    regex: Regex,
}

impl WholeWord {
    pub fn new(word: &str) -> Result<Self, FilterError> {
        let word = word.trim().to_string();
        if word.is_empty() {
            return Err(FilterError::BlankKeyword);
        }
        let regex = Regex::new(&Self::pattern_for(&word)).map_err(|e| {
            FilterError::InvalidKeyword {
                keyword: word.clone(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self { word, regex })
    }

    fn pattern_for(word: &str) -> String {
        format!(r"(?i)\b{}\b", regex::escape(word))
    }

    pub fn as_str(&self) -> &str {
        &self.word
    }

    /// The regular expression used for matching, suitable for a SQL
    /// `REGEXP` operator backed by the same engine.
    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for WholeWord {
    fn eq(&self, other: &Self) -> bool {
        self.word == other.word
    }
}

impl Serialize for WholeWord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.word)
    }
}

impl<'de> Deserialize<'de> for WholeWord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let word = String::deserialize(deserializer)?;
        WholeWord::new(&word).map_err(serde::de::Error::custom)
    }
}

/// A column a clause can test. Each field belongs to exactly one scope:
/// the patent itself or one of its related rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Office,
    PatentType,
    /// `title_processed + " " + abstract_processed`
    ProcessedText,
    ApplicationFiledDate,
    GrantedDate,
    FiguresCount,
    ClaimsCount,
    SheetsCount,
    Withdrawn,
    CpcGroup,
    PctDate,
    PctGranted,
    FirstName,
    LastName,
    Organization,
    Location,
}

/// Rows related to a patent that [`Predicate::Any`] can range over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    CpcGroups,
    Pct,
    Inventors,
    Assignees,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    Equals(String),
    Flag(bool),
    DateRange(DateRange),
    IntRange(IntRange),
    WholeWords {
        words: Vec<WholeWord>,
        logic: KeywordLogic,
    },
    /// Case-insensitive prefix match against any of the listed values.
    PrefixAny(Vec<String>),
    WithinRadius(GeoRadius),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub field: Field,
    pub condition: Condition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Always,
    Clause(Clause),
    And {
        all: Vec<Predicate>,
    },
    Or {
        any: Vec<Predicate>,
    },
    /// True when at least one related row satisfies `predicate`.
    Any {
        relation: Relation,
        predicate: Box<Predicate>,
    },
}

impl Predicate {
    pub fn clause(field: Field, condition: Condition) -> Self {
        Predicate::Clause(Clause { field, condition })
    }

    /// Conjunction that collapses trivial cases: no parts is [`Predicate::Always`]
    /// and a single part is returned as is.
    pub fn and(mut parts: Vec<Predicate>) -> Self {
        parts.retain(|p| *p != Predicate::Always);
        match parts.len() {
            0 => Predicate::Always,
            1 => parts.remove(0),
            _ => Predicate::And { all: parts },
        }
    }

    pub fn any(relation: Relation, inner: Predicate) -> Self {
        Predicate::Any {
            relation,
            predicate: Box::new(inner),
        }
    }

    /// Whether any clause tests a geographic radius.
    pub fn has_geo(&self) -> bool {
        match self {
            Predicate::Always => false,
            Predicate::Clause(c) => matches!(c.condition, Condition::WithinRadius(_)),
            Predicate::And { all: parts } | Predicate::Or { any: parts } => {
                parts.iter().any(Predicate::has_geo)
            }
            Predicate::Any { predicate, .. } => predicate.has_geo(),
        }
    }

    /// The parts of a conjunction that contain a radius clause, with their
    /// enclosing related-row tests. [`Predicate::Always`] when there are none.
    pub fn geo_part(&self) -> Predicate {
        match self {
            Predicate::And { all } => Predicate::and(all.iter().map(Predicate::geo_part).collect()),
            p if p.has_geo() => p.clone(),
            _ => Predicate::Always,
        }
    }

    /// Evaluate the predicate against a fully loaded patent record.
    pub fn matches(&self, record: &PatentRecord) -> bool {
        self.eval(&Scope::Patent(record))
    }

    /// Evaluate against the inventor and assignee rows of one patent. Any
    /// other field reads as missing, so this is meant for [`Self::geo_part`].
    pub fn matches_parties(&self, inventors: &[Inventor], assignees: &[Assignee]) -> bool {
        self.eval(&Scope::Parties {
            inventors,
            assignees,
        })
    }

    fn eval(&self, scope: &Scope<'_>) -> bool {
        match self {
            Predicate::Always => true,
            Predicate::Clause(c) => c.condition.test(&scope.value(c.field)),
            Predicate::And { all } => all.iter().all(|p| p.eval(scope)),
            Predicate::Or { any } => any.iter().any(|p| p.eval(scope)),
            Predicate::Any {
                relation,
                predicate,
            } => match relation {
                Relation::CpcGroups => scope
                    .cpc_groups()
                    .iter()
                    .any(|g| predicate.eval(&Scope::Cpc(g))),
                Relation::Pct => scope.pct().iter().any(|p| predicate.eval(&Scope::Pct(p))),
                Relation::Inventors => scope
                    .inventors()
                    .iter()
                    .any(|i| predicate.eval(&Scope::Inventor(i))),
                Relation::Assignees => scope
                    .assignees()
                    .iter()
                    .any(|a| predicate.eval(&Scope::Assignee(a))),
            },
        }
    }
}

enum Scope<'a> {
    Patent(&'a PatentRecord),
    Parties {
        inventors: &'a [Inventor],
        assignees: &'a [Assignee],
    },
    Cpc(&'a str),
    Pct(&'a PctRecord),
    Inventor(&'a Inventor),
    Assignee(&'a Assignee),
}

enum Value<'a> {
    Text(Cow<'a, str>),
    Date(NaiveDate),
    Int(i64),
    Bool(bool),
    Point(GeoPoint),
    Missing,
}

impl<'a> Scope<'a> {
    fn cpc_groups(&self) -> &'a [String] {
        match *self {
            Scope::Patent(r) => &r.cpc_groups,
            _ => &[],
        }
    }

    fn pct(&self) -> &'a [PctRecord] {
        match *self {
            Scope::Patent(r) => &r.pct,
            _ => &[],
        }
    }

    fn inventors(&self) -> &'a [Inventor] {
        match *self {
            Scope::Patent(r) => &r.inventors,
            Scope::Parties { inventors, .. } => inventors,
            _ => &[],
        }
    }

    fn assignees(&self) -> &'a [Assignee] {
        match *self {
            Scope::Patent(r) => &r.assignees,
            Scope::Parties { assignees, .. } => assignees,
            _ => &[],
        }
    }

    fn value(&self, field: Field) -> Value<'a> {
        fn text(s: Option<&str>) -> Value<'_> {
            s.map_or(Value::Missing, |s| Value::Text(Cow::Borrowed(s)))
        }
        fn point(loc: Option<&Location>) -> Value<'static> {
            loc.and_then(|l| l.point).map_or(Value::Missing, Value::Point)
        }

        match (self, field) {
            (Scope::Patent(r), Field::Office) => text(Some(&r.patent.office)),
            (Scope::Patent(r), Field::PatentType) => text(r.patent.patent_type.as_deref()),
            (Scope::Patent(r), Field::ProcessedText) => {
                Value::Text(Cow::Owned(r.patent.processed_text()))
            }
            (Scope::Patent(r), Field::ApplicationFiledDate) => r
                .patent
                .application_filed_date
                .map_or(Value::Missing, Value::Date),
            (Scope::Patent(r), Field::GrantedDate) => Value::Date(r.patent.granted_date),
            (Scope::Patent(r), Field::FiguresCount) => {
                r.patent.figures_count.map_or(Value::Missing, Value::Int)
            }
            (Scope::Patent(r), Field::ClaimsCount) => Value::Int(r.patent.claims_count),
            (Scope::Patent(r), Field::SheetsCount) => {
                r.patent.sheets_count.map_or(Value::Missing, Value::Int)
            }
            (Scope::Patent(r), Field::Withdrawn) => Value::Bool(r.patent.withdrawn),
            (Scope::Cpc(code), Field::CpcGroup) => text(Some(*code)),
            (Scope::Pct(p), Field::PctDate) => Value::Date(p.published_or_filed_date),
            (Scope::Pct(p), Field::PctGranted) => Value::Bool(p.granted),
            (Scope::Inventor(i), Field::FirstName) => text(i.first_name.as_deref()),
            (Scope::Inventor(i), Field::LastName) => text(i.last_name.as_deref()),
            (Scope::Inventor(i), Field::Location) => point(i.location.as_ref()),
            (Scope::Assignee(a), Field::FirstName) => text(a.first_name.as_deref()),
            (Scope::Assignee(a), Field::LastName) => text(a.last_name.as_deref()),
            (Scope::Assignee(a), Field::Organization) => text(a.organization.as_deref()),
            (Scope::Assignee(a), Field::Location) => point(a.location.as_ref()),
            _ => Value::Missing,
        }
    }
}

impl Condition {
    fn test(&self, value: &Value<'_>) -> bool {
        match (self, value) {
            (Condition::Equals(want), Value::Text(got)) => got == want,
            (Condition::Flag(want), Value::Bool(got)) => got == want,
            (Condition::DateRange(r), Value::Date(d)) => r.contains(*d),
            (Condition::IntRange(r), Value::Int(n)) => r.contains(*n),
            (Condition::WholeWords { words, logic }, Value::Text(text)) => match logic {
                KeywordLogic::And => words.iter().all(|w| w.is_match(text)),
                KeywordLogic::Or => words.iter().any(|w| w.is_match(text)),
            },
            (Condition::PrefixAny(prefixes), Value::Text(text)) => {
                let text = text.to_lowercase();
                prefixes
                    .iter()
                    .any(|p| text.starts_with(p.to_lowercase().as_str()))
            }
            (Condition::WithinRadius(geo), Value::Point(p)) => geo.contains(*p),
            _ => false,
        }
    }
}

// ============ Compilation ============

/// Validate `spec` and compile it into a [`Predicate`].
pub fn compile(spec: &FilterSpec) -> Result<Predicate, FilterError> {
    validate(spec)?;

    let mut parts = Vec::new();
    let p = &spec.patent;

    if let Some(office) = &p.office {
        parts.push(Predicate::clause(
            Field::Office,
            Condition::Equals(office.clone()),
        ));
    }
    if let Some(kind) = &p.patent_type {
        parts.push(Predicate::clause(
            Field::PatentType,
            Condition::Equals(kind.clone()),
        ));
    }
    if !p.keywords.is_empty() {
        let words = p
            .keywords
            .iter()
            .map(|k| WholeWord::new(k))
            .collect::<Result<Vec<_>, _>>()?;
        parts.push(Predicate::clause(
            Field::ProcessedText,
            Condition::WholeWords {
                words,
                logic: p.keywords_logic,
            },
        ));
    }
    push_date_range(&mut parts, Field::ApplicationFiledDate, p.application_filed_date);
    push_date_range(&mut parts, Field::GrantedDate, p.granted_date);
    push_int_range(&mut parts, Field::FiguresCount, p.figures_count);
    push_int_range(&mut parts, Field::ClaimsCount, p.claims_count);
    push_int_range(&mut parts, Field::SheetsCount, p.sheets_count);
    if let Some(withdrawn) = p.withdrawn {
        parts.push(Predicate::clause(Field::Withdrawn, Condition::Flag(withdrawn)));
    }

    let cpc_codes: Vec<String> = CpcLevel::ALL
        .iter()
        .flat_map(|l| spec.cpc.codes(*l).iter().cloned())
        .collect();
    if !cpc_codes.is_empty() {
        parts.push(Predicate::any(
            Relation::CpcGroups,
            Predicate::clause(Field::CpcGroup, Condition::PrefixAny(cpc_codes)),
        ));
    }

    let mut pct = Vec::new();
    push_date_range(&mut pct, Field::PctDate, spec.pct.application_date);
    if let Some(granted) = spec.pct.granted {
        pct.push(Predicate::clause(Field::PctGranted, Condition::Flag(granted)));
    }
    push_related(&mut parts, Relation::Pct, pct);

    let inv = &spec.inventor;
    let mut inventor = Vec::new();
    push_prefixes(&mut inventor, Field::FirstName, &inv.first_name);
    push_prefixes(&mut inventor, Field::LastName, &inv.last_name);
    if let Some(geo) = inv.location {
        inventor.push(Predicate::clause(
            Field::Location,
            Condition::WithinRadius(geo),
        ));
    }
    push_related(&mut parts, Relation::Inventors, inventor);

    let asg = &spec.assignee;
    let mut assignee = Vec::new();
    push_prefixes(&mut assignee, Field::FirstName, &asg.first_name);
    push_prefixes(&mut assignee, Field::LastName, &asg.last_name);
    push_prefixes(&mut assignee, Field::Organization, &asg.organization);
    if let Some(geo) = asg.location {
        assignee.push(Predicate::clause(
            Field::Location,
            Condition::WithinRadius(geo),
        ));
    }
    push_related(&mut parts, Relation::Assignees, assignee);

    Ok(Predicate::and(parts))
}

fn push_date_range(parts: &mut Vec<Predicate>, field: Field, range: Option<DateRange>) {
    if let Some(range) = range.filter(|r| !r.is_unbounded()) {
        parts.push(Predicate::clause(field, Condition::DateRange(range)));
    }
}

fn push_int_range(parts: &mut Vec<Predicate>, field: Field, range: Option<IntRange>) {
    if let Some(range) = range.filter(|r| !r.is_unbounded()) {
        parts.push(Predicate::clause(field, Condition::IntRange(range)));
    }
}

fn push_prefixes(parts: &mut Vec<Predicate>, field: Field, values: &[String]) {
    let values: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    if !values.is_empty() {
        parts.push(Predicate::clause(field, Condition::PrefixAny(values)));
    }
}

fn push_related(parts: &mut Vec<Predicate>, relation: Relation, inner: Vec<Predicate>) {
    if !inner.is_empty() {
        parts.push(Predicate::any(relation, Predicate::and(inner)));
    }
}
