//! Filter maps to parameterised WHERE clauses.
//!
//! Callers pass loosely typed `key -> value` maps. Each repository declares a
//! [`FilterSpec`] naming the keys it understands; everything else is ignored.
//! Values are always bound, never spliced into the SQL text.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::{Query, QueryAs, QueryScalar};

use crate::analytics::dates::parse_date;
use crate::analytics::DateRange;
use crate::domain::dashboard::{Bounds, DashboardScope};
use crate::domain::enums::TokenError;
use crate::error::{CoreError, CoreResult};
use crate::pagination::PageRequest;

/// A value waiting to be bound to a `$n` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(String),
    Float(f64),
    Int(i32),
    BigInt(i64),
    Bool(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    IntArray(Vec<i32>),
}

/// How a recognised key turns into a predicate.
#[derive(Clone, Copy)]
pub enum FilterKind {
    /// Equality against an enumerated column; the token is checked first.
    Token(fn(&str) -> Result<(), TokenError>),
    /// Plain text equality.
    Text,
    /// Case-insensitive substring over one or more columns (OR-ed).
    Substring(&'static [&'static str]),
    Bool,
    Int,
}

#[derive(Clone, Copy)]
pub struct FilterField {
    pub key: &'static str,
    pub column: &'static str,
    pub kind: FilterKind,
}

impl FilterField {
    pub const fn token(key: &'static str, check: fn(&str) -> Result<(), TokenError>) -> Self {
        Self { key, column: key, kind: FilterKind::Token(check) }
    }

    pub const fn text(key: &'static str) -> Self {
        Self { key, column: key, kind: FilterKind::Text }
    }

    pub const fn substring(key: &'static str, columns: &'static [&'static str]) -> Self {
        Self { key, column: key, kind: FilterKind::Substring(columns) }
    }

    pub const fn boolean(key: &'static str) -> Self {
        Self { key, column: key, kind: FilterKind::Bool }
    }

    pub const fn int(key: &'static str) -> Self {
        Self { key, column: key, kind: FilterKind::Int }
    }
}

/// The filter keys a table understands.
pub struct FilterSpec {
    pub fields: &'static [FilterField],
    /// Date expression the `start_date`/`end_date` range applies to.
    pub date_column: &'static str,
    /// Whether the table has `latitude`/`longitude` for `bounds`.
    pub geo: bool,
}

/// Accumulated conditions and their bind values. Placeholders are numbered
/// in push order starting at `$1`.
#[derive(Debug, Clone, Default)]
pub struct SqlFilter {
    conditions: Vec<String>,
    binds: Vec<BindValue>,
}

impl SqlFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the next placeholder.
    pub fn next_param(&self) -> usize {
        self.binds.len() + 1
    }

    /// Add a condition whose `$?` markers are numbered from the next free
    /// placeholder, one per value.
    pub fn push(&mut self, template: &str, values: Vec<BindValue>) {
        let mut condition = String::with_capacity(template.len() + 4);
        let mut rest = template;
        let mut idx = self.next_param();
        while let Some(pos) = rest.find("$?") {
            condition.push_str(&rest[..pos]);
            condition.push_str(&format!("${idx}"));
            idx += 1;
            rest = &rest[pos + 2..];
        }
        condition.push_str(rest);
        self.conditions.push(condition);
        self.binds.extend(values);
    }

    /// Add a condition with no parameters.
    pub fn push_raw(&mut self, condition: impl Into<String>) {
        self.conditions.push(condition.into());
    }

    pub fn binds(&self) -> &[BindValue] {
        &self.binds
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// `WHERE a AND b ...` or the empty string.
    pub fn where_clause(&self) -> String {
        self.where_with(&[])
    }

    /// Like [`where_clause`](Self::where_clause) with extra fixed conditions.
    pub fn where_with(&self, extra: &[&str]) -> String {
        let all: Vec<&str> = self
            .conditions
            .iter()
            .map(String::as_str)
            .chain(extra.iter().copied())
            .collect();
        if all.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", all.join(" AND "))
        }
    }

    /// Conditions joined for use inside a JOIN `ON` clause; `TRUE` if none.
    pub fn conjunction(&self) -> String {
        if self.conditions.is_empty() {
            "TRUE".to_string()
        } else {
            self.conditions.join(" AND ")
        }
    }

    pub fn date_range(&mut self, column: &str, range: &DateRange) {
        self.push(
            &format!("{column} >= $? AND {column} <= $?"),
            vec![BindValue::Date(range.start), BindValue::Date(range.end)],
        );
    }

    pub fn bounds(&mut self, bounds: &Bounds) {
        self.push(
            "latitude IS NOT NULL AND longitude IS NOT NULL AND latitude BETWEEN $? AND $?",
            vec![BindValue::Float(bounds.south), BindValue::Float(bounds.north)],
        );
        if bounds.west <= bounds.east {
            self.push(
                "longitude BETWEEN $? AND $?",
                vec![BindValue::Float(bounds.west), BindValue::Float(bounds.east)],
            );
        } else {
            self.push(
                "(longitude >= $? OR longitude <= $?)",
                vec![BindValue::Float(bounds.west), BindValue::Float(bounds.east)],
            );
        }
    }

    /// Apply every recognised key of `filters`. `start_date`/`end_date` and
    /// `bounds` are handled here too; unknown keys are skipped.
    pub fn apply(
        &mut self,
        spec: &FilterSpec,
        filters: &BTreeMap<String, String>,
    ) -> CoreResult<()> {
        for (key, raw) in filters {
            let value = raw.trim();
            match key.as_str() {
                "start_date" => {
                    let date = parse_date(value)?;
                    self.push(&format!("{} >= $?", spec.date_column), vec![BindValue::Date(date)]);
                    continue;
                }
                "end_date" => {
                    let date = parse_date(value)?;
                    self.push(&format!("{} <= $?", spec.date_column), vec![BindValue::Date(date)]);
                    continue;
                }
                "bounds" if spec.geo => {
                    self.bounds(&parse_bounds(value)?);
                    continue;
                }
                _ => {}
            }

            let Some(field) = spec.fields.iter().find(|f| f.key == key.as_str()) else {
                continue;
            };
            match field.kind {
                FilterKind::Token(check) => {
                    check(value).map_err(CoreError::from)?;
                    let bind = vec![BindValue::Text(value.to_string())];
                    self.push(&format!("{} = $?", field.column), bind);
                }
                FilterKind::Text => {
                    let bind = vec![BindValue::Text(value.to_string())];
                    self.push(&format!("{} = $?", field.column), bind);
                }
                FilterKind::Substring(columns) => {
                    let pattern = format!("%{}%", escape_like(value));
                    let idx = self.next_param();
                    let ors: Vec<String> =
                        columns.iter().map(|c| format!("{c} ILIKE ${idx}")).collect();
                    self.conditions.push(format!("({})", ors.join(" OR ")));
                    self.binds.push(BindValue::Text(pattern));
                }
                FilterKind::Bool => {
                    let flag = parse_bool(key, value)?;
                    self.push(&format!("{} = $?", field.column), vec![BindValue::Bool(flag)]);
                }
                FilterKind::Int => {
                    let number: i32 = value.parse().map_err(|_| {
                        CoreError::validation(format!("{key} must be an integer, got '{value}'"))
                    })?;
                    self.push(&format!("{} = $?", field.column), vec![BindValue::Int(number)]);
                }
            }
        }
        Ok(())
    }

    /// Filter for a dashboard scope: its categorical filters plus its range.
    pub fn for_scope(spec: &FilterSpec, scope: &DashboardScope) -> CoreResult<Self> {
        Self::for_scope_in(spec, scope, scope.range.as_ref())
    }

    /// Same predicates as [`for_scope`](Self::for_scope) over a different
    /// range, e.g. the previous year, or none at all for trend series.
    pub fn for_scope_in(
        spec: &FilterSpec,
        scope: &DashboardScope,
        range: Option<&DateRange>,
    ) -> CoreResult<Self> {
        let mut filter = Self::new();
        filter.apply(spec, &scope.filters)?;
        if let Some(range) = range {
            filter.date_range(spec.date_column, range);
        }
        Ok(filter)
    }
}

/// Escape `%`, `_` and `\` for a LIKE pattern with the default escape.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn parse_bool(key: &str, value: &str) -> CoreResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err(CoreError::validation(format!("{key} must be true or false, got '{value}'"))),
    }
}

/// `north,south,east,west` in decimal degrees.
pub fn parse_bounds(value: &str) -> CoreResult<Bounds> {
    let parts: Vec<f64> = value
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| {
            CoreError::validation(format!(
                "bounds must be north,south,east,west, got '{value}'"
            ))
        })?;
    let [north, south, east, west] = parts[..] else {
        return Err(CoreError::validation(format!(
            "bounds must have four coordinates, got {}",
            parts.len()
        )));
    };
    if !(-90.0..=90.0).contains(&north) || !(-90.0..=90.0).contains(&south) || south > north {
        return Err(CoreError::validation(format!("invalid latitude bounds in '{value}'")));
    }
    if !(-180.0..=180.0).contains(&east) || !(-180.0..=180.0).contains(&west) {
        return Err(CoreError::validation(format!("invalid longitude bounds in '{value}'")));
    }
    Ok(Bounds { north, south, east, west })
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    #[serde(default)]
    pub descending: bool,
}

/// Filters, window and optional explicit sort for `find_all`.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: BTreeMap<String, String>,
    pub page: PageRequest,
    pub sort: Option<Sort>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    pub fn page(mut self, limit: i64, offset: i64) -> Self {
        self.page = PageRequest::new(limit, offset);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.sort = Some(Sort {
            field: field.into(),
            descending,
        });
        self
    }
}

/// `ORDER BY` for a list: the explicit sort if given (checked against
/// `sortable`), the domain default otherwise. `id DESC` always ends it.
pub fn order_clause(sort: Option<&Sort>, sortable: &[&str], default: &str) -> CoreResult<String> {
    match sort {
        None => Ok(format!("ORDER BY {default}, id DESC")),
        Some(sort) => {
            let Some(column) = sortable.iter().find(|c| **c == sort.field) else {
                return Err(CoreError::validation(format!("cannot sort by '{}'", sort.field)));
            };
            let direction = if sort.descending { "DESC" } else { "ASC" };
            if *column == "id" {
                Ok(format!("ORDER BY id {direction}"))
            } else {
                Ok(format!("ORDER BY {column} {direction}, id DESC"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Binding
// ---------------------------------------------------------------------------

/// Bind a slice of [`BindValue`] onto any sqlx query type.
pub trait BindValues<'q>: Sized {
    fn bind_value(self, value: &'q BindValue) -> Self;

    fn bind_values(self, values: &'q [BindValue]) -> Self {
        values.iter().fold(self, |q, v| q.bind_value(v))
    }
}

impl<'q> BindValues<'q> for Query<'q, Postgres, PgArguments> {
    fn bind_value(self, value: &'q BindValue) -> Self {
        match value {
            BindValue::Text(v) => self.bind(v.as_str()),
            BindValue::Float(v) => self.bind(*v),
            BindValue::Int(v) => self.bind(*v),
            BindValue::BigInt(v) => self.bind(*v),
            BindValue::Bool(v) => self.bind(*v),
            BindValue::Date(v) => self.bind(*v),
            BindValue::Timestamp(v) => self.bind(*v),
            BindValue::IntArray(v) => self.bind(v.clone()),
        }
    }
}

impl<'q, O> BindValues<'q> for QueryAs<'q, Postgres, O, PgArguments> {
    fn bind_value(self, value: &'q BindValue) -> Self {
        match value {
            BindValue::Text(v) => self.bind(v.as_str()),
            BindValue::Float(v) => self.bind(*v),
            BindValue::Int(v) => self.bind(*v),
            BindValue::BigInt(v) => self.bind(*v),
            BindValue::Bool(v) => self.bind(*v),
            BindValue::Date(v) => self.bind(*v),
            BindValue::Timestamp(v) => self.bind(*v),
            BindValue::IntArray(v) => self.bind(v.clone()),
        }
    }
}

impl<'q, O> BindValues<'q> for QueryScalar<'q, Postgres, O, PgArguments> {
    fn bind_value(self, value: &'q BindValue) -> Self {
        match value {
            BindValue::Text(v) => self.bind(v.as_str()),
            BindValue::Float(v) => self.bind(*v),
            BindValue::Int(v) => self.bind(*v),
            BindValue::BigInt(v) => self.bind(*v),
            BindValue::Bool(v) => self.bind(*v),
            BindValue::Date(v) => self.bind(*v),
            BindValue::Timestamp(v) => self.bind(*v),
            BindValue::IntArray(v) => self.bind(v.clone()),
        }
    }
}
