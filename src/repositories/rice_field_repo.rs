//! Rice-field inventory snapshots.
//!
//! Several snapshots may exist per district and year; summaries always use
//! the latest one (by `date`, then `created_at`).

use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{PgPool, Postgres};
use tracing::{info, instrument};

use crate::analytics::round2;
use crate::context::RequestContext;
use crate::domain::common::Lifecycle;
use crate::domain::dashboard::{Metrics, RiceFieldTrendPoint};
use crate::domain::rice_field::RiceField;
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;
use crate::pagination::{Page, PageRequest};
use crate::repositories::common::{self, add_growth, insert_sql, update_sql};
use crate::repositories::filter::{
    order_clause, BindValue, BindValues, FilterField, FilterSpec, ListQuery, SqlFilter,
};

const TABLE: &str = "rice_fields";

const COLUMNS: &str = "id, district, date, year, irrigated, rainfed, dryfield, shifting, unused, \
     total_rice_field, total_dry_land, grand_total, created_by, created_at, updated_at";

const SORTABLE: &[&str] = &["id", "date", "year", "district", "grand_total", "created_at"];

pub static FILTERS: FilterSpec = FilterSpec {
    fields: &[
        FilterField::text("district"),
        FilterField::int("year"),
        FilterField::text("created_by"),
    ],
    date_column: "date",
    geo: false,
};

const DEFAULT_ORDER: &str = "date DESC, district ASC";

/// Latest snapshot per district, restricted by the `WHERE` in `conditions`.
fn latest_per_district(conditions: &str) -> String {
    format!(
        "SELECT DISTINCT ON (district) {COLUMNS} FROM {TABLE} {conditions} \
         ORDER BY district ASC, date DESC, created_at DESC, id DESC"
    )
}

fn bind_field<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    f: &'q RiceField,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    query
        .bind(&f.id)
        .bind(&f.district)
        .bind(f.date)
        .bind(f.year)
        .bind(f.irrigated)
        .bind(f.rainfed)
        .bind(f.dryfield)
        .bind(f.shifting)
        .bind(f.unused)
        .bind(f.total_rice_field)
        .bind(f.total_dry_land)
        .bind(f.grand_total)
        .bind(&f.created_by)
        .bind(f.created_at)
        .bind(f.updated_at)
}

/// Totals over one year's district snapshots.
fn summarize(fields: &[RiceField]) -> Metrics {
    let sum = |pick: fn(&RiceField) -> f64| round2(fields.iter().map(pick).sum());
    let mut m = Metrics::new();
    m.insert("districts".into(), fields.len() as f64);
    m.insert("irrigated".into(), sum(|f| f.irrigated));
    m.insert("rainfed".into(), sum(|f| f.rainfed));
    m.insert("total_rice_field".into(), sum(|f| f.total_rice_field));
    m.insert("total_dry_land".into(), sum(|f| f.total_dry_land));
    m.insert("grand_total".into(), sum(|f| f.grand_total));
    m
}

const GROWTH_KEYS: &[&str] = &["total_rice_field", "total_dry_land", "grand_total"];

#[derive(Clone)]
pub struct RiceFieldRepository {
    pool: PgPool,
    ids: Arc<IdGenerator>,
}

impl RiceFieldRepository {
    pub fn new(pool: PgPool, ids: Arc<IdGenerator>) -> Self {
        Self { pool, ids }
    }

    #[instrument(skip(self, ctx, field), fields(district = %field.district))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        mut field: RiceField,
    ) -> CoreResult<RiceField> {
        field.before_create(&self.ids, Utc::now())?;
        field.validate()?;
        let sql = insert_sql(TABLE, COLUMNS);
        ctx.run(async {
            let stored = bind_field(sqlx::query_as::<Postgres, RiceField>(&sql), &field)
                .fetch_one(&self.pool)
                .await?;
            info!(id = %stored.id, year = stored.year, "Rice field snapshot recorded");
            Ok(stored)
        })
        .await
    }

    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut field: RiceField,
    ) -> CoreResult<RiceField> {
        let sql = update_sql(TABLE, COLUMNS);
        ctx.run(async {
            let previous = self.fetch_row(id).await?;
            field.before_update(&previous, Utc::now());
            field.validate()?;
            let stored = bind_field(sqlx::query_as::<Postgres, RiceField>(&sql), &field)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("rice field {id}")))?;
            info!(id = %stored.id, "Rice field snapshot updated");
            Ok(stored)
        })
        .await
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()> {
        ctx.run(common::delete_by_id(&self.pool, TABLE, id)).await
    }

    pub async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> CoreResult<RiceField> {
        ctx.run(self.fetch_row(id)).await
    }

    async fn fetch_row(&self, id: &str) -> CoreResult<RiceField> {
        let sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = $1");
        sqlx::query_as::<Postgres, RiceField>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("rice field {id}")))
    }

    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<RiceField>> {
        let window = query.page.window(default_limit, max_limit)?;
        let mut filter = SqlFilter::new();
        filter.apply(&FILTERS, &query.filters)?;
        let order = order_clause(query.sort.as_ref(), SORTABLE, DEFAULT_ORDER)?;
        ctx.run(async {
            let (rows, total) = common::fetch_page::<RiceField>(
                &self.pool, COLUMNS, TABLE, &filter, &order, window,
            )
            .await?;
            Ok(Page::new(rows, window, total))
        })
        .await
    }

    pub async fn find_by_owner(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        page: PageRequest,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<RiceField>> {
        let query = ListQuery {
            page,
            ..ListQuery::new().filter("created_by", user_id)
        };
        self.find_all(ctx, &query, default_limit, max_limit).await
    }

    /// Latest snapshot of each district for `year`, by district name.
    pub async fn district_summary(
        &self,
        ctx: &RequestContext,
        year: i32,
    ) -> CoreResult<Vec<RiceField>> {
        ctx.run(self.latest_for_year(year)).await
    }

    async fn latest_for_year(&self, year: i32) -> CoreResult<Vec<RiceField>> {
        let sql = latest_per_district("WHERE year = $1");
        Ok(sqlx::query_as::<Postgres, RiceField>(&sql)
            .bind(year)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Per-year totals over the latest district snapshots, zero-filled.
    pub async fn yearly_trend(
        &self,
        ctx: &RequestContext,
        years: &[i32],
    ) -> CoreResult<Vec<RiceFieldTrendPoint>> {
        let sql = r#"
            WITH latest AS (
                SELECT DISTINCT ON (r.year, r.district)
                       r.year AS snapshot_year, r.total_rice_field, r.total_dry_land, r.grand_total
                FROM rice_fields r
                WHERE r.year = ANY($1)
                ORDER BY r.year, r.district, r.date DESC, r.created_at DESC, r.id DESC
            )
            SELECT y.year::INT AS year,
                   COALESCE(SUM(l.total_rice_field), 0)::FLOAT8 AS total_rice_field,
                   COALESCE(SUM(l.total_dry_land), 0)::FLOAT8 AS total_dry_land,
                   COALESCE(SUM(l.grand_total), 0)::FLOAT8 AS grand_total
            FROM unnest($1::INT[]) AS y(year)
            LEFT JOIN latest l ON l.snapshot_year = y.year
            GROUP BY y.year
            ORDER BY y.year
        "#;
        let years = BindValue::IntArray(years.to_vec());
        ctx.run(async {
            Ok(sqlx::query_as::<Postgres, RiceFieldTrendPoint>(sql)
                .bind_value(&years)
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    /// Totals for `year` with growth against `year - 1`.
    #[instrument(skip(self, ctx))]
    pub async fn kpis(&self, ctx: &RequestContext, year: i32) -> CoreResult<Metrics> {
        ctx.run(async {
            let current = self.latest_for_year(year).await?;
            let previous = self.latest_for_year(year - 1).await?;
            let mut metrics = summarize(&current);
            add_growth(&mut metrics, &summarize(&previous), GROWTH_KEYS);
            Ok(metrics)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn field(district: &str, irrigated: f64, dryfield: f64) -> RiceField {
        let mut f = RiceField::new(district, NaiveDate::from_ymd_opt(2024, 6, 30).unwrap());
        f.irrigated = irrigated;
        f.dryfield = dryfield;
        f.apply_derivations();
        f
    }

    #[test]
    fn summary_adds_district_totals() {
        let m = summarize(&[field("Sragen", 100.0, 20.0), field("Klaten", 50.5, 0.0)]);
        assert_eq!(m["districts"], 2.0);
        assert_eq!(m["total_rice_field"], 150.5);
        assert_eq!(m["total_dry_land"], 20.0);
        assert_eq!(m["grand_total"], 170.5);
    }

    #[test]
    fn empty_year_summarizes_to_zero() {
        let m = summarize(&[]);
        assert_eq!(m["grand_total"], 0.0);
        assert_eq!(m["districts"], 0.0);
    }

    #[test]
    fn latest_snapshot_query_orders_by_date() {
        let sql = latest_per_district("WHERE year = $1");
        assert!(sql.starts_with("SELECT DISTINCT ON (district)"));
        assert!(sql.contains("ORDER BY district ASC, date DESC"));
    }
}
