//! Irrigation damage report persistence

use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info, instrument};

use crate::analytics::{percentage, round2};
use crate::context::RequestContext;
use crate::domain::common::{Lifecycle, NewPhoto, ReportPhoto};
use crate::domain::dashboard::{
    Bounds, DashboardScope, GroupBreakdown, GroupCount, MapPoint, Metrics, Scored, YearValue,
};
use crate::domain::enums::{
    check_token, DamageLevel, InstitutionUnit, IrrigationType, UrgencyCategory, WaterDamageType,
};
use crate::domain::status::ReportStatus;
use crate::domain::water::{WaterReport, WATER_WORKFLOW};
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;
use crate::pagination::{Page, PageRequest, Window};
use crate::priority::{DAMAGE_LEVEL_RANK, URGENCY_CATEGORY_RANK, WATER_PRIORITY};
use crate::repositories::common::{
    self, add_growth, attach_photos, bind_header, insert_sql, open_status_condition, update_sql,
    PhotoOwner, REPORT_DATE, REPORT_YEAR,
};
use crate::repositories::filter::{
    order_clause, BindValues, FilterField, FilterSpec, ListQuery, SqlFilter,
};
use crate::repositories::groups::{self, resolve_dimension};
use crate::repositories::photos::PhotoTable;

const TABLE: &str = "water_reports";

const PHOTOS: PhotoTable = PhotoTable {
    table: "water_report_photos",
    parent: TABLE,
};

const COLUMNS: &str = "id, reporter_name, reporter_phone, latitude, longitude, address, village, \
     district, regency, created_by, created_at, updated_at, irrigation_area, institution_unit, \
     irrigation_type, damage_type, damage_level, urgency_category, estimated_length, \
     estimated_width, damage_area, estimated_volume, affected_rice_field_area_ha, \
     affected_farmers_count, estimated_budget, description, report_datetime, status, status_note";

const SORTABLE: &[&str] = &[
    "id",
    "created_at",
    "updated_at",
    "report_datetime",
    "irrigation_area",
    "district",
    "status",
    "urgency_category",
    "damage_level",
    "affected_rice_field_area_ha",
    "affected_farmers_count",
    "estimated_budget",
];

const DIMENSIONS: &[(&str, &str)] = &[
    ("status", "status"),
    ("urgency_category", "urgency_category"),
    ("damage_level", "damage_level"),
    ("damage_type", "damage_type"),
    ("irrigation_type", "irrigation_type"),
    ("institution_unit", "institution_unit"),
    ("district", "district"),
    ("regency", "regency"),
];

const MAP_PROJECTION: &str = "id, latitude, longitude, irrigation_area AS title, \
     irrigation_type AS category, damage_level AS severity, status, \
     (report_datetime AT TIME ZONE 'UTC')::date AS reported_on";

pub static FILTERS: FilterSpec = FilterSpec {
    fields: &[
        FilterField::token("status", check_token::<ReportStatus>),
        FilterField::token("urgency_category", check_token::<UrgencyCategory>),
        FilterField::token("damage_level", check_token::<DamageLevel>),
        FilterField::token("damage_type", check_token::<WaterDamageType>),
        FilterField::token("irrigation_type", check_token::<IrrigationType>),
        FilterField::token("institution_unit", check_token::<InstitutionUnit>),
        FilterField::text("district"),
        FilterField::text("village"),
        FilterField::text("regency"),
        FilterField::text("created_by"),
        FilterField::substring("irrigation_area", &["irrigation_area"]),
        FilterField::substring("name", &["irrigation_area"]),
    ],
    date_column: REPORT_DATE,
    geo: true,
};

fn default_order() -> String {
    format!(
        "{} ASC, {} ASC, created_at DESC",
        URGENCY_CATEGORY_RANK.sql(),
        DAMAGE_LEVEL_RANK.sql()
    )
}

fn bind_water<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    r: &'q WaterReport,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    bind_header(query, &r.header)
        .bind(&r.irrigation_area)
        .bind(r.institution_unit)
        .bind(r.irrigation_type)
        .bind(r.damage_type)
        .bind(r.damage_level)
        .bind(r.urgency_category)
        .bind(r.estimated_length)
        .bind(r.estimated_width)
        .bind(r.damage_area)
        .bind(r.estimated_volume)
        .bind(r.affected_rice_field_area_ha)
        .bind(r.affected_farmers_count)
        .bind(r.estimated_budget)
        .bind(&r.description)
        .bind(r.report_datetime)
        .bind(r.status)
        .bind(&r.status_note)
}

impl PhotoOwner for WaterReport {
    fn report_id(&self) -> &str {
        &self.header.id
    }

    fn set_photos(&mut self, photos: Vec<ReportPhoto>) {
        self.photos = photos;
    }
}

#[derive(FromRow)]
struct ScoredRow {
    #[sqlx(flatten)]
    report: WaterReport,
    priority_score: i32,
}

#[derive(FromRow)]
struct KpiRow {
    total: i64,
    pending: i64,
    verified: i64,
    in_progress: i64,
    completed: i64,
    rejected: i64,
    urgent: i64,
    severe: i64,
    rice_field_area: f64,
    farmers: i64,
    damage_area: f64,
    budget: f64,
}

impl KpiRow {
    fn into_metrics(self) -> Metrics {
        let mut m = Metrics::new();
        m.insert("total_reports".into(), self.total as f64);
        m.insert("pending_reports".into(), self.pending as f64);
        m.insert("verified_reports".into(), self.verified as f64);
        m.insert("in_progress_reports".into(), self.in_progress as f64);
        m.insert("completed_reports".into(), self.completed as f64);
        m.insert("rejected_reports".into(), self.rejected as f64);
        m.insert("urgent_reports".into(), self.urgent as f64);
        m.insert("severe_reports".into(), self.severe as f64);
        m.insert("affected_rice_field_area_ha".into(), round2(self.rice_field_area));
        m.insert("affected_farmers".into(), self.farmers as f64);
        m.insert("total_damage_area".into(), round2(self.damage_area));
        m.insert("total_estimated_budget".into(), round2(self.budget));
        m.insert("completion_rate".into(), percentage(self.completed, self.total));
        m
    }
}

const GROWTH_KEYS: &[&str] = &[
    "total_reports",
    "affected_rice_field_area_ha",
    "affected_farmers",
    "total_estimated_budget",
];

#[derive(Clone)]
pub struct WaterRepository {
    pool: PgPool,
    ids: Arc<IdGenerator>,
}

impl WaterRepository {
    pub fn new(pool: PgPool, ids: Arc<IdGenerator>) -> Self {
        Self { pool, ids }
    }

    #[instrument(skip(self, ctx, report, photos), fields(area = %report.irrigation_area))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        mut report: WaterReport,
        photos: &[NewPhoto],
    ) -> CoreResult<WaterReport> {
        report.before_create(&self.ids, Utc::now())?;
        report.validate()?;
        ctx.run(async {
            let mut tx = self.pool.begin().await?;
            let sql = insert_sql(TABLE, COLUMNS);
            let mut stored = bind_water(sqlx::query_as::<Postgres, WaterReport>(&sql), &report)
                .fetch_one(&mut *tx)
                .await?;
            stored.photos = PHOTOS
                .insert_all(
                    &mut *tx,
                    &self.ids,
                    &stored.header.id,
                    photos,
                    stored.header.created_at,
                )
                .await?;
            tx.commit().await?;
            info!(id = %stored.header.id, "Water report created");
            Ok(stored)
        })
        .await
    }

    #[instrument(skip(self, ctx, report))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut report: WaterReport,
    ) -> CoreResult<WaterReport> {
        ctx.run(async {
            let previous = self.fetch_row(id).await?;
            report.before_update(&previous, Utc::now());
            report.validate()?;
            let sql = update_sql(TABLE, COLUMNS);
            let row = bind_water(sqlx::query_as::<Postgres, WaterReport>(&sql), &report)
                .fetch_optional(&self.pool)
                .await?;
            let Some(mut stored) = row else {
                return Err(common::edit_miss(&self.pool, TABLE, id).await);
            };
            stored.photos = PHOTOS.load(&self.pool, id).await?;
            info!("Water report updated");
            Ok(stored)
        })
        .await
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()> {
        ctx.run(common::delete_by_id(&self.pool, TABLE, id)).await
    }

    pub async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> CoreResult<WaterReport> {
        ctx.run(async {
            let mut report = self.fetch_row(id).await?;
            report.photos = PHOTOS.load(&self.pool, id).await?;
            Ok(report)
        })
        .await
    }

    async fn fetch_row(&self, id: &str) -> CoreResult<WaterReport> {
        let sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = $1");
        sqlx::query_as::<Postgres, WaterReport>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("water report {id}")))
    }

    /// Filtered page; ordered by urgency category, damage level, then newest.
    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<WaterReport>> {
        let window = query.page.window(default_limit, max_limit)?;
        let mut filter = SqlFilter::new();
        filter.apply(&FILTERS, &query.filters)?;
        let order = order_clause(query.sort.as_ref(), SORTABLE, &default_order())?;
        ctx.run(self.page(filter, order, window)).await
    }

    pub async fn find_by_owner(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        page: PageRequest,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<WaterReport>> {
        let query = ListQuery {
            page,
            ..ListQuery::new().filter("created_by", user_id)
        };
        self.find_all(ctx, &query, default_limit, max_limit).await
    }

    async fn page(
        &self,
        filter: SqlFilter,
        order: String,
        window: Window,
    ) -> CoreResult<Page<WaterReport>> {
        let (rows, total) = common::fetch_page::<WaterReport>(
            &self.pool, COLUMNS, TABLE, &filter, &order, window,
        )
        .await?;
        let rows = attach_photos(&self.pool, PHOTOS, rows).await?;
        Ok(Page::new(rows, window, total))
    }

    #[instrument(skip(self, ctx, scope))]
    pub async fn find_by_priority(
        &self,
        ctx: &RequestContext,
        limit: i64,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<Scored<WaterReport>>> {
        if limit < 0 {
            return Err(CoreError::validation(format!("limit must be >= 0, got {limit}")));
        }
        let mut filter = SqlFilter::for_scope(&FILTERS, scope)?;
        filter.push_raw(open_status_condition());
        let sql = format!(
            r#"
            SELECT {COLUMNS}, {score} AS priority_score
            FROM {TABLE} w
            {where_clause}
            ORDER BY priority_score DESC, created_at DESC, id DESC
            LIMIT ${limit_idx}
            "#,
            score = WATER_PRIORITY.sql_expr("w"),
            where_clause = filter.where_clause(),
            limit_idx = filter.next_param(),
        );
        ctx.run(async {
            let rows = sqlx::query_as::<Postgres, ScoredRow>(&sql)
                .bind_values(filter.binds())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows
                .into_iter()
                .map(|row| Scored {
                    record: row.report,
                    priority_score: row.priority_score,
                })
                .collect())
        })
        .await
    }

    #[instrument(skip(self, ctx, note))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: ReportStatus,
        note: Option<&str>,
    ) -> CoreResult<WaterReport> {
        ctx.run(async {
            common::update_status(
                &self.pool,
                TABLE,
                WATER_WORKFLOW,
                id,
                status,
                note,
                Utc::now(),
            )
            .await?;
            let mut report = self.fetch_row(id).await?;
            report.photos = PHOTOS.load(&self.pool, id).await?;
            Ok(report)
        })
        .await
    }

    pub async fn add_photo(
        &self,
        ctx: &RequestContext,
        id: &str,
        photo: &NewPhoto,
    ) -> CoreResult<ReportPhoto> {
        ctx.run(PHOTOS.add(&self.pool, &self.ids, id, photo)).await
    }

    pub async fn delete_photo(
        &self,
        ctx: &RequestContext,
        id: &str,
        photo_id: &str,
    ) -> CoreResult<()> {
        ctx.run(PHOTOS.delete(&self.pool, id, photo_id)).await
    }

    // -- dashboard ----------------------------------------------------------

    pub async fn map_points(
        &self,
        ctx: &RequestContext,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<MapPoint>> {
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        ctx.run(common::map_points(
            &self.pool,
            TABLE,
            MAP_PROJECTION,
            "report_datetime DESC",
            &filter,
        ))
        .await
    }

    pub async fn points_in_bounds(
        &self,
        ctx: &RequestContext,
        bounds: &Bounds,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<MapPoint>> {
        let mut filter = SqlFilter::for_scope(&FILTERS, scope)?;
        filter.bounds(bounds);
        ctx.run(common::map_points(
            &self.pool,
            TABLE,
            MAP_PROJECTION,
            "report_datetime DESC",
            &filter,
        ))
        .await
    }

    #[instrument(skip(self, ctx, scope))]
    pub async fn kpis(&self, ctx: &RequestContext, scope: &DashboardScope) -> CoreResult<Metrics> {
        let current = SqlFilter::for_scope(&FILTERS, scope)?;
        let previous = match &scope.range {
            Some(range) => Some(SqlFilter::for_scope_in(
                &FILTERS,
                scope,
                Some(&range.previous_year()),
            )?),
            None => None,
        };
        ctx.run(async {
            let mut metrics = self.kpi_metrics(&current).await?;
            if let Some(previous) = previous {
                let before = self.kpi_metrics(&previous).await?;
                add_growth(&mut metrics, &before, GROWTH_KEYS);
            }
            Ok(metrics)
        })
        .await
    }

    async fn kpi_metrics(&self, filter: &SqlFilter) -> CoreResult<Metrics> {
        let sql = format!(
            r#"
            SELECT COUNT(*)::BIGINT AS total,
                   COUNT(*) FILTER (WHERE status = 'PENDING')::BIGINT AS pending,
                   COUNT(*) FILTER (WHERE status = 'VERIFIED')::BIGINT AS verified,
                   COUNT(*) FILTER (WHERE status = 'IN_PROGRESS')::BIGINT AS in_progress,
                   COUNT(*) FILTER (WHERE status = 'COMPLETED')::BIGINT AS completed,
                   COUNT(*) FILTER (WHERE status = 'REJECTED')::BIGINT AS rejected,
                   COUNT(*) FILTER (WHERE urgency_category = 'URGENT')::BIGINT AS urgent,
                   COUNT(*) FILTER (WHERE damage_level = 'SEVERE')::BIGINT AS severe,
                   COALESCE(SUM(affected_rice_field_area_ha), 0)::FLOAT8 AS rice_field_area,
                   COALESCE(SUM(affected_farmers_count), 0)::BIGINT AS farmers,
                   COALESCE(SUM(damage_area), 0)::FLOAT8 AS damage_area,
                   COALESCE(SUM(estimated_budget), 0)::FLOAT8 AS budget
            FROM {TABLE}
            {where_clause}
            "#,
            where_clause = filter.where_clause(),
        );
        let row = sqlx::query_as::<Postgres, KpiRow>(&sql)
            .bind_values(filter.binds())
            .fetch_one(&self.pool)
            .await?;
        Ok(row.into_metrics())
    }

    pub async fn group_counts(
        &self,
        ctx: &RequestContext,
        dimension: &str,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<GroupCount>> {
        let column = resolve_dimension(DIMENSIONS, dimension)?;
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        ctx.run(groups::group_counts(&self.pool, TABLE, column, &filter)).await
    }

    /// Reports and affected rice field hectares per year.
    pub async fn yearly_trend(
        &self,
        ctx: &RequestContext,
        years: &[i32],
        scope: &DashboardScope,
    ) -> CoreResult<Vec<YearValue>> {
        let filter = SqlFilter::for_scope_in(&FILTERS, scope, None)?;
        ctx.run(common::yearly_trend(
            &self.pool,
            TABLE,
            REPORT_YEAR,
            "t.affected_rice_field_area_ha",
            &filter,
            years,
        ))
        .await
    }

    pub async fn district_breakdown(
        &self,
        ctx: &RequestContext,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<GroupBreakdown>> {
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        ctx.run(groups::group_breakdown(&self.pool, TABLE, "district", "damage_level", &filter))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_order_ranks_urgency_category_then_damage() {
        let order = default_order();
        assert!(order.starts_with("(CASE urgency_category WHEN 'URGENT' THEN 0"));
        assert!(order.contains("(CASE damage_level WHEN 'SEVERE' THEN 0"));
    }

    #[test]
    fn column_list_matches_binder() {
        assert_eq!(COLUMNS.split(',').count(), 29);
    }

    #[test]
    fn irrigation_area_is_substring_matched() {
        let mut filter = SqlFilter::new();
        filter
            .apply(&FILTERS, &ListQuery::new().filter("name", "colo").filters)
            .unwrap();
        assert_eq!(filter.where_clause(), "WHERE (irrigation_area ILIKE $1)");
    }
}
