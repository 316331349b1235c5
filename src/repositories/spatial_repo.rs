//! Spatial-planning violation persistence

use std::sync::Arc;

use chrono::Utc;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info, instrument};

use crate::analytics::percentage;
use crate::context::RequestContext;
use crate::domain::common::{Lifecycle, NewPhoto, ReportPhoto};
use crate::domain::dashboard::{
    Bounds, DashboardScope, GroupCount, MapPoint, Metrics, SpatialMapPoint, YearValue,
};
use crate::domain::enums::{
    check_token, AreaCategory, EnvironmentalImpact, SpatialInstitution, UrgencyLevel,
    ViolationLevel, ViolationType,
};
use crate::domain::spatial::{estimate_violation, SpatialReport, SPATIAL_WORKFLOW};
use crate::domain::status::ReportStatus;
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;
use crate::pagination::{Page, PageRequest, Window};
use crate::priority::URGENCY_RANK;
use crate::repositories::common::{
    self, add_growth, attach_photos, bind_header, insert_sql, update_sql, PhotoOwner, REPORT_DATE,
    REPORT_YEAR,
};
use crate::repositories::filter::{
    order_clause, BindValues, FilterField, FilterSpec, ListQuery, SqlFilter,
};
use crate::repositories::groups::{self, resolve_dimension};
use crate::repositories::photos::PhotoTable;

const TABLE: &str = "spatial_reports";

const PHOTOS: PhotoTable = PhotoTable {
    table: "spatial_report_photos",
    parent: TABLE,
};

const COLUMNS: &str = "id, reporter_name, reporter_phone, latitude, longitude, address, village, \
     district, regency, created_by, created_at, updated_at, institution, area_category, \
     violation_type, violation_level, environmental_impact, urgency_level, location_description, \
     description, report_datetime, status, status_note";

const SORTABLE: &[&str] = &[
    "id",
    "created_at",
    "updated_at",
    "report_datetime",
    "district",
    "status",
    "urgency_level",
    "violation_level",
];

const DIMENSIONS: &[(&str, &str)] = &[
    ("status", "status"),
    ("institution", "institution"),
    ("area_category", "area_category"),
    ("violation_type", "violation_type"),
    ("violation_level", "violation_level"),
    ("environmental_impact", "environmental_impact"),
    ("urgency_level", "urgency_level"),
    ("district", "district"),
];

const MAP_PROJECTION: &str = "id, latitude, longitude, \
     COALESCE(NULLIF(location_description, ''), violation_type) AS title, \
     violation_type AS category, violation_level AS severity, status, \
     (report_datetime AT TIME ZONE 'UTC')::date AS reported_on";

pub static FILTERS: FilterSpec = FilterSpec {
    fields: &[
        FilterField::token("status", check_token::<ReportStatus>),
        FilterField::token("institution", check_token::<SpatialInstitution>),
        FilterField::token("area_category", check_token::<AreaCategory>),
        FilterField::token("violation_type", check_token::<ViolationType>),
        FilterField::token("violation_level", check_token::<ViolationLevel>),
        FilterField::token("environmental_impact", check_token::<EnvironmentalImpact>),
        FilterField::token("urgency_level", check_token::<UrgencyLevel>),
        FilterField::text("district"),
        FilterField::text("village"),
        FilterField::text("regency"),
        FilterField::text("created_by"),
        FilterField::substring("name", &["location_description", "reporter_name"]),
    ],
    date_column: REPORT_DATE,
    geo: true,
};

fn default_order() -> String {
    format!("{} ASC, created_at DESC", URGENCY_RANK.sql())
}

fn bind_spatial<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    r: &'q SpatialReport,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    bind_header(query, &r.header)
        .bind(r.institution)
        .bind(r.area_category)
        .bind(r.violation_type)
        .bind(r.violation_level)
        .bind(r.environmental_impact)
        .bind(r.urgency_level)
        .bind(&r.location_description)
        .bind(&r.description)
        .bind(r.report_datetime)
        .bind(r.status)
        .bind(&r.status_note)
}

impl PhotoOwner for SpatialReport {
    fn report_id(&self) -> &str {
        &self.header.id
    }

    fn set_photos(&mut self, photos: Vec<ReportPhoto>) {
        self.photos = photos;
    }
}

/// Attach the display estimate to a map point whose category and severity
/// carry the violation type and level.
fn with_estimate(point: MapPoint) -> CoreResult<SpatialMapPoint> {
    let violation_type: ViolationType = point.category.parse()?;
    let level: ViolationLevel = point
        .severity
        .as_deref()
        .ok_or_else(|| {
            CoreError::validation(format!("spatial report {} has no violation level", point.id))
        })?
        .parse()?;
    let estimate = estimate_violation(level, violation_type);
    Ok(SpatialMapPoint {
        point,
        estimated_length_m: estimate.length_m,
        estimated_area_m2: estimate.area_m2,
    })
}

#[derive(FromRow)]
struct KpiRow {
    total: i64,
    pending: i64,
    reviewing: i64,
    processing: i64,
    resolved: i64,
    rejected: i64,
    heavy: i64,
    high_impact: i64,
    emergency: i64,
}

impl KpiRow {
    fn into_metrics(self) -> Metrics {
        let mut m = Metrics::new();
        m.insert("total_reports".into(), self.total as f64);
        m.insert("pending_reports".into(), self.pending as f64);
        m.insert("reviewing_reports".into(), self.reviewing as f64);
        m.insert("processing_reports".into(), self.processing as f64);
        m.insert("resolved_reports".into(), self.resolved as f64);
        m.insert("rejected_reports".into(), self.rejected as f64);
        m.insert("heavy_violations".into(), self.heavy as f64);
        m.insert("high_impact_reports".into(), self.high_impact as f64);
        m.insert("emergency_reports".into(), self.emergency as f64);
        m.insert("resolution_rate".into(), percentage(self.resolved, self.total));
        m
    }
}

const GROWTH_KEYS: &[&str] = &["total_reports", "resolved_reports"];

#[derive(Clone)]
pub struct SpatialRepository {
    pool: PgPool,
    ids: Arc<IdGenerator>,
}

impl SpatialRepository {
    pub fn new(pool: PgPool, ids: Arc<IdGenerator>) -> Self {
        Self { pool, ids }
    }

    #[instrument(skip(self, ctx, report, photos))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        mut report: SpatialReport,
        photos: &[NewPhoto],
    ) -> CoreResult<SpatialReport> {
        report.before_create(&self.ids, Utc::now())?;
        report.validate()?;
        ctx.run(async {
            let mut tx = self.pool.begin().await?;
            let sql = insert_sql(TABLE, COLUMNS);
            let mut stored = bind_spatial(sqlx::query_as::<Postgres, SpatialReport>(&sql), &report)
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
            info!(id = %stored.header.id, "Spatial report created");
            Ok(stored)
        })
        .await
    }

    #[instrument(skip(self, ctx, report))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut report: SpatialReport,
    ) -> CoreResult<SpatialReport> {
        ctx.run(async {
            let previous = self.fetch_row(id).await?;
            report.before_update(&previous, Utc::now());
            report.validate()?;
            let sql = update_sql(TABLE, COLUMNS);
            let row = bind_spatial(sqlx::query_as::<Postgres, SpatialReport>(&sql), &report)
                .fetch_optional(&self.pool)
                .await?;
            let Some(mut stored) = row else {
                return Err(common::edit_miss(&self.pool, TABLE, id).await);
            };
            stored.photos = PHOTOS.load(&self.pool, id).await?;
            info!("Spatial report updated");
            Ok(stored)
        })
        .await
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()> {
        ctx.run(common::delete_by_id(&self.pool, TABLE, id)).await
    }

    pub async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> CoreResult<SpatialReport> {
        ctx.run(async {
            let mut report = self.fetch_row(id).await?;
            report.photos = PHOTOS.load(&self.pool, id).await?;
            Ok(report)
        })
        .await
    }

    async fn fetch_row(&self, id: &str) -> CoreResult<SpatialReport> {
        let sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = $1");
        sqlx::query_as::<Postgres, SpatialReport>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("spatial report {id}")))
    }

    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<SpatialReport>> {
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
    ) -> CoreResult<Page<SpatialReport>> {
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
    ) -> CoreResult<Page<SpatialReport>> {
        let (rows, total) = common::fetch_page::<SpatialReport>(
            &self.pool, COLUMNS, TABLE, &filter, &order, window,
        )
        .await?;
        let rows = attach_photos(&self.pool, PHOTOS, rows).await?;
        Ok(Page::new(rows, window, total))
    }

    #[instrument(skip(self, ctx, note))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: ReportStatus,
        note: Option<&str>,
    ) -> CoreResult<SpatialReport> {
        ctx.run(async {
            common::update_status(
                &self.pool,
                TABLE,
                SPATIAL_WORKFLOW,
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

    /// Located reports with their display estimate.
    pub async fn map_points(
        &self,
        ctx: &RequestContext,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<SpatialMapPoint>> {
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        let points = ctx
            .run(common::map_points(
                &self.pool,
                TABLE,
                MAP_PROJECTION,
                "report_datetime DESC",
                &filter,
            ))
            .await?;
        points.into_iter().map(with_estimate).collect()
    }

    pub async fn points_in_bounds(
        &self,
        ctx: &RequestContext,
        bounds: &Bounds,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<SpatialMapPoint>> {
        let mut filter = SqlFilter::for_scope(&FILTERS, scope)?;
        filter.bounds(bounds);
        let points = ctx
            .run(common::map_points(
                &self.pool,
                TABLE,
                MAP_PROJECTION,
                "report_datetime DESC",
                &filter,
            ))
            .await?;
        points.into_iter().map(with_estimate).collect()
    }

    /// Status and severity counts. The violation estimates stay on map points.
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
        let where_clause = filter.where_clause();
        let sql = format!(
            r#"
            SELECT COUNT(*)::BIGINT AS total,
                   COUNT(*) FILTER (WHERE status = 'PENDING')::BIGINT AS pending,
                   COUNT(*) FILTER (WHERE status = 'REVIEWING')::BIGINT AS reviewing,
                   COUNT(*) FILTER (WHERE status = 'PROCESSING')::BIGINT AS processing,
                   COUNT(*) FILTER (WHERE status = 'RESOLVED')::BIGINT AS resolved,
                   COUNT(*) FILTER (WHERE status = 'REJECTED')::BIGINT AS rejected,
                   COUNT(*) FILTER (WHERE violation_level = 'HEAVY')::BIGINT AS heavy,
                   COUNT(*) FILTER (WHERE environmental_impact = 'HIGH')::BIGINT AS high_impact,
                   COUNT(*) FILTER (WHERE urgency_level = 'EMERGENCY')::BIGINT AS emergency
            FROM {TABLE}
            {where_clause}
            "#
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

    /// Reports per year; `value` counts the resolved ones.
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
            "CASE WHEN t.status = 'RESOLVED' THEN 1 ELSE 0 END",
            &filter,
            years,
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn point(category: &str, severity: Option<&str>) -> MapPoint {
        MapPoint {
            id: "01J0000000000000000000000A".into(),
            latitude: -7.5,
            longitude: 110.8,
            title: "Bantaran".into(),
            category: category.into(),
            severity: severity.map(str::to_string),
            status: Some("PENDING".into()),
            reported_on: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        }
    }

    #[test]
    fn map_points_carry_the_estimate() {
        let p = with_estimate(point("LAND_USE_CHANGE", Some("HEAVY"))).unwrap();
        assert_eq!(p.estimated_length_m, 400.0);
        assert_eq!(p.estimated_area_m2, 15_000.0);
        assert!(with_estimate(point("LAND_USE_CHANGE", None)).is_err());
    }

    #[test]
    fn kpis_leave_estimates_to_map_points() {
        let row = KpiRow {
            total: 4,
            pending: 1,
            reviewing: 0,
            processing: 1,
            resolved: 2,
            rejected: 0,
            heavy: 1,
            high_impact: 0,
            emergency: 0,
        };
        let metrics = row.into_metrics();
        assert_eq!(metrics["resolution_rate"], 50.0);
        assert!(metrics.keys().all(|k| !k.starts_with("estimated_")));
    }

    #[test]
    fn column_list_matches_binder() {
        assert_eq!(COLUMNS.split(',').count(), 23);
    }
}
