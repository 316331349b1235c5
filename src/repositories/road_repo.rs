//! Road and bridge report persistence
//!
//! CRUD, listing, status workflow and the dashboard aggregations for
//! `road_reports`.

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
    check_token, DamageLevel, PavementType, RoadDamageType, RoadType, TrafficCondition,
    TrafficImpact, UrgencyLevel,
};
use crate::domain::road::{RoadReport, ROAD_WORKFLOW};
use crate::domain::status::ReportStatus;
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;
use crate::pagination::{Page, PageRequest, Window};
use crate::priority::{ROAD_PRIORITY, TRAFFIC_IMPACT_RANK, URGENCY_RANK};
use crate::repositories::common::{
    self, add_growth, attach_photos, bind_header, insert_sql, open_status_condition, update_sql,
    PhotoOwner, REPORT_DATE, REPORT_YEAR,
};
use crate::repositories::filter::{
    order_clause, BindValues, FilterField, FilterSpec, ListQuery, SqlFilter,
};
use crate::repositories::groups::{self, resolve_dimension};
use crate::repositories::photos::PhotoTable;

const TABLE: &str = "road_reports";

const PHOTOS: PhotoTable = PhotoTable {
    table: "road_report_photos",
    parent: TABLE,
};

const COLUMNS: &str = "id, reporter_name, reporter_phone, latitude, longitude, address, village, \
     district, regency, created_by, created_at, updated_at, road_name, road_type, pavement_type, \
     segment_length, damage_type, damage_level, damaged_length, damaged_width, damaged_area, \
     total_damaged_area, bridge_name, bridge_type, bridge_damage_level, traffic_condition, \
     traffic_impact, daily_traffic_volume, urgency_level, estimated_budget, \
     estimated_repair_time_days, description, report_datetime, status, status_note";

const SORTABLE: &[&str] = &[
    "id",
    "created_at",
    "updated_at",
    "report_datetime",
    "road_name",
    "district",
    "status",
    "urgency_level",
    "damage_level",
    "total_damaged_area",
    "estimated_budget",
];

const DIMENSIONS: &[(&str, &str)] = &[
    ("status", "status"),
    ("urgency_level", "urgency_level"),
    ("damage_level", "damage_level"),
    ("damage_type", "damage_type"),
    ("road_type", "road_type"),
    ("pavement_type", "pavement_type"),
    ("traffic_condition", "traffic_condition"),
    ("traffic_impact", "traffic_impact"),
    ("bridge_type", "bridge_type"),
    ("district", "district"),
    ("regency", "regency"),
];

const MAP_PROJECTION: &str = "id, latitude, longitude, road_name AS title, \
     damage_type AS category, damage_level AS severity, status, \
     (report_datetime AT TIME ZONE 'UTC')::date AS reported_on";

const HAS_BRIDGE: &str = r"btrim(COALESCE(bridge_name, ''), E' \t\r\n') <> ''";

pub static FILTERS: FilterSpec = FilterSpec {
    fields: &[
        FilterField::token("status", check_token::<ReportStatus>),
        FilterField::token("urgency_level", check_token::<UrgencyLevel>),
        FilterField::token("damage_level", check_token::<DamageLevel>),
        FilterField::token("damage_type", check_token::<RoadDamageType>),
        FilterField::token("road_type", check_token::<RoadType>),
        FilterField::token("pavement_type", check_token::<PavementType>),
        FilterField::token("traffic_condition", check_token::<TrafficCondition>),
        FilterField::token("traffic_impact", check_token::<TrafficImpact>),
        FilterField::text("district"),
        FilterField::text("village"),
        FilterField::text("regency"),
        FilterField::text("created_by"),
        FilterField::substring("road_name", &["road_name"]),
        FilterField::substring("name", &["road_name", "bridge_name"]),
    ],
    date_column: REPORT_DATE,
    geo: true,
};

fn default_order() -> String {
    format!(
        "{} ASC, {} ASC, created_at DESC",
        URGENCY_RANK.sql(),
        TRAFFIC_IMPACT_RANK.sql()
    )
}

fn bind_road<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    r: &'q RoadReport,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    bind_header(query, &r.header)
        .bind(&r.road_name)
        .bind(r.road_type)
        .bind(r.pavement_type)
        .bind(r.segment_length)
        .bind(r.damage_type)
        .bind(r.damage_level)
        .bind(r.damaged_length)
        .bind(r.damaged_width)
        .bind(r.damaged_area)
        .bind(r.total_damaged_area)
        .bind(&r.bridge_name)
        .bind(r.bridge_type)
        .bind(r.bridge_damage_level)
        .bind(r.traffic_condition)
        .bind(r.traffic_impact)
        .bind(r.daily_traffic_volume)
        .bind(r.urgency_level)
        .bind(r.estimated_budget)
        .bind(r.estimated_repair_time_days)
        .bind(&r.description)
        .bind(r.report_datetime)
        .bind(r.status)
        .bind(&r.status_note)
}

impl PhotoOwner for RoadReport {
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
    report: RoadReport,
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
    emergency: i64,
    blocked: i64,
    bridges: i64,
    damaged_area: f64,
    budget: f64,
    avg_repair_days: f64,
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
        m.insert("emergency_reports".into(), self.emergency as f64);
        m.insert("blocked_roads".into(), self.blocked as f64);
        m.insert("bridge_reports".into(), self.bridges as f64);
        m.insert("total_damaged_area".into(), round2(self.damaged_area));
        m.insert("total_estimated_budget".into(), round2(self.budget));
        m.insert("avg_repair_time_days".into(), round2(self.avg_repair_days));
        m.insert("completion_rate".into(), percentage(self.completed, self.total));
        m
    }
}

const GROWTH_KEYS: &[&str] = &["total_reports", "total_damaged_area", "total_estimated_budget"];

#[derive(Clone)]
pub struct RoadRepository {
    pool: PgPool,
    ids: Arc<IdGenerator>,
}

impl RoadRepository {
    pub fn new(pool: PgPool, ids: Arc<IdGenerator>) -> Self {
        Self { pool, ids }
    }

    /// Insert a report with its photos in one transaction.
    #[instrument(skip(self, ctx, report, photos), fields(road = %report.road_name))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        mut report: RoadReport,
        photos: &[NewPhoto],
    ) -> CoreResult<RoadReport> {
        report.before_create(&self.ids, Utc::now())?;
        report.validate()?;
        ctx.run(async {
            let mut tx = self.pool.begin().await?;
            let sql = insert_sql(TABLE, COLUMNS);
            let mut stored = bind_road(sqlx::query_as::<Postgres, RoadReport>(&sql), &report)
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
            info!(id = %stored.header.id, "Road report created");
            Ok(stored)
        })
        .await
    }

    /// Overwrite everything except id, created_at, created_by and status.
    #[instrument(skip(self, ctx, report))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: &str,
        mut report: RoadReport,
    ) -> CoreResult<RoadReport> {
        ctx.run(async {
            let previous = self.fetch_row(id).await?;
            report.before_update(&previous, Utc::now());
            report.validate()?;
            let sql = update_sql(TABLE, COLUMNS);
            let row = bind_road(sqlx::query_as::<Postgres, RoadReport>(&sql), &report)
                .fetch_optional(&self.pool)
                .await?;
            let Some(mut stored) = row else {
                return Err(common::edit_miss(&self.pool, TABLE, id).await);
            };
            stored.photos = PHOTOS.load(&self.pool, id).await?;
            info!("Road report updated");
            Ok(stored)
        })
        .await
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()> {
        ctx.run(common::delete_by_id(&self.pool, TABLE, id)).await
    }

    pub async fn find_by_id(&self, ctx: &RequestContext, id: &str) -> CoreResult<RoadReport> {
        ctx.run(async {
            let mut report = self.fetch_row(id).await?;
            report.photos = PHOTOS.load(&self.pool, id).await?;
            Ok(report)
        })
        .await
    }

    async fn fetch_row(&self, id: &str) -> CoreResult<RoadReport> {
        let sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = $1");
        sqlx::query_as::<Postgres, RoadReport>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("road report {id}")))
    }

    /// Filtered page; ordered by urgency, traffic impact, then newest.
    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<RoadReport>> {
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
    ) -> CoreResult<Page<RoadReport>> {
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
    ) -> CoreResult<Page<RoadReport>> {
        let (rows, total) = common::fetch_page::<RoadReport>(
            &self.pool, COLUMNS, TABLE, &filter, &order, window,
        )
        .await?;
        let rows = attach_photos(&self.pool, PHOTOS, rows).await?;
        Ok(Page::new(rows, window, total))
    }

    /// Open reports ranked by the SQL rendering of the priority table.
    #[instrument(skip(self, ctx, scope))]
    pub async fn find_by_priority(
        &self,
        ctx: &RequestContext,
        limit: i64,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<Scored<RoadReport>>> {
        if limit < 0 {
            return Err(CoreError::validation(format!("limit must be >= 0, got {limit}")));
        }
        let mut filter = SqlFilter::for_scope(&FILTERS, scope)?;
        filter.push_raw(open_status_condition());
        let sql = format!(
            r#"
            SELECT {COLUMNS}, {score} AS priority_score
            FROM {TABLE} r
            {where_clause}
            ORDER BY priority_score DESC, created_at DESC, id DESC
            LIMIT ${limit_idx}
            "#,
            score = ROAD_PRIORITY.sql_expr("r"),
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

    /// Apply a workflow transition and return the row as stored afterwards.
    #[instrument(skip(self, ctx, note))]
    pub async fn update_status(
        &self,
        ctx: &RequestContext,
        id: &str,
        status: ReportStatus,
        note: Option<&str>,
    ) -> CoreResult<RoadReport> {
        ctx.run(async {
            common::update_status(
                &self.pool,
                TABLE,
                ROAD_WORKFLOW,
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

    /// Headline numbers; with a date range, also growth against the same
    /// range one year earlier.
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
                   COUNT(*) FILTER (WHERE urgency_level = 'EMERGENCY')::BIGINT AS emergency,
                   COUNT(*) FILTER (WHERE traffic_impact = 'BLOCKED')::BIGINT AS blocked,
                   COUNT(*) FILTER (WHERE {HAS_BRIDGE})::BIGINT AS bridges,
                   COALESCE(SUM(total_damaged_area), 0)::FLOAT8 AS damaged_area,
                   COALESCE(SUM(estimated_budget), 0)::FLOAT8 AS budget,
                   COALESCE(AVG(estimated_repair_time_days), 0)::FLOAT8 AS avg_repair_days
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

    /// Reports and damaged area per year. The scope's range is ignored;
    /// `years` defines the span.
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
            "t.total_damaged_area",
            &filter,
            years,
        ))
        .await
    }

    /// Reports per district, each split by damage level.
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
    fn default_order_ranks_urgency_then_traffic() {
        let order = order_clause(None, SORTABLE, &default_order()).unwrap();
        let urgency = order.find("urgency_level").unwrap();
        let traffic = order.find("traffic_impact").unwrap();
        assert!(urgency < traffic);
        assert!(order.ends_with("created_at DESC, id DESC"));
    }

    #[test]
    fn column_list_matches_binder() {
        let count = COLUMNS.split(',').count();
        let sql = insert_sql(TABLE, COLUMNS);
        assert!(sql.contains(&format!("${count})")));
        assert_eq!(count, 35);
    }

    #[test]
    fn kpi_metrics_include_completion_rate() {
        let row = KpiRow {
            total: 4,
            pending: 1,
            verified: 1,
            in_progress: 0,
            completed: 1,
            rejected: 1,
            emergency: 2,
            blocked: 1,
            bridges: 0,
            damaged_area: 120.456,
            budget: 0.0,
            avg_repair_days: 7.0,
        };
        let metrics = row.into_metrics();
        assert_eq!(metrics["completion_rate"], 25.0);
        assert_eq!(metrics["total_damaged_area"], 120.46);
    }

    #[test]
    fn owner_filter_is_recognised() {
        let mut filter = SqlFilter::new();
        filter
            .apply(&FILTERS, &ListQuery::new().filter("created_by", "u-1").filters)
            .unwrap();
        assert_eq!(filter.where_clause(), "WHERE created_by = $1");
    }
}
