//! Agricultural extension visit persistence
//!
//! Visits are append-only. The three commodity blocks live in parallel
//! `food_*`, `horti_*` and `plantation_*` column groups; a group is written
//! only for a populated block, so the per-type fan-out always adds up to the
//! combined `COALESCE` total.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info, instrument};

use crate::analytics::{
    percentage, round2, shares, with_percentages, ProductivityTable, ProductivityYear,
};
use crate::context::RequestContext;
use crate::domain::agriculture::{AgricultureReport, CommodityBlock};
use crate::domain::common::{Lifecycle, NewPhoto, ReportHeader, ReportPhoto};
use crate::domain::dashboard::{
    Bounds, CommodityAnalysis, CommodityDistribution, CommodityShare, CommodityTypeTotal,
    DashboardScope, GroupCount, MapPoint, Metrics, OfficerActivity, ProductivityPoint, YearValue,
};
use crate::domain::enums::{
    check_token, AffectedAreaLevel, CommodityType, FarmerGroupType, FarmerHope, GrowthPhase,
    LandStatus, MainConstraint, PestType, TrainingNeed, UrgentNeed, WaterAccess, Weather,
};
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;
use crate::pagination::{Page, PageRequest, Window};
use crate::repositories::common::{
    self, add_growth, attach_photos, bind_header, insert_sql, PhotoOwner,
};
use crate::repositories::filter::{
    escape_like, order_clause, BindValue, BindValues, FilterField, FilterSpec, ListQuery, SqlFilter,
};
use crate::repositories::groups::{self, label_expr, resolve_dimension};
use crate::repositories::photos::PhotoTable;

const TABLE: &str = "agriculture_reports";

const PHOTOS: PhotoTable = PhotoTable {
    table: "agriculture_report_photos",
    parent: TABLE,
};

const COLUMNS: &str = "id, reporter_name, reporter_phone, latitude, longitude, address, village, \
     district, regency, created_by, created_at, updated_at, visit_date, farmer_name, farmer_group, \
     farmer_group_type, extension_officer, \
     food_commodity, food_land_status, food_land_area, food_growth_phase, food_plant_age_days, \
     food_planting_date, food_harvest_date, \
     horti_commodity, horti_land_status, horti_land_area, horti_growth_phase, \
     horti_plant_age_days, horti_planting_date, horti_harvest_date, \
     plantation_commodity, plantation_land_status, plantation_land_area, plantation_growth_phase, \
     plantation_plant_age_days, plantation_planting_date, plantation_harvest_date, \
     commodity_type, has_pest_attack, pest_type, affected_area_level, weather, main_constraint, \
     farmer_hope, training_needed, urgent_needs, water_access, notes";

/// Column prefix of each block, in fan-out order.
const BLOCKS: &[(&str, CommodityType)] = &[
    ("food", CommodityType::Pangan),
    ("horti", CommodityType::Hortikultura),
    ("plantation", CommodityType::Perkebunan),
];

const COMBINED_AREA: &str = "COALESCE(food_land_area, 0) + COALESCE(horti_land_area, 0) \
     + COALESCE(plantation_land_area, 0)";

const SORTABLE: &[&str] = &[
    "id",
    "created_at",
    "visit_date",
    "farmer_name",
    "extension_officer",
    "district",
    "commodity_type",
];

const DIMENSIONS: &[(&str, &str)] = &[
    ("pest_type", "pest_type"),
    ("affected_area_level", "affected_area_level"),
    ("weather", "weather"),
    ("main_constraint", "main_constraint"),
    ("farmer_hope", "farmer_hope"),
    ("training_needed", "training_needed"),
    ("urgent_needs", "urgent_needs"),
    ("water_access", "water_access"),
    ("farmer_group_type", "farmer_group_type"),
    ("commodity_type", "commodity_type"),
    ("extension_officer", "extension_officer"),
    ("district", "district"),
];

const MAP_PROJECTION: &str = "id, latitude, longitude, farmer_name AS title, \
     COALESCE(commodity_type, 'NOT_SET') AS category, affected_area_level AS severity, \
     NULL::TEXT AS status, visit_date AS reported_on";

pub static FILTERS: FilterSpec = FilterSpec {
    fields: &[
        FilterField::token("farmer_group_type", check_token::<FarmerGroupType>),
        FilterField::token("commodity_type", check_token::<CommodityType>),
        FilterField::token("pest_type", check_token::<PestType>),
        FilterField::token("affected_area_level", check_token::<AffectedAreaLevel>),
        FilterField::token("weather", check_token::<Weather>),
        FilterField::token("main_constraint", check_token::<MainConstraint>),
        FilterField::token("farmer_hope", check_token::<FarmerHope>),
        FilterField::token("training_needed", check_token::<TrainingNeed>),
        FilterField::token("urgent_needs", check_token::<UrgentNeed>),
        FilterField::token("water_access", check_token::<WaterAccess>),
        FilterField::boolean("has_pest_attack"),
        FilterField::text("extension_officer"),
        FilterField::text("district"),
        FilterField::text("village"),
        FilterField::text("regency"),
        FilterField::text("created_by"),
        FilterField::substring("farmer_name", &["farmer_name"]),
        FilterField::substring("name", &["farmer_name", "farmer_group"]),
        FilterField::substring(
            "commodity",
            &["food_commodity", "horti_commodity", "plantation_commodity"],
        ),
    ],
    date_column: "visit_date",
    geo: true,
};

const DEFAULT_ORDER: &str = "visit_date DESC, created_at DESC";

/// Stored shape: one flat row with the three column groups.
#[derive(FromRow)]
struct VisitRow {
    #[sqlx(flatten)]
    header: ReportHeader,
    visit_date: NaiveDate,
    farmer_name: String,
    farmer_group: Option<String>,
    farmer_group_type: Option<FarmerGroupType>,
    extension_officer: String,
    food_commodity: Option<String>,
    food_land_status: Option<LandStatus>,
    food_land_area: Option<f64>,
    food_growth_phase: Option<GrowthPhase>,
    food_plant_age_days: Option<i32>,
    food_planting_date: Option<NaiveDate>,
    food_harvest_date: Option<NaiveDate>,
    horti_commodity: Option<String>,
    horti_land_status: Option<LandStatus>,
    horti_land_area: Option<f64>,
    horti_growth_phase: Option<GrowthPhase>,
    horti_plant_age_days: Option<i32>,
    horti_planting_date: Option<NaiveDate>,
    horti_harvest_date: Option<NaiveDate>,
    plantation_commodity: Option<String>,
    plantation_land_status: Option<LandStatus>,
    plantation_land_area: Option<f64>,
    plantation_growth_phase: Option<GrowthPhase>,
    plantation_plant_age_days: Option<i32>,
    plantation_planting_date: Option<NaiveDate>,
    plantation_harvest_date: Option<NaiveDate>,
    commodity_type: Option<CommodityType>,
    has_pest_attack: bool,
    pest_type: Option<PestType>,
    affected_area_level: Option<AffectedAreaLevel>,
    weather: Option<Weather>,
    main_constraint: Option<MainConstraint>,
    farmer_hope: Option<FarmerHope>,
    training_needed: Option<TrainingNeed>,
    urgent_needs: Option<UrgentNeed>,
    water_access: Option<WaterAccess>,
    notes: Option<String>,
}

fn block(
    commodity: Option<String>,
    land_status: Option<LandStatus>,
    land_area: Option<f64>,
    growth_phase: Option<GrowthPhase>,
    plant_age_days: Option<i32>,
    planting_date: Option<NaiveDate>,
    harvest_date: Option<NaiveDate>,
) -> Option<CommodityBlock> {
    commodity.map(|commodity| CommodityBlock {
        commodity,
        land_status,
        land_area,
        growth_phase,
        plant_age_days,
        planting_date,
        harvest_date,
    })
}

impl From<VisitRow> for AgricultureReport {
    fn from(row: VisitRow) -> Self {
        Self {
            header: row.header,
            visit_date: row.visit_date,
            farmer_name: row.farmer_name,
            farmer_group: row.farmer_group,
            farmer_group_type: row.farmer_group_type,
            extension_officer: row.extension_officer,
            food: block(
                row.food_commodity,
                row.food_land_status,
                row.food_land_area,
                row.food_growth_phase,
                row.food_plant_age_days,
                row.food_planting_date,
                row.food_harvest_date,
            ),
            horti: block(
                row.horti_commodity,
                row.horti_land_status,
                row.horti_land_area,
                row.horti_growth_phase,
                row.horti_plant_age_days,
                row.horti_planting_date,
                row.horti_harvest_date,
            ),
            plantation: block(
                row.plantation_commodity,
                row.plantation_land_status,
                row.plantation_land_area,
                row.plantation_growth_phase,
                row.plantation_plant_age_days,
                row.plantation_planting_date,
                row.plantation_harvest_date,
            ),
            commodity_type: row.commodity_type,
            has_pest_attack: row.has_pest_attack,
            pest_type: row.pest_type,
            affected_area_level: row.affected_area_level,
            weather: row.weather,
            main_constraint: row.main_constraint,
            farmer_hope: row.farmer_hope,
            training_needed: row.training_needed,
            urgent_needs: row.urgent_needs,
            water_access: row.water_access,
            notes: row.notes,
            photos: Vec::new(),
        }
    }
}

fn bind_block<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    block: Option<&'q CommodityBlock>,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    let block = block.filter(|b| b.is_populated());
    query
        .bind(block.map(|b| b.commodity.as_str()))
        .bind(block.and_then(|b| b.land_status))
        .bind(block.and_then(|b| b.land_area))
        .bind(block.and_then(|b| b.growth_phase))
        .bind(block.and_then(|b| b.plant_age_days))
        .bind(block.and_then(|b| b.planting_date))
        .bind(block.and_then(|b| b.harvest_date))
}

fn bind_visit<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    r: &'q AgricultureReport,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    let query = bind_header(query, &r.header)
        .bind(r.visit_date)
        .bind(&r.farmer_name)
        .bind(&r.farmer_group)
        .bind(r.farmer_group_type)
        .bind(&r.extension_officer);
    let query = bind_block(query, r.food.as_ref());
    let query = bind_block(query, r.horti.as_ref());
    let query = bind_block(query, r.plantation.as_ref());
    query
        .bind(r.commodity_type)
        .bind(r.has_pest_attack)
        .bind(r.pest_type)
        .bind(r.affected_area_level)
        .bind(r.weather)
        .bind(r.main_constraint)
        .bind(r.farmer_hope)
        .bind(r.training_needed)
        .bind(r.urgent_needs)
        .bind(r.water_access)
        .bind(&r.notes)
}

impl PhotoOwner for AgricultureReport {
    fn report_id(&self) -> &str {
        &self.header.id
    }

    fn set_photos(&mut self, photos: Vec<ReportPhoto>) {
        self.photos = photos;
    }
}

/// `UNION ALL` of one select per block, each emitting the block's commodity,
/// its type and its area next to the visit columns the analyses need.
/// Every branch repeats `conditions`, so they share the same placeholders.
/// With `commodity_param`, each branch also matches its own commodity
/// column against that placeholder.
fn fan_out(conditions: &str, commodity_param: Option<usize>) -> String {
    BLOCKS
        .iter()
        .map(|(prefix, kind)| {
            let commodity_match = commodity_param
                .map(|idx| format!(" AND {prefix}_commodity ILIKE ${idx}"))
                .unwrap_or_default();
            format!(
                "SELECT id, {prefix}_commodity AS commodity, '{kind}' AS commodity_type, \
                 COALESCE({prefix}_land_area, 0)::FLOAT8 AS land_area, \
                 {prefix}_growth_phase AS growth_phase, district, farmer_name, has_pest_attack, \
                 visit_date FROM {TABLE} \
                 WHERE {prefix}_commodity IS NOT NULL AND {conditions}{commodity_match}"
            )
        })
        .collect::<Vec<_>>()
        .join(" UNION ALL ")
}

/// Sum the estimated production over commodity rows.
fn estimated_production(
    rows: &[CommodityShare],
    rates: &ProductivityTable,
    year: ProductivityYear,
) -> f64 {
    rows.iter()
        .map(|row| rates.estimate(&row.commodity, row.land_area, year))
        .sum()
}

/// Per-type totals with land-area percentages.
fn type_totals(rows: &[CommodityShare]) -> Vec<CommodityTypeTotal> {
    let areas: Vec<f64> = BLOCKS
        .iter()
        .map(|(_, kind)| {
            rows.iter()
                .filter(|r| r.commodity_type == *kind)
                .map(|r| r.land_area)
                .sum()
        })
        .collect();
    BLOCKS
        .iter()
        .zip(areas.iter().zip(shares(&areas)))
        .map(|((_, kind), (land_area, percentage))| CommodityTypeTotal {
            commodity_type: *kind,
            land_area: *land_area,
            percentage,
        })
        .collect()
}

fn commodity_pattern(commodity: &str) -> CoreResult<BindValue> {
    let commodity = commodity.trim();
    if commodity.is_empty() {
        return Err(CoreError::validation("commodity is required"));
    }
    Ok(BindValue::Text(format!("%{}%", escape_like(commodity))))
}

#[derive(FromRow)]
struct KpiRow {
    visits: i64,
    farmers: i64,
    officers: i64,
    land_area: f64,
    pest_visits: i64,
}

#[derive(FromRow)]
struct AnalysisRow {
    visits: i64,
    farmers: i64,
    land_area: f64,
    pest_visits: i64,
}

const GROWTH_KEYS: &[&str] =
    &["total_visits", "total_farmers", "total_land_area", "estimated_production"];

#[derive(Clone)]
pub struct AgricultureRepository {
    pool: PgPool,
    ids: Arc<IdGenerator>,
    rates: Arc<ProductivityTable>,
}

impl AgricultureRepository {
    pub fn new(pool: PgPool, ids: Arc<IdGenerator>, rates: Arc<ProductivityTable>) -> Self {
        Self { pool, ids, rates }
    }

    pub fn rates(&self) -> &ProductivityTable {
        &self.rates
    }

    /// Record a visit with its photos.
    #[instrument(skip(self, ctx, visit, photos), fields(officer = %visit.extension_officer))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        mut visit: AgricultureReport,
        photos: &[NewPhoto],
    ) -> CoreResult<AgricultureReport> {
        visit.before_create(&self.ids, Utc::now())?;
        visit.validate()?;
        ctx.run(async {
            let mut tx = self.pool.begin().await?;
            let sql = insert_sql(TABLE, COLUMNS);
            let row = bind_visit(sqlx::query_as::<Postgres, VisitRow>(&sql), &visit)
                .fetch_one(&mut *tx)
                .await?;
            let mut stored = AgricultureReport::from(row);
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
            info!(id = %stored.header.id, "Agriculture visit recorded");
            Ok(stored)
        })
        .await
    }

    pub async fn delete(&self, ctx: &RequestContext, id: &str) -> CoreResult<()> {
        ctx.run(common::delete_by_id(&self.pool, TABLE, id)).await
    }

    pub async fn find_by_id(
        &self,
        ctx: &RequestContext,
        id: &str,
    ) -> CoreResult<AgricultureReport> {
        let sql = format!("SELECT {COLUMNS} FROM {TABLE} WHERE id = $1");
        ctx.run(async {
            let row = sqlx::query_as::<Postgres, VisitRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("agriculture report {id}")))?;
            let mut visit = AgricultureReport::from(row);
            visit.photos = PHOTOS.load(&self.pool, id).await?;
            Ok(visit)
        })
        .await
    }

    /// Filtered page, most recent visit first.
    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<AgricultureReport>> {
        let window = query.page.window(default_limit, max_limit)?;
        let mut filter = SqlFilter::new();
        filter.apply(&FILTERS, &query.filters)?;
        let order = order_clause(query.sort.as_ref(), SORTABLE, DEFAULT_ORDER)?;
        ctx.run(self.page(filter, order, window)).await
    }

    pub async fn find_by_owner(
        &self,
        ctx: &RequestContext,
        user_id: &str,
        page: PageRequest,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<AgricultureReport>> {
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
    ) -> CoreResult<Page<AgricultureReport>> {
        let (rows, total) = common::fetch_page::<VisitRow>(
            &self.pool, COLUMNS, TABLE, &filter, &order, window,
        )
        .await?;
        let visits = rows.into_iter().map(AgricultureReport::from).collect();
        let visits = attach_photos(&self.pool, PHOTOS, visits).await?;
        Ok(Page::new(visits, window, total))
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
        ctx.run(common::map_points(&self.pool, TABLE, MAP_PROJECTION, "visit_date DESC", &filter))
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
        ctx.run(common::map_points(&self.pool, TABLE, MAP_PROJECTION, "visit_date DESC", &filter))
            .await
    }

    /// Visits, farmers, land area, pest rate and estimated production. The
    /// previous period is priced with the previous year's rates.
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
            let mut metrics = self.kpi_metrics(&current, ProductivityYear::Current).await?;
            if let Some(previous) = previous {
                let before = self.kpi_metrics(&previous, ProductivityYear::Previous).await?;
                add_growth(&mut metrics, &before, GROWTH_KEYS);
            }
            Ok(metrics)
        })
        .await
    }

    async fn kpi_metrics(&self, filter: &SqlFilter, year: ProductivityYear) -> CoreResult<Metrics> {
        let sql = format!(
            r#"
            SELECT COUNT(*)::BIGINT AS visits,
                   COUNT(DISTINCT lower(btrim(farmer_name)))::BIGINT AS farmers,
                   COUNT(DISTINCT extension_officer)::BIGINT AS officers,
                   COALESCE(SUM({COMBINED_AREA}), 0)::FLOAT8 AS land_area,
                   COUNT(*) FILTER (WHERE has_pest_attack)::BIGINT AS pest_visits
            FROM {TABLE}
            {where_clause}
            "#,
            where_clause = filter.where_clause(),
        );
        let row = sqlx::query_as::<Postgres, KpiRow>(&sql)
            .bind_values(filter.binds())
            .fetch_one(&self.pool)
            .await?;
        let shares = self.shares(filter).await?;

        let mut m = Metrics::new();
        m.insert("total_visits".into(), row.visits as f64);
        m.insert("total_farmers".into(), row.farmers as f64);
        m.insert("active_officers".into(), row.officers as f64);
        m.insert("total_land_area".into(), round2(row.land_area));
        m.insert("pest_attacks".into(), row.pest_visits as f64);
        m.insert("pest_rate".into(), percentage(row.pest_visits, row.visits));
        m.insert(
            "estimated_production".into(),
            round2(estimated_production(&shares, &self.rates, year)),
        );
        Ok(m)
    }

    /// Commodity rows from the three-way fan-out.
    async fn shares(&self, filter: &SqlFilter) -> CoreResult<Vec<CommodityShare>> {
        let sql = format!(
            r#"
            SELECT commodity, commodity_type, COUNT(*)::BIGINT AS visits,
                   COALESCE(SUM(land_area), 0)::FLOAT8 AS land_area
            FROM ({fan}) f
            GROUP BY commodity, commodity_type
            ORDER BY land_area DESC, commodity ASC, commodity_type ASC
            "#,
            fan = fan_out(&filter.conjunction(), None),
        );
        Ok(sqlx::query_as::<Postgres, CommodityShare>(&sql)
            .bind_values(filter.binds())
            .fetch_all(&self.pool)
            .await?)
    }

    async fn combined_total(&self, filter: &SqlFilter) -> CoreResult<f64> {
        let sql = format!(
            "SELECT COALESCE(SUM({COMBINED_AREA}), 0)::FLOAT8 FROM {TABLE} {}",
            filter.where_clause()
        );
        Ok(sqlx::query_scalar::<Postgres, f64>(&sql)
            .bind_values(filter.binds())
            .fetch_one(&self.pool)
            .await?)
    }

    /// Land area per commodity and per block type.
    #[instrument(skip(self, ctx, scope))]
    pub async fn commodity_distribution(
        &self,
        ctx: &RequestContext,
        scope: &DashboardScope,
    ) -> CoreResult<CommodityDistribution> {
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        ctx.run(async {
            let rows = self.shares(&filter).await?;
            let combined_total = self.combined_total(&filter).await?;
            Ok(CommodityDistribution {
                by_type: type_totals(&rows),
                rows,
                combined_total,
            })
        })
        .await
    }

    /// `COALESCE(food,0) + COALESCE(horti,0) + COALESCE(plantation,0)` summed.
    pub async fn combined_land_area(
        &self,
        ctx: &RequestContext,
        scope: &DashboardScope,
    ) -> CoreResult<f64> {
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        ctx.run(self.combined_total(&filter)).await
    }

    /// Area, productivity and production of `commodity` for each of `years`,
    /// zero-filled. Matching is a case-insensitive substring on every block.
    #[instrument(skip(self, ctx, scope))]
    pub async fn productivity_trend(
        &self,
        ctx: &RequestContext,
        commodity: &str,
        years: &[i32],
        scope: &DashboardScope,
    ) -> CoreResult<Vec<ProductivityPoint>> {
        let pattern = commodity_pattern(commodity)?;
        let filter = SqlFilter::for_scope_in(&FILTERS, scope, None)?;
        let commodity_idx = filter.next_param();
        let sql = format!(
            r#"
            SELECT y.year::INT AS year, COALESCE(SUM(f.land_area), 0)::FLOAT8 AS land_area
            FROM unnest(${years_idx}::INT[]) AS y(year)
            LEFT JOIN ({fan}) f ON EXTRACT(YEAR FROM f.visit_date)::INT = y.year
            GROUP BY y.year
            ORDER BY y.year
            "#,
            years_idx = commodity_idx + 1,
            fan = fan_out(&filter.conjunction(), Some(commodity_idx)),
        );
        let years = BindValue::IntArray(years.to_vec());
        let rate = self.rates.rate_current(commodity);
        ctx.run(async {
            let rows = sqlx::query_as::<Postgres, (i32, f64)>(&sql)
                .bind_values(filter.binds())
                .bind_value(&pattern)
                .bind_value(&years)
                .fetch_all(&self.pool)
                .await?;
            Ok(rows
                .into_iter()
                .map(|(year, land_area)| {
                    let productivity = if land_area > 0.0 { rate } else { 0.0 };
                    ProductivityPoint {
                        year,
                        land_area,
                        productivity,
                        production: round2(land_area * productivity),
                    }
                })
                .collect())
        })
        .await
    }

    /// Everything known about one commodity within the scope.
    #[instrument(skip(self, ctx, scope))]
    pub async fn commodity_analysis(
        &self,
        ctx: &RequestContext,
        commodity: &str,
        scope: &DashboardScope,
    ) -> CoreResult<CommodityAnalysis> {
        let pattern = commodity_pattern(commodity)?;
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        let fan = fan_out(&filter.conjunction(), Some(filter.next_param()));
        let summary_sql = format!(
            r#"
            SELECT COUNT(DISTINCT id)::BIGINT AS visits,
                   COUNT(DISTINCT lower(btrim(farmer_name)))::BIGINT AS farmers,
                   COALESCE(SUM(land_area), 0)::FLOAT8 AS land_area,
                   COUNT(DISTINCT id) FILTER (WHERE has_pest_attack)::BIGINT AS pest_visits
            FROM ({fan}) f
            "#
        );
        let group_sql = |column: &str| {
            format!(
                "SELECT {label} AS label, COUNT(*)::BIGINT AS count FROM ({fan}) f \
                 GROUP BY 1 ORDER BY count DESC, label ASC",
                label = label_expr(column)
            )
        };
        let phase_sql = group_sql("growth_phase");
        let district_sql = group_sql("district");
        let rate = self.rates.rate_current(commodity);

        ctx.run(async {
            let summary = sqlx::query_as::<Postgres, AnalysisRow>(&summary_sql)
                .bind_values(filter.binds())
                .bind_value(&pattern)
                .fetch_one(&self.pool)
                .await?;
            let phases = sqlx::query_as::<Postgres, (String, i64)>(&phase_sql)
                .bind_values(filter.binds())
                .bind_value(&pattern)
                .fetch_all(&self.pool)
                .await?;
            let districts = sqlx::query_as::<Postgres, (String, i64)>(&district_sql)
                .bind_values(filter.binds())
                .bind_value(&pattern)
                .fetch_all(&self.pool)
                .await?;
            Ok(CommodityAnalysis {
                commodity: commodity.trim().to_uppercase(),
                visits: summary.visits,
                farmers: summary.farmers,
                land_area: round2(summary.land_area),
                productivity: rate,
                estimated_production: round2(summary.land_area * rate),
                pest_rate: percentage(summary.pest_visits, summary.visits),
                by_growth_phase: with_percentages(phases),
                by_district: with_percentages(districts),
            })
        })
        .await
    }

    /// Distribution over one of the needs, constraint, pest or weather
    /// dimensions.
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

    /// Visits, farmers and land area per extension officer.
    pub async fn officer_activity(
        &self,
        ctx: &RequestContext,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<OfficerActivity>> {
        let filter = SqlFilter::for_scope(&FILTERS, scope)?;
        let sql = format!(
            r#"
            SELECT extension_officer,
                   COUNT(*)::BIGINT AS visits,
                   COUNT(DISTINCT lower(btrim(farmer_name)))::BIGINT AS farmers,
                   COALESCE(SUM({COMBINED_AREA}), 0)::FLOAT8 AS land_area,
                   MAX(visit_date) AS last_visit
            FROM {TABLE}
            {where_clause}
            GROUP BY extension_officer
            ORDER BY visits DESC, extension_officer ASC
            "#,
            where_clause = filter.where_clause(),
        );
        ctx.run(async {
            Ok(sqlx::query_as::<Postgres, OfficerActivity>(&sql)
                .bind_values(filter.binds())
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    /// Visits and combined land area per year.
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
            "EXTRACT(YEAR FROM t.visit_date)::INT",
            "COALESCE(t.food_land_area, 0) + COALESCE(t.horti_land_area, 0) \
             + COALESCE(t.plantation_land_area, 0)",
            &filter,
            years,
        ))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn share(commodity: &str, kind: CommodityType, land_area: f64) -> CommodityShare {
        CommodityShare {
            commodity: commodity.into(),
            commodity_type: kind,
            visits: 1,
            land_area,
        }
    }

    #[test]
    fn fan_out_has_one_branch_per_block() {
        let sql = fan_out("district = $1", Some(2));
        assert_eq!(sql.matches(" UNION ALL ").count(), 2);
        assert!(sql.contains("'PANGAN' AS commodity_type"));
        assert!(sql.contains("horti_commodity ILIKE $2"));
        assert_eq!(sql.matches("district = $1").count(), 3);
    }

    #[test]
    fn type_totals_add_up_to_the_grand_total() {
        let rows = vec![
            share("PADI", CommodityType::Pangan, 2.5),
            share("CABAI", CommodityType::Hortikultura, 0.5),
            share("KOPI", CommodityType::Perkebunan, 3.5),
        ];
        let totals = type_totals(&rows);
        assert_eq!(totals[0].land_area, 2.5);
        assert_eq!(totals[1].land_area, 0.5);
        assert_eq!(totals[2].land_area, 3.5);
        let sum: f64 = totals.iter().map(|t| t.land_area).sum();
        assert!((sum - 6.5).abs() < 1e-6);
        let pct: f64 = totals.iter().map(|t| t.percentage).sum();
        assert!((pct - 100.0).abs() <= 0.05);
    }

    #[test]
    fn production_uses_the_requested_rates() {
        let rows = vec![share("Padi sawah", CommodityType::Pangan, 10.0)];
        let rates = ProductivityTable::default();
        let current = estimated_production(&rows, &rates, ProductivityYear::Current);
        let previous = estimated_production(&rows, &rates, ProductivityYear::Previous);
        assert!((current - 52.0).abs() < 1e-9);
        assert!((previous - 50.0).abs() < 1e-9);
    }

    #[test]
    fn blank_commodity_is_rejected() {
        assert!(commodity_pattern("  ").is_err());
        assert_eq!(
            commodity_pattern(" padi ").unwrap(),
            BindValue::Text("%padi%".to_string())
        );
    }

    #[test]
    fn column_list_matches_binder() {
        assert_eq!(COLUMNS.split(',').count(), 49);
    }
}
