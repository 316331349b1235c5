//! Executive dashboards.
//!
//! Each composite is served from the cache when present. Otherwise all of its
//! queries run concurrently inside a single `ctx.run`, so a cancelled or
//! timed-out request aborts every one of them and nothing partial is cached.

use std::future::Future;

use futures::try_join;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crate::analytics::trend_years;
use crate::auth::{AuthContext, Capability};
use crate::context::RequestContext;
use crate::domain::dashboard::{
    AgricultureDashboard, CommodityAnalysis, DashboardScope, ProductivityPoint, ReportDomain,
    RiceFieldDashboard, RoadDashboard, SpatialDashboard, WaterDashboard,
};
use crate::error::{CoreError, CoreResult};
use crate::repositories::{
    AgricultureRepository, RiceFieldRepository, RoadRepository, SpatialRepository, WaterRepository,
};
use crate::services::cache::Cache;

/// Items in a dashboard's priority list.
pub const PRIORITY_LIST_LEN: i64 = 10;

#[derive(Clone)]
pub struct DashboardService {
    road: RoadRepository,
    water: WaterRepository,
    spatial: SpatialRepository,
    agriculture: AgricultureRepository,
    rice_fields: RiceFieldRepository,
    cache: Cache,
}

impl DashboardService {
    pub fn new(
        road: RoadRepository,
        water: WaterRepository,
        spatial: SpatialRepository,
        agriculture: AgricultureRepository,
        rice_fields: RiceFieldRepository,
        cache: Cache,
    ) -> Self {
        Self {
            road,
            water,
            spatial,
            agriculture,
            rice_fields,
            cache,
        }
    }

    /// Return the cached value under `key`, or compute, cache and return it.
    async fn cached<T, F>(&self, ctx: &RequestContext, key: String, compute: F) -> CoreResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: Future<Output = CoreResult<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(ctx, &key).await {
            return Ok(hit);
        }
        let value = ctx.run(compute).await?;
        self.cache.set(ctx, &key, &value).await;
        debug!(key = %key, "Dashboard computed");
        Ok(value)
    }

    #[instrument(skip(self, ctx, auth))]
    pub async fn road(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        scope: &DashboardScope,
    ) -> CoreResult<RoadDashboard> {
        auth.require(Capability::ViewReports)?;
        let key = self.cache.dashboard_key(ReportDomain::Road, scope);
        let years = trend_years(scope.range.as_ref());
        let repo = &self.road;
        self.cached(ctx, key, async {
            let (
                kpis,
                by_status,
                by_urgency,
                by_damage_level,
                by_damage_type,
                by_road_type,
                districts,
                trend,
                map,
                priority,
            ) = try_join!(
                repo.kpis(ctx, scope),
                repo.group_counts(ctx, "status", scope),
                repo.group_counts(ctx, "urgency_level", scope),
                repo.group_counts(ctx, "damage_level", scope),
                repo.group_counts(ctx, "damage_type", scope),
                repo.group_counts(ctx, "road_type", scope),
                repo.district_breakdown(ctx, scope),
                repo.yearly_trend(ctx, &years, scope),
                repo.map_points(ctx, scope),
                repo.find_by_priority(ctx, PRIORITY_LIST_LEN, scope),
            )?;
            Ok(RoadDashboard {
                kpis,
                by_status,
                by_urgency,
                by_damage_level,
                by_damage_type,
                by_road_type,
                districts,
                trend,
                map,
                priority,
            })
        })
        .await
    }

    #[instrument(skip(self, ctx, auth))]
    pub async fn water(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        scope: &DashboardScope,
    ) -> CoreResult<WaterDashboard> {
        auth.require(Capability::ViewReports)?;
        let key = self.cache.dashboard_key(ReportDomain::Water, scope);
        let years = trend_years(scope.range.as_ref());
        let repo = &self.water;
        self.cached(ctx, key, async {
            let (
                kpis,
                by_status,
                by_urgency,
                by_damage_level,
                by_irrigation_type,
                by_institution,
                districts,
                trend,
                map,
                priority,
            ) = try_join!(
                repo.kpis(ctx, scope),
                repo.group_counts(ctx, "status", scope),
                repo.group_counts(ctx, "urgency_category", scope),
                repo.group_counts(ctx, "damage_level", scope),
                repo.group_counts(ctx, "irrigation_type", scope),
                repo.group_counts(ctx, "institution_unit", scope),
                repo.district_breakdown(ctx, scope),
                repo.yearly_trend(ctx, &years, scope),
                repo.map_points(ctx, scope),
                repo.find_by_priority(ctx, PRIORITY_LIST_LEN, scope),
            )?;
            Ok(WaterDashboard {
                kpis,
                by_status,
                by_urgency,
                by_damage_level,
                by_irrigation_type,
                by_institution,
                districts,
                trend,
                map,
                priority,
            })
        })
        .await
    }

    #[instrument(skip(self, ctx, auth))]
    pub async fn spatial(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        scope: &DashboardScope,
    ) -> CoreResult<SpatialDashboard> {
        auth.require(Capability::ViewReports)?;
        let key = self.cache.dashboard_key(ReportDomain::Spatial, scope);
        let years = trend_years(scope.range.as_ref());
        let repo = &self.spatial;
        self.cached(ctx, key, async {
            let (
                kpis,
                by_status,
                by_violation_type,
                by_violation_level,
                by_area_category,
                by_environmental_impact,
                trend,
                map,
            ) = try_join!(
                repo.kpis(ctx, scope),
                repo.group_counts(ctx, "status", scope),
                repo.group_counts(ctx, "violation_type", scope),
                repo.group_counts(ctx, "violation_level", scope),
                repo.group_counts(ctx, "area_category", scope),
                repo.group_counts(ctx, "environmental_impact", scope),
                repo.yearly_trend(ctx, &years, scope),
                repo.map_points(ctx, scope),
            )?;
            Ok(SpatialDashboard {
                kpis,
                by_status,
                by_violation_type,
                by_violation_level,
                by_area_category,
                by_environmental_impact,
                trend,
                map,
            })
        })
        .await
    }

    #[instrument(skip(self, ctx, auth))]
    pub async fn agriculture(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        scope: &DashboardScope,
    ) -> CoreResult<AgricultureDashboard> {
        auth.require(Capability::ViewReports)?;
        let key = self.cache.dashboard_key(ReportDomain::Agriculture, scope);
        let years = trend_years(scope.range.as_ref());
        let repo = &self.agriculture;
        self.cached(ctx, key, async {
            let (
                kpis,
                commodities,
                pests,
                constraints,
                hopes,
                training,
                urgent_needs,
                officers,
                trend,
                map,
            ) = try_join!(
                repo.kpis(ctx, scope),
                repo.commodity_distribution(ctx, scope),
                repo.group_counts(ctx, "pest_type", scope),
                repo.group_counts(ctx, "main_constraint", scope),
                repo.group_counts(ctx, "farmer_hope", scope),
                repo.group_counts(ctx, "training_needed", scope),
                repo.group_counts(ctx, "urgent_needs", scope),
                repo.officer_activity(ctx, scope),
                repo.yearly_trend(ctx, &years, scope),
                repo.map_points(ctx, scope),
            )?;
            Ok(AgricultureDashboard {
                kpis,
                commodities,
                pests,
                constraints,
                hopes,
                training,
                urgent_needs,
                officers,
                trend,
                map,
            })
        })
        .await
    }

    /// Visits, area and production of one commodity.
    pub async fn commodity_analysis(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        commodity: &str,
        scope: &DashboardScope,
    ) -> CoreResult<CommodityAnalysis> {
        auth.require(Capability::ViewReports)?;
        let fragment = format!(
            "commodity={}:{}",
            commodity_key(commodity)?,
            scope.cache_fragment()
        );
        let key = self.cache.dashboard_key_for(ReportDomain::Agriculture, &fragment);
        self.cached(ctx, key, self.agriculture.commodity_analysis(ctx, commodity, scope))
            .await
    }

    /// Five-year productivity series of one commodity.
    pub async fn productivity_trend(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        commodity: &str,
        scope: &DashboardScope,
    ) -> CoreResult<Vec<ProductivityPoint>> {
        auth.require(Capability::ViewReports)?;
        let fragment = format!(
            "productivity={}:{}",
            commodity_key(commodity)?,
            scope.cache_fragment()
        );
        let key = self.cache.dashboard_key_for(ReportDomain::Agriculture, &fragment);
        let years = trend_years(scope.range.as_ref());
        self.cached(ctx, key, async {
            self.agriculture
                .productivity_trend(ctx, commodity, &years, scope)
                .await
        })
        .await
    }

    #[instrument(skip(self, ctx, auth))]
    pub async fn rice_field(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        year: i32,
    ) -> CoreResult<RiceFieldDashboard> {
        auth.require(Capability::ViewReports)?;
        let key = self
            .cache
            .dashboard_key_for(ReportDomain::RiceField, &format!("year={year}"));
        let years: Vec<i32> = (year - 4..=year).collect();
        let repo = &self.rice_fields;
        self.cached(ctx, key, async {
            let (kpis, districts, trend) = try_join!(
                repo.kpis(ctx, year),
                repo.district_summary(ctx, year),
                repo.yearly_trend(ctx, &years),
            )?;
            Ok(RiceFieldDashboard {
                year,
                kpis,
                districts,
                trend,
            })
        })
        .await
    }
}

/// Commodity as it appears in a cache key: trimmed, upper-cased, with the
/// key separator replaced.
/// Case-folded commodity as a quoted JSON string, so it cannot run into the
/// scope fragment that follows it.
fn commodity_key(commodity: &str) -> CoreResult<String> {
    let key = commodity.trim().to_uppercase();
    if key.is_empty() {
        return Err(CoreError::validation("commodity is required"));
    }
    Ok(serde_json::Value::String(key).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commodity_keys_are_normalized() {
        assert_eq!(commodity_key(" padi sawah ").unwrap(), r#""PADI SAWAH""#);
        assert_ne!(commodity_key("a:b").unwrap(), commodity_key("a_b").unwrap());
        assert!(commodity_key("   ").is_err());
    }
}
