use anyhow::Result;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::db;
use crate::ids::IdGenerator;
use crate::repositories::{
    AgricultureRepository, IndicatorRepository, RiceFieldRepository, RoadRepository,
    SpatialRepository, UserRepository, WaterRepository,
};
use crate::services::{
    AgricultureReports, Cache, CacheStore, DashboardService, IndicatorService, RedisCache,
    ReportService, RiceFieldReports, RoadReports, SpatialReports, UserService, WaterReports,
};

/// Shared application state
pub struct AppState {
    pub db: PgPool,
    pub settings: Settings,
    pub cache: Cache,
    pub ids: Arc<IdGenerator>,
    pub road: RoadReports,
    pub water: WaterReports,
    pub spatial: SpatialReports,
    pub agriculture: AgricultureReports,
    pub rice_fields: RiceFieldReports,
    pub dashboards: DashboardService,
    pub indicators: IndicatorService,
    pub users: UserService,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub database: bool,
    pub cache: bool,
}

impl AppState {
    /// Wire repositories and services over an open pool and cache store.
    pub fn new(db: PgPool, settings: Settings, store: Arc<dyn CacheStore>) -> Arc<Self> {
        let cache = Cache::new(
            store,
            settings.cache_key_prefix.clone(),
            Duration::from_secs(settings.redis_cache_ttl_seconds),
        );
        let ids = Arc::new(IdGenerator::new());
        let rates = Arc::new(settings.productivity.clone());

        let road = RoadRepository::new(db.clone(), ids.clone());
        let water = WaterRepository::new(db.clone(), ids.clone());
        let spatial = SpatialRepository::new(db.clone(), ids.clone());
        let agriculture = AgricultureRepository::new(db.clone(), ids.clone(), rates);
        let rice_fields = RiceFieldRepository::new(db.clone(), ids.clone());

        let dashboards = DashboardService::new(
            road.clone(),
            water.clone(),
            spatial.clone(),
            agriculture.clone(),
            rice_fields.clone(),
            cache.clone(),
        );

        Arc::new(Self {
            road: ReportService::new(road, cache.clone(), &settings),
            water: ReportService::new(water, cache.clone(), &settings),
            spatial: ReportService::new(spatial, cache.clone(), &settings),
            agriculture: ReportService::new(agriculture, cache.clone(), &settings),
            rice_fields: ReportService::new(rice_fields, cache.clone(), &settings),
            dashboards,
            indicators: IndicatorService::new(IndicatorRepository::new(db.clone())),
            users: UserService::new(UserRepository::new(db.clone()), &settings),
            db,
            settings,
            cache,
            ids,
        })
    }

    /// Connect to PostgreSQL and Redis and build the state. The schema is
    /// expected to exist already.
    pub async fn connect(settings: Settings) -> Result<Arc<Self>> {
        let pool = db::create_pool(&settings).await?;
        let redis = RedisCache::new(&settings.redis_url).await?;
        if let Err(e) = redis.health_check().await {
            tracing::warn!(
                error = %e,
                "Redis is not answering; dashboards will be computed uncached"
            );
        }

        Ok(Self::new(pool, settings, Arc::new(redis)))
    }

    pub async fn health(&self) -> Health {
        Health {
            database: db::health_check(&self.db).await,
            cache: self.cache.ping().await,
        }
    }
}
