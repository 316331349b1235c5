//! Service layer: capability checks, caching and cache invalidation on top
//! of the repositories.

pub mod cache;
pub mod dashboards;
pub mod indicators;
pub mod reports;
pub mod users;

pub use cache::{Cache, CacheStore, MemoryCache, RedisCache};
pub use dashboards::DashboardService;
pub use indicators::IndicatorService;
pub use reports::{
    AgricultureReports, ReportService, RiceFieldReports, RoadReports, SpatialReports, WaterReports,
};
pub use users::UserService;
