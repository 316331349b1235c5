//! Store access
//!
//! One repository per record kind, built over a shared [`sqlx::PgPool`].
//! Queries are runtime-checked strings with every value bound; only
//! allow-listed identifiers are ever formatted into SQL text.

pub mod agriculture_repo;
pub mod common;
pub mod filter;
pub mod groups;
pub mod indicator_repo;
pub mod photos;
pub mod rice_field_repo;
pub mod road_repo;
pub mod spatial_repo;
pub mod user_repo;
pub mod water_repo;

pub use agriculture_repo::AgricultureRepository;
pub use filter::{ListQuery, Sort};
pub use indicator_repo::IndicatorRepository;
pub use rice_field_repo::RiceFieldRepository;
pub use road_repo::RoadRepository;
pub use spatial_repo::SpatialRepository;
pub use user_repo::UserRepository;
pub use water_repo::WaterRepository;
