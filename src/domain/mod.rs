//! Domain types
//!
//! Records, categorical enumerations, the status machine and the shapes the
//! dashboards return. Nothing in here talks to the store.

pub mod agriculture;
pub mod common;
pub mod dashboard;
pub mod enums;
pub mod indicators;
pub mod rice_field;
pub mod road;
pub mod spatial;
pub mod status;
pub mod users;
pub mod water;

// Re-export commonly used types
pub use agriculture::{AgricultureReport, CommodityBlock};
pub use common::{Lifecycle, NewPhoto, ReportHeader, ReportPhoto};
pub use dashboard::{DashboardScope, GroupCount, MapPoint, Metrics, ReportDomain, Scored};
pub use indicators::{IndicatorKind, IndicatorValue};
pub use rice_field::RiceField;
pub use road::RoadReport;
pub use spatial::SpatialReport;
pub use status::{ReportStatus, Workflow};
pub use users::{Role, User};
pub use water::WaterReport;
