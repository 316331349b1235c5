//! Shapes returned by aggregation queries and the dashboard composites built
//! from them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::analytics::dates::parse_date;
use crate::analytics::DateRange;
use crate::domain::enums::CommodityType;
use crate::domain::rice_field::RiceField;
use crate::domain::road::RoadReport;
use crate::domain::water::WaterReport;
use crate::error::CoreResult;

/// Label for a NULL categorical value.
pub const NOT_SET: &str = "NOT_SET";
/// Label for an empty-string categorical value.
pub const EMPTY: &str = "EMPTY";

/// Lower bound used when only `end_date` is given.
fn open_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// KPI block: metric name to scalar.
pub type Metrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportDomain {
    Road,
    Water,
    Agriculture,
    Spatial,
    RiceField,
}

impl ReportDomain {
    /// Namespace segment used in cache keys.
    pub fn key(self) -> &'static str {
        match self {
            Self::Road => "road",
            Self::Water => "water",
            Self::Agriculture => "agriculture",
            Self::Spatial => "spatial",
            Self::RiceField => "rice_field",
        }
    }
}

impl fmt::Display for ReportDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Categorical filters plus an optional closed date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardScope {
    #[serde(default)]
    pub filters: BTreeMap<String, String>,
    #[serde(default)]
    pub range: Option<DateRange>,
}

impl DashboardScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_range(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.filters.insert(key.into(), value.into());
        self
    }

    /// Split a raw filter map: `start_date`/`end_date` become the range, the
    /// rest stay as filters.
    pub fn from_filters(mut filters: BTreeMap<String, String>) -> CoreResult<Self> {
        let start = filters.remove("start_date");
        let end = filters.remove("end_date");
        let range = match (start, end) {
            (Some(start), Some(end)) => {
                Some(DateRange::new(parse_date(&start)?, parse_date(&end)?)?)
            }
            (Some(start), None) => {
                let start = parse_date(&start)?;
                let today = Utc::now().date_naive();
                Some(DateRange::new(start, start.max(today))?)
            }
            (None, Some(end)) => {
                let start = open_start();
                Some(DateRange::new(start, parse_date(&end)?.max(start))?)
            }
            (None, None) => None,
        };
        Ok(Self { filters, range })
    }

    /// `{filters as a JSON object}:{start|*}:{end|*}`. JSON keeps keys and
    /// values quoted, so distinct scopes never share a fragment.
    pub fn cache_fragment(&self) -> String {
        let filters: serde_json::Map<String, serde_json::Value> = self
            .filters
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let (start, end) = match &self.range {
            Some(r) => (r.start.to_string(), r.end.to_string()),
            None => ("*".to_string(), "*".to_string()),
        };
        format!("{}:{start}:{end}", serde_json::Value::Object(filters))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub label: String,
    pub count: i64,
    pub percentage: f64,
}

/// Group with per-label sub-counts, e.g. district by damage level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupBreakdown {
    pub label: String,
    pub count: i64,
    pub percentage: f64,
    pub sub_counts: Vec<GroupCount>,
}

/// One point of a per-year trend: record count and a summed value
/// (damaged area, land area, resolved reports...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct YearValue {
    pub year: i32,
    pub count: i64,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct MapPoint {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub title: String,
    pub category: String,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub reported_on: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMapPoint {
    #[serde(flatten)]
    pub point: MapPoint,
    pub estimated_length_m: f64,
    pub estimated_area_m2: f64,
}

/// Rectangle in decimal degrees. `west > east` crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        let lat_ok = self.south <= latitude && latitude <= self.north;
        let lon_ok = if self.west <= self.east {
            self.west <= longitude && longitude <= self.east
        } else {
            longitude >= self.west || longitude <= self.east
        };
        lat_ok && lon_ok
    }
}

/// A record with its priority score attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<T> {
    #[serde(flatten)]
    pub record: T,
    pub priority_score: i32,
}

// ---------------------------------------------------------------------------
// Agriculture
// ---------------------------------------------------------------------------

/// One commodity within one block type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct CommodityShare {
    pub commodity: String,
    pub commodity_type: CommodityType,
    pub visits: i64,
    pub land_area: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityTypeTotal {
    pub commodity_type: CommodityType,
    pub land_area: f64,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityDistribution {
    pub rows: Vec<CommodityShare>,
    pub by_type: Vec<CommodityTypeTotal>,
    /// Sum of `COALESCE(food,0)+COALESCE(horti,0)+COALESCE(plantation,0)`.
    pub combined_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityPoint {
    pub year: i32,
    pub land_area: f64,
    /// Tonnes per hectare; zero for years without recorded area.
    pub productivity: f64,
    pub production: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityAnalysis {
    pub commodity: String,
    pub visits: i64,
    pub farmers: i64,
    pub land_area: f64,
    pub productivity: f64,
    pub estimated_production: f64,
    pub pest_rate: f64,
    pub by_growth_phase: Vec<GroupCount>,
    pub by_district: Vec<GroupCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct OfficerActivity {
    pub extension_officer: String,
    pub visits: i64,
    pub farmers: i64,
    pub land_area: f64,
    pub last_visit: Option<NaiveDate>,
}

// ---------------------------------------------------------------------------
// Rice fields
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RiceFieldTrendPoint {
    pub year: i32,
    pub total_rice_field: f64,
    pub total_dry_land: f64,
    pub grand_total: f64,
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoadDashboard {
    pub kpis: Metrics,
    pub by_status: Vec<GroupCount>,
    pub by_urgency: Vec<GroupCount>,
    pub by_damage_level: Vec<GroupCount>,
    pub by_damage_type: Vec<GroupCount>,
    pub by_road_type: Vec<GroupCount>,
    pub districts: Vec<GroupBreakdown>,
    pub trend: Vec<YearValue>,
    pub map: Vec<MapPoint>,
    pub priority: Vec<Scored<RoadReport>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterDashboard {
    pub kpis: Metrics,
    pub by_status: Vec<GroupCount>,
    pub by_urgency: Vec<GroupCount>,
    pub by_damage_level: Vec<GroupCount>,
    pub by_irrigation_type: Vec<GroupCount>,
    pub by_institution: Vec<GroupCount>,
    pub districts: Vec<GroupBreakdown>,
    pub trend: Vec<YearValue>,
    pub map: Vec<MapPoint>,
    pub priority: Vec<Scored<WaterReport>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgricultureDashboard {
    pub kpis: Metrics,
    pub commodities: CommodityDistribution,
    pub pests: Vec<GroupCount>,
    pub constraints: Vec<GroupCount>,
    pub hopes: Vec<GroupCount>,
    pub training: Vec<GroupCount>,
    pub urgent_needs: Vec<GroupCount>,
    pub officers: Vec<OfficerActivity>,
    pub trend: Vec<YearValue>,
    pub map: Vec<MapPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialDashboard {
    pub kpis: Metrics,
    pub by_status: Vec<GroupCount>,
    pub by_violation_type: Vec<GroupCount>,
    pub by_violation_level: Vec<GroupCount>,
    pub by_area_category: Vec<GroupCount>,
    pub by_environmental_impact: Vec<GroupCount>,
    pub trend: Vec<YearValue>,
    pub map: Vec<SpatialMapPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiceFieldDashboard {
    pub year: i32,
    pub kpis: Metrics,
    pub districts: Vec<RiceField>,
    pub trend: Vec<RiceFieldTrendPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn cache_fragment_is_order_independent() {
        let a = DashboardScope::new()
            .with_filter("district", "Laweyan")
            .with_filter("damage_level", "SEVERE");
        let b = DashboardScope::new()
            .with_filter("damage_level", "SEVERE")
            .with_filter("district", "Laweyan");
        assert_eq!(a.cache_fragment(), b.cache_fragment());
        assert_eq!(
            a.cache_fragment(),
            r#"{"damage_level":"SEVERE","district":"Laweyan"}:*:*"#
        );
    }

    #[test]
    fn cache_fragment_keeps_scopes_apart() {
        let smuggled = DashboardScope::new().with_filter("district", "A&status=PENDING");
        let split = DashboardScope::new()
            .with_filter("district", "A")
            .with_filter("status", "PENDING");
        assert_ne!(smuggled.cache_fragment(), split.cache_fragment());

        let quoted = DashboardScope::new().with_filter("district", r#"A","status":"PENDING"#);
        assert_ne!(quoted.cache_fragment(), split.cache_fragment());
    }

    #[test]
    fn cache_fragment_includes_range() {
        let scope = DashboardScope::new()
            .with_range(DateRange::new(d(2024, 1, 1), d(2024, 12, 31)).unwrap());
        assert_eq!(scope.cache_fragment(), "{}:2024-01-01:2024-12-31");
    }

    #[test]
    fn date_keys_become_the_range() {
        let mut raw = BTreeMap::new();
        raw.insert("start_date".to_string(), "2024-01-01".to_string());
        raw.insert("end_date".to_string(), "2024-03-31".to_string());
        raw.insert("district".to_string(), "Jebres".to_string());
        let scope = DashboardScope::from_filters(raw).unwrap();
        assert_eq!(scope.range, Some(DateRange::new(d(2024, 1, 1), d(2024, 3, 31)).unwrap()));
        assert_eq!(scope.filters.len(), 1);

        let mut bad = BTreeMap::new();
        bad.insert("start_date".to_string(), "01/02/2024".to_string());
        assert!(DashboardScope::from_filters(bad).is_err());
    }

    #[test]
    fn bounds_across_antimeridian() {
        let pacific = Bounds { north: 10.0, south: -10.0, east: -170.0, west: 170.0 };
        assert!(pacific.contains(0.0, 175.0));
        assert!(pacific.contains(0.0, -175.0));
        assert!(!pacific.contains(0.0, 0.0));

        let java = Bounds { north: -6.0, south: -8.5, east: 112.0, west: 110.0 };
        assert!(java.contains(-7.5, 110.8));
        assert!(!java.contains(-5.0, 110.8));
    }

    #[test]
    fn scored_flattens_record() {
        let scored = Scored {
            record: GroupCount {
                label: "A".into(),
                count: 1,
                percentage: 100.0,
            },
            priority_score: 42,
        };
        let json = serde_json::to_value(&scored).unwrap();
        assert_eq!(json["label"], "A");
        assert_eq!(json["priority_score"], 42);
    }
}
