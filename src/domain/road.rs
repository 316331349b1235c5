//! Road and bridge damage reports ("Bina Marga").

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::common::{validate_non_negative, Lifecycle, ReportHeader, ReportPhoto};
use crate::domain::enums::{
    BridgeType, DamageLevel, PavementType, RoadDamageType, RoadType, TrafficCondition,
    TrafficImpact, UrgencyLevel,
};
use crate::domain::status::{ReportStatus, Workflow};
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;

pub const ROAD_WORKFLOW: Workflow = Workflow::Standard;

/// Characters ignored when deciding whether a bridge name is blank. The
/// priority SQL trims the same set.
pub const BLANK_CHARS: &[char] = &[' ', '\t', '\r', '\n'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RoadReport {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub header: ReportHeader,
    pub road_name: String,
    pub road_type: RoadType,
    pub pavement_type: PavementType,
    #[serde(default)]
    pub segment_length: f64,
    pub damage_type: RoadDamageType,
    pub damage_level: DamageLevel,
    #[serde(default)]
    pub damaged_length: f64,
    #[serde(default)]
    pub damaged_width: f64,
    #[serde(default)]
    pub damaged_area: f64,
    #[serde(default)]
    pub total_damaged_area: f64,
    #[serde(default)]
    pub bridge_name: Option<String>,
    #[serde(default)]
    pub bridge_type: Option<BridgeType>,
    #[serde(default)]
    pub bridge_damage_level: Option<DamageLevel>,
    pub traffic_condition: TrafficCondition,
    pub traffic_impact: TrafficImpact,
    #[serde(default)]
    pub daily_traffic_volume: i32,
    pub urgency_level: UrgencyLevel,
    #[serde(default)]
    pub estimated_budget: Decimal,
    #[serde(default)]
    pub estimated_repair_time_days: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "Utc::now")]
    pub report_datetime: DateTime<Utc>,
    #[serde(default)]
    pub status: ReportStatus,
    #[serde(default)]
    pub status_note: Option<String>,
    #[serde(default)]
    #[sqlx(skip)]
    pub photos: Vec<ReportPhoto>,
}

impl RoadReport {
    /// A bridge is present when the report names one.
    pub fn has_bridge(&self) -> bool {
        self.bridge_name
            .as_deref()
            .is_some_and(|name| !name.trim_matches(BLANK_CHARS).is_empty())
    }

    /// Area used for ranking: the total when recorded, the base area otherwise.
    pub fn effective_damaged_area(&self) -> f64 {
        if self.total_damaged_area > 0.0 {
            self.total_damaged_area
        } else {
            self.damaged_area
        }
    }

    /// Fill derived areas. Idempotent.
    pub fn apply_derivations(&mut self) {
        if self.damaged_area <= 0.0 && (self.damaged_length != 0.0 || self.damaged_width != 0.0) {
            self.damaged_area = self.damaged_length * self.damaged_width;
        }
        if self.total_damaged_area <= 0.0 || self.total_damaged_area < self.damaged_area {
            self.total_damaged_area = self.damaged_area;
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.header.validate()?;
        if self.road_name.trim().is_empty() {
            return Err(CoreError::validation("road_name is required"));
        }
        for (field, value) in [
            ("segment_length", self.segment_length),
            ("damaged_length", self.damaged_length),
            ("damaged_width", self.damaged_width),
            ("damaged_area", self.damaged_area),
            ("total_damaged_area", self.total_damaged_area),
        ] {
            validate_non_negative(field, value)?;
        }
        if self.daily_traffic_volume < 0 || self.estimated_repair_time_days < 0 {
            return Err(CoreError::validation(
                "daily_traffic_volume and estimated_repair_time_days must be non-negative",
            ));
        }
        if self.estimated_budget.is_sign_negative() {
            return Err(CoreError::validation("estimated_budget must be non-negative"));
        }
        ROAD_WORKFLOW.check_initial(self.status)
    }
}

impl Lifecycle for RoadReport {
    fn before_create(&mut self, ids: &IdGenerator, now: DateTime<Utc>) -> CoreResult<()> {
        self.header.stamp_create(ids, now)?;
        self.apply_derivations();
        Ok(())
    }

    fn before_update(&mut self, previous: &Self, now: DateTime<Utc>) {
        self.header.stamp_update(&previous.header, now);
        self.status = previous.status;
        self.status_note = previous.status_note.clone();

        let dimensions_changed = self.damaged_length != previous.damaged_length
            || self.damaged_width != previous.damaged_width;
        if dimensions_changed {
            self.damaged_area = self.damaged_length * self.damaged_width;
            let total_was_derived = previous.total_damaged_area == previous.damaged_area;
            if total_was_derived && self.total_damaged_area == previous.total_damaged_area {
                self.total_damaged_area = self.damaged_area;
            }
        }
        self.apply_derivations();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_road() -> RoadReport {
        RoadReport {
            header: ReportHeader::new("Budi").with_location(-7.56, 110.82),
            road_name: "Jl. Slamet Riyadi".to_string(),
            road_type: RoadType::City,
            pavement_type: PavementType::Asphalt,
            segment_length: 250.0,
            damage_type: RoadDamageType::Pothole,
            damage_level: DamageLevel::Severe,
            damaged_length: 12.0,
            damaged_width: 5.0,
            damaged_area: 0.0,
            total_damaged_area: 0.0,
            bridge_name: Some(String::new()),
            bridge_type: None,
            bridge_damage_level: None,
            traffic_condition: TrafficCondition::Closed,
            traffic_impact: TrafficImpact::Blocked,
            daily_traffic_volume: 1200,
            urgency_level: UrgencyLevel::Emergency,
            estimated_budget: Decimal::new(150_000_000, 0),
            estimated_repair_time_days: 14,
            description: None,
            report_datetime: Utc::now(),
            status: ReportStatus::Pending,
            status_note: None,
            photos: Vec::new(),
        }
    }

    #[test]
    fn create_derives_areas() {
        let ids = IdGenerator::new();
        let mut report = sample_road();
        report.before_create(&ids, Utc::now()).unwrap();
        assert_eq!(report.damaged_area, 60.0);
        assert_eq!(report.total_damaged_area, 60.0);
        assert_eq!(report.header.id.len(), 26);
        assert_eq!(report.status, ReportStatus::Pending);
    }

    #[test]
    fn derivations_are_idempotent() {
        let mut report = sample_road();
        report.apply_derivations();
        let once = report.clone();
        report.apply_derivations();
        assert_eq!(report, once);
    }

    #[test]
    fn explicit_areas_are_kept() {
        let mut report = sample_road();
        report.damaged_area = 40.0;
        report.total_damaged_area = 90.0;
        report.apply_derivations();
        assert_eq!(report.damaged_area, 40.0);
        assert_eq!(report.total_damaged_area, 90.0);
    }

    #[test]
    fn total_never_below_base_area() {
        let mut report = sample_road();
        report.total_damaged_area = 10.0;
        report.apply_derivations();
        assert!(report.total_damaged_area >= report.damaged_area);
    }

    #[test]
    fn update_recomputes_when_dimensions_change() {
        let ids = IdGenerator::new();
        let created = Utc::now();
        let mut stored = sample_road();
        stored.before_create(&ids, created).unwrap();
        stored.status = ReportStatus::Verified;

        let mut incoming = stored.clone();
        incoming.header.id = String::new();
        incoming.status = ReportStatus::Pending;
        incoming.damaged_length = 20.0;
        incoming.before_update(&stored, created + chrono::Duration::seconds(5));

        assert_eq!(incoming.header.id, stored.header.id);
        assert_eq!(incoming.status, ReportStatus::Verified);
        assert_eq!(incoming.damaged_area, 100.0);
        assert_eq!(incoming.total_damaged_area, 100.0);
        assert!(incoming.header.created_at <= incoming.header.updated_at);
    }

    #[test]
    fn blank_bridge_name_means_no_bridge() {
        let mut report = sample_road();
        assert!(!report.has_bridge());
        report.bridge_name = Some("Bengawan".into());
        assert!(report.has_bridge());
    }

    #[test]
    fn validation_rejects_half_location_and_foreign_status() {
        let mut report = sample_road();
        report.header.longitude = None;
        assert!(report.validate().is_err());

        let mut report = sample_road();
        report.status = ReportStatus::Resolved;
        assert!(report.validate().is_err());
    }
}
