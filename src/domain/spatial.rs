//! Spatial-planning violation reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::common::{Lifecycle, ReportHeader, ReportPhoto};
use crate::domain::enums::{
    AreaCategory, EnvironmentalImpact, SpatialInstitution, UrgencyLevel, ViolationLevel,
    ViolationType,
};
use crate::domain::status::{ReportStatus, Workflow};
use crate::error::CoreResult;
use crate::ids::IdGenerator;

pub const SPATIAL_WORKFLOW: Workflow = Workflow::Spatial;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SpatialReport {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub header: ReportHeader,
    pub institution: SpatialInstitution,
    pub area_category: AreaCategory,
    pub violation_type: ViolationType,
    pub violation_level: ViolationLevel,
    pub environmental_impact: EnvironmentalImpact,
    pub urgency_level: UrgencyLevel,
    #[serde(default)]
    pub location_description: Option<String>,
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

/// Display-only size estimate of a violation, in metres and square metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViolationEstimate {
    pub length_m: f64,
    pub area_m2: f64,
}

/// Fixed estimate table. Not a measurement: dashboards use it to size map
/// markers when no survey exists.
pub fn estimate_violation(
    level: ViolationLevel,
    violation_type: ViolationType,
) -> ViolationEstimate {
    let (length_m, area_m2) = match level {
        ViolationLevel::Light => (50.0, 500.0),
        ViolationLevel::Moderate => (150.0, 2_000.0),
        ViolationLevel::Heavy => (400.0, 7_500.0),
    };
    let area_factor = match violation_type {
        ViolationType::LandUseChange | ViolationType::GreenSpaceConversion => 2.0,
        _ => 1.0,
    };
    ViolationEstimate {
        length_m,
        area_m2: area_m2 * area_factor,
    }
}

impl SpatialReport {
    pub fn estimate(&self) -> ViolationEstimate {
        estimate_violation(self.violation_level, self.violation_type)
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.header.validate()?;
        SPATIAL_WORKFLOW.check_initial(self.status)
    }
}

impl Lifecycle for SpatialReport {
    fn before_create(&mut self, ids: &IdGenerator, now: DateTime<Utc>) -> CoreResult<()> {
        self.header.stamp_create(ids, now)
    }

    fn before_update(&mut self, previous: &Self, now: DateTime<Utc>) {
        self.header.stamp_update(&previous.header, now);
        self.status = previous.status;
        self.status_note = previous.status_note.clone();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_spatial() -> SpatialReport {
        SpatialReport {
            header: ReportHeader::new("Rina").with_location(-7.55, 110.75),
            institution: SpatialInstitution::DinasTataRuang,
            area_category: AreaCategory::RiverBorder,
            violation_type: ViolationType::BorderEncroachment,
            violation_level: ViolationLevel::Moderate,
            environmental_impact: EnvironmentalImpact::High,
            urgency_level: UrgencyLevel::High,
            location_description: Some("Bantaran sungai".into()),
            description: None,
            report_datetime: Utc::now(),
            status: ReportStatus::Pending,
            status_note: None,
            photos: Vec::new(),
        }
    }

    #[test]
    fn estimate_table() {
        assert_eq!(
            estimate_violation(ViolationLevel::Light, ViolationType::ZoningViolation),
            ViolationEstimate { length_m: 50.0, area_m2: 500.0 }
        );
        assert_eq!(
            estimate_violation(ViolationLevel::Heavy, ViolationType::LandUseChange).area_m2,
            15_000.0
        );
    }

    #[test]
    fn standard_only_status_is_rejected() {
        let mut report = sample_spatial();
        assert!(report.validate().is_ok());
        report.status = ReportStatus::Verified;
        assert!(report.validate().is_err());
    }
}
