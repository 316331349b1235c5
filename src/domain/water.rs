//! Irrigation and water-resource damage reports.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::common::{validate_non_negative, Lifecycle, ReportHeader, ReportPhoto};
use crate::domain::enums::{
    DamageLevel, InstitutionUnit, IrrigationType, UrgencyCategory, WaterDamageType,
};
use crate::domain::status::{ReportStatus, Workflow};
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;

pub const WATER_WORKFLOW: Workflow = Workflow::Standard;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WaterReport {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub header: ReportHeader,
    pub irrigation_area: String,
    pub institution_unit: InstitutionUnit,
    pub irrigation_type: IrrigationType,
    pub damage_type: WaterDamageType,
    pub damage_level: DamageLevel,
    pub urgency_category: UrgencyCategory,
    #[serde(default)]
    pub estimated_length: f64,
    #[serde(default)]
    pub estimated_width: f64,
    #[serde(default)]
    pub damage_area: f64,
    #[serde(default)]
    pub estimated_volume: f64,
    #[serde(default)]
    pub affected_rice_field_area_ha: f64,
    #[serde(default)]
    pub affected_farmers_count: i32,
    #[serde(default)]
    pub estimated_budget: Decimal,
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

impl WaterReport {
    /// `damage_area` always tracks length × width.
    pub fn apply_derivations(&mut self) {
        self.damage_area = self.estimated_length * self.estimated_width;
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.header.validate()?;
        if self.irrigation_area.trim().is_empty() {
            return Err(CoreError::validation("irrigation_area is required"));
        }
        for (field, value) in [
            ("estimated_length", self.estimated_length),
            ("estimated_width", self.estimated_width),
            ("estimated_volume", self.estimated_volume),
            ("affected_rice_field_area_ha", self.affected_rice_field_area_ha),
        ] {
            validate_non_negative(field, value)?;
        }
        if self.affected_farmers_count < 0 {
            return Err(CoreError::validation("affected_farmers_count must be non-negative"));
        }
        if self.estimated_budget.is_sign_negative() {
            return Err(CoreError::validation("estimated_budget must be non-negative"));
        }
        WATER_WORKFLOW.check_initial(self.status)
    }
}

impl Lifecycle for WaterReport {
    fn before_create(&mut self, ids: &IdGenerator, now: DateTime<Utc>) -> CoreResult<()> {
        self.header.stamp_create(ids, now)?;
        self.apply_derivations();
        Ok(())
    }

    fn before_update(&mut self, previous: &Self, now: DateTime<Utc>) {
        self.header.stamp_update(&previous.header, now);
        self.status = previous.status;
        self.status_note = previous.status_note.clone();
        self.apply_derivations();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_water() -> WaterReport {
        WaterReport {
            header: ReportHeader::new("Wati").with_location(-7.7, 110.6),
            irrigation_area: "D.I. Colo Barat".to_string(),
            institution_unit: InstitutionUnit::UptPsda,
            irrigation_type: IrrigationType::SecondaryChannel,
            damage_type: WaterDamageType::Collapse,
            damage_level: DamageLevel::Severe,
            urgency_category: UrgencyCategory::Urgent,
            estimated_length: 8.0,
            estimated_width: 1.5,
            damage_area: 0.0,
            estimated_volume: 6.0,
            affected_rice_field_area_ha: 15.0,
            affected_farmers_count: 100,
            estimated_budget: Decimal::new(75_000_000, 0),
            description: None,
            report_datetime: Utc::now(),
            status: ReportStatus::Pending,
            status_note: None,
            photos: Vec::new(),
        }
    }

    #[test]
    fn damage_area_is_length_times_width() {
        let ids = IdGenerator::new();
        let mut report = sample_water();
        report.before_create(&ids, Utc::now()).unwrap();
        assert_eq!(report.damage_area, 12.0);

        let once = report.clone();
        report.apply_derivations();
        assert_eq!(report, once);
    }

    #[test]
    fn update_keeps_status_and_recomputes() {
        let ids = IdGenerator::new();
        let mut stored = sample_water();
        stored.before_create(&ids, Utc::now()).unwrap();
        stored.status = ReportStatus::InProgress;

        let mut incoming = stored.clone();
        incoming.status = ReportStatus::Pending;
        incoming.estimated_width = 2.0;
        incoming.before_update(&stored, Utc::now());
        assert_eq!(incoming.status, ReportStatus::InProgress);
        assert_eq!(incoming.damage_area, 16.0);
    }

    #[test]
    fn negative_farmers_rejected() {
        let mut report = sample_water();
        report.affected_farmers_count = -1;
        assert!(report.validate().is_err());
    }
}
