//! Agricultural extension visit reports.
//!
//! A visit can describe up to three commodity blocks (food crops,
//! horticulture, plantation). They are stored as parallel column groups and
//! fanned out again by the dashboard queries.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::common::{validate_non_negative, Lifecycle, ReportHeader, ReportPhoto};
use crate::domain::enums::{
    AffectedAreaLevel, CommodityType, FarmerGroupType, FarmerHope, GrowthPhase, LandStatus,
    MainConstraint, PestType, TrainingNeed, UrgentNeed, WaterAccess, Weather,
};
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommodityBlock {
    pub commodity: String,
    #[serde(default)]
    pub land_status: Option<LandStatus>,
    #[serde(default)]
    pub land_area: Option<f64>,
    #[serde(default)]
    pub growth_phase: Option<GrowthPhase>,
    #[serde(default)]
    pub plant_age_days: Option<i32>,
    #[serde(default)]
    pub planting_date: Option<NaiveDate>,
    #[serde(default)]
    pub harvest_date: Option<NaiveDate>,
}

impl CommodityBlock {
    pub fn new(commodity: impl Into<String>, land_area: f64) -> Self {
        Self {
            commodity: commodity.into(),
            land_area: Some(land_area),
            ..Default::default()
        }
    }

    pub fn is_populated(&self) -> bool {
        !self.commodity.trim().is_empty()
    }

    fn validate(&self, block: CommodityType) -> CoreResult<()> {
        if let Some(area) = self.land_area {
            validate_non_negative(&format!("{block} land_area"), area)?;
        }
        if self.plant_age_days.is_some_and(|age| age < 0) {
            return Err(CoreError::validation(format!(
                "{block} plant_age_days must be non-negative"
            )));
        }
        if let (Some(planted), Some(harvest)) = (self.planting_date, self.harvest_date) {
            if harvest < planted {
                return Err(CoreError::validation(format!(
                    "{block} harvest_date is before planting_date"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgricultureReport {
    #[serde(flatten)]
    pub header: ReportHeader,
    pub visit_date: NaiveDate,
    pub farmer_name: String,
    #[serde(default)]
    pub farmer_group: Option<String>,
    #[serde(default)]
    pub farmer_group_type: Option<FarmerGroupType>,
    pub extension_officer: String,
    #[serde(default)]
    pub food: Option<CommodityBlock>,
    #[serde(default)]
    pub horti: Option<CommodityBlock>,
    #[serde(default)]
    pub plantation: Option<CommodityBlock>,
    /// Derived: type of the first populated block.
    #[serde(default)]
    pub commodity_type: Option<CommodityType>,
    #[serde(default)]
    pub has_pest_attack: bool,
    #[serde(default)]
    pub pest_type: Option<PestType>,
    #[serde(default)]
    pub affected_area_level: Option<AffectedAreaLevel>,
    #[serde(default)]
    pub weather: Option<Weather>,
    #[serde(default)]
    pub main_constraint: Option<MainConstraint>,
    #[serde(default)]
    pub farmer_hope: Option<FarmerHope>,
    #[serde(default)]
    pub training_needed: Option<TrainingNeed>,
    #[serde(default)]
    pub urgent_needs: Option<UrgentNeed>,
    #[serde(default)]
    pub water_access: Option<WaterAccess>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub photos: Vec<ReportPhoto>,
}

impl AgricultureReport {
    /// The three blocks in fan-out order, populated or not.
    pub fn blocks(&self) -> [(CommodityType, Option<&CommodityBlock>); 3] {
        [
            (CommodityType::Pangan, self.food.as_ref()),
            (CommodityType::Hortikultura, self.horti.as_ref()),
            (CommodityType::Perkebunan, self.plantation.as_ref()),
        ]
    }

    pub fn populated_blocks(&self) -> impl Iterator<Item = (CommodityType, &CommodityBlock)> {
        self.blocks()
            .into_iter()
            .filter_map(|(kind, block)| block.filter(|b| b.is_populated()).map(|b| (kind, b)))
    }

    /// Sum of the three block areas, missing areas counted as zero.
    pub fn combined_land_area(&self) -> f64 {
        self.blocks()
            .iter()
            .filter_map(|(_, block)| block.and_then(|b| b.land_area))
            .sum()
    }

    /// Idempotent: drop blank blocks, derive `commodity_type` and the pest flag.
    pub fn apply_derivations(&mut self) {
        for block in [&mut self.food, &mut self.horti, &mut self.plantation] {
            if block.as_ref().is_some_and(|b| !b.is_populated()) {
                *block = None;
            }
            if let Some(b) = block {
                b.commodity = b.commodity.trim().to_string();
            }
        }
        let leading = self.populated_blocks().next().map(|(kind, _)| kind);
        self.commodity_type = leading;
        if self.pest_type.is_some() {
            self.has_pest_attack = true;
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        self.header.validate()?;
        if self.farmer_name.trim().is_empty() {
            return Err(CoreError::validation("farmer_name is required"));
        }
        if self.extension_officer.trim().is_empty() {
            return Err(CoreError::validation("extension_officer is required"));
        }
        if self.populated_blocks().next().is_none() {
            return Err(CoreError::validation(
                "at least one commodity block (food, horti, plantation) is required",
            ));
        }
        for (kind, block) in self.blocks() {
            if let Some(block) = block {
                block.validate(kind)?;
            }
        }
        Ok(())
    }
}

impl Lifecycle for AgricultureReport {
    fn before_create(&mut self, ids: &IdGenerator, now: DateTime<Utc>) -> CoreResult<()> {
        self.header.stamp_create(ids, now)?;
        self.apply_derivations();
        Ok(())
    }

    fn before_update(&mut self, previous: &Self, now: DateTime<Utc>) {
        self.header.stamp_update(&previous.header, now);
        self.apply_derivations();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_visit() -> AgricultureReport {
        AgricultureReport {
            header: ReportHeader::new("Penyuluh Andi").with_location(-7.6, 110.9),
            visit_date: NaiveDate::from_ymd_opt(2024, 3, 12).unwrap(),
            farmer_name: "Pak Darto".to_string(),
            farmer_group: Some("Tani Makmur".to_string()),
            farmer_group_type: Some(FarmerGroupType::Poktan),
            extension_officer: "Andi".to_string(),
            food: None,
            horti: None,
            plantation: None,
            commodity_type: None,
            has_pest_attack: false,
            pest_type: None,
            affected_area_level: None,
            weather: Some(Weather::Sunny),
            main_constraint: Some(MainConstraint::WaterShortage),
            farmer_hope: Some(FarmerHope::IrrigationRepair),
            training_needed: None,
            urgent_needs: None,
            water_access: Some(WaterAccess::Limited),
            notes: None,
            photos: Vec::new(),
        }
    }

    #[test]
    fn commodity_type_is_first_populated_block() {
        let mut visit = sample_visit();
        visit.food = Some(CommodityBlock::new("  ", 1.0));
        visit.horti = Some(CommodityBlock::new("CABAI", 0.5));
        visit.plantation = Some(CommodityBlock::new("KOPI", 3.5));
        visit.apply_derivations();
        assert_eq!(visit.commodity_type, Some(CommodityType::Hortikultura));
        assert!(visit.food.is_none());
    }

    #[test]
    fn combined_area_coalesces_missing() {
        let mut visit = sample_visit();
        visit.food = Some(CommodityBlock::new("PADI", 2.5));
        visit.horti = Some(CommodityBlock {
            commodity: "TOMAT".into(),
            land_area: None,
            ..Default::default()
        });
        visit.plantation = Some(CommodityBlock::new("KAKAO", 3.5));
        assert_eq!(visit.combined_land_area(), 6.0);
    }

    #[test]
    fn visit_without_commodity_is_rejected() {
        let visit = sample_visit();
        assert!(visit.validate().is_err());
    }

    #[test]
    fn pest_type_implies_flag() {
        let mut visit = sample_visit();
        visit.food = Some(CommodityBlock::new("PADI", 1.0));
        visit.pest_type = Some(PestType::Planthopper);
        visit.apply_derivations();
        assert!(visit.has_pest_attack);
        let once = visit.clone();
        visit.apply_derivations();
        assert_eq!(visit, once);
    }

    #[test]
    fn harvest_before_planting_is_rejected() {
        let mut visit = sample_visit();
        visit.food = Some(CommodityBlock {
            commodity: "PADI".into(),
            planting_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            harvest_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        });
        assert!(visit.validate().is_err());
    }
}
