//! Builders shared by the store-backed tests.

#![allow(dead_code)]

use std::sync::Arc;

use building_report_backend::analytics::ProductivityTable;
use building_report_backend::config::Settings;
use building_report_backend::domain::agriculture::{AgricultureReport, CommodityBlock};
use building_report_backend::domain::common::ReportHeader;
use building_report_backend::domain::enums::{
    AreaCategory, DamageLevel, EnvironmentalImpact, InstitutionUnit, IrrigationType, PavementType,
    RoadDamageType, RoadType, SpatialInstitution, TrafficCondition, TrafficImpact, UrgencyCategory,
    UrgencyLevel, ViolationLevel, ViolationType, WaterDamageType,
};
use building_report_backend::domain::status::ReportStatus;
use building_report_backend::domain::{RoadReport, SpatialReport, WaterReport};
use building_report_backend::ids::IdGenerator;
use building_report_backend::repositories::{
    AgricultureRepository, RoadRepository, SpatialRepository, WaterRepository,
};
use chrono::{NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

pub fn settings() -> Settings {
    Settings::from_source(|key| match key {
        "DATABASE_URL" => Some("postgres://localhost/reports_test".to_string()),
        "BCRYPT_COST" => Some("4".to_string()),
        _ => None,
    })
    .unwrap()
}

pub fn ids() -> Arc<IdGenerator> {
    Arc::new(IdGenerator::new())
}

pub fn road_repo(pool: &PgPool) -> RoadRepository {
    RoadRepository::new(pool.clone(), ids())
}

pub fn water_repo(pool: &PgPool) -> WaterRepository {
    WaterRepository::new(pool.clone(), ids())
}

pub fn spatial_repo(pool: &PgPool) -> SpatialRepository {
    SpatialRepository::new(pool.clone(), ids())
}

pub fn agriculture_repo(pool: &PgPool) -> AgricultureRepository {
    AgricultureRepository::new(pool.clone(), ids(), Arc::new(ProductivityTable::default()))
}

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn road(
    urgency: UrgencyLevel,
    damage: DamageLevel,
    impact: TrafficImpact,
    length: f64,
    width: f64,
) -> RoadReport {
    RoadReport {
        header: ReportHeader::new("Budi Santoso").with_location(-7.56, 110.82),
        road_name: "Jalan Slamet Riyadi".to_string(),
        road_type: RoadType::Regency,
        pavement_type: PavementType::Asphalt,
        segment_length: 100.0,
        damage_type: RoadDamageType::Pothole,
        damage_level: damage,
        damaged_length: length,
        damaged_width: width,
        damaged_area: 0.0,
        total_damaged_area: 0.0,
        bridge_name: None,
        bridge_type: None,
        bridge_damage_level: None,
        traffic_condition: TrafficCondition::Normal,
        traffic_impact: impact,
        daily_traffic_volume: 1200,
        urgency_level: urgency,
        estimated_budget: Decimal::new(15_000_000, 0),
        estimated_repair_time_days: 14,
        description: None,
        report_datetime: Utc.with_ymd_and_hms(2024, 3, 10, 8, 0, 0).unwrap(),
        status: ReportStatus::Pending,
        status_note: None,
        photos: Vec::new(),
    }
}

pub fn water(
    urgency: UrgencyCategory,
    damage: DamageLevel,
    rice_field_ha: f64,
    farmers: i32,
) -> WaterReport {
    WaterReport {
        header: ReportHeader::new("Siti Aminah").with_location(-7.70, 110.60),
        irrigation_area: "DI Colo".to_string(),
        institution_unit: InstitutionUnit::UptPsda,
        irrigation_type: IrrigationType::SecondaryChannel,
        damage_type: WaterDamageType::Sedimentation,
        damage_level: damage,
        urgency_category: urgency,
        estimated_length: 20.0,
        estimated_width: 2.0,
        damage_area: 0.0,
        estimated_volume: 0.0,
        affected_rice_field_area_ha: rice_field_ha,
        affected_farmers_count: farmers,
        estimated_budget: Decimal::ZERO,
        description: None,
        report_datetime: Utc.with_ymd_and_hms(2024, 5, 2, 9, 30, 0).unwrap(),
        status: ReportStatus::Pending,
        status_note: None,
        photos: Vec::new(),
    }
}

pub fn spatial(level: ViolationLevel, violation_type: ViolationType) -> SpatialReport {
    SpatialReport {
        header: ReportHeader::new("Rina Wulandari").with_location(-7.55, 110.75),
        institution: SpatialInstitution::DinasTataRuang,
        area_category: AreaCategory::RiverBorder,
        violation_type,
        violation_level: level,
        environmental_impact: EnvironmentalImpact::Medium,
        urgency_level: UrgencyLevel::High,
        location_description: Some("Bantaran Bengawan Solo".to_string()),
        description: None,
        report_datetime: Utc.with_ymd_and_hms(2024, 4, 15, 10, 0, 0).unwrap(),
        status: ReportStatus::Pending,
        status_note: None,
        photos: Vec::new(),
    }
}

pub fn visit(visit_date: NaiveDate) -> AgricultureReport {
    AgricultureReport {
        header: ReportHeader::new("Penyuluh Lapangan"),
        visit_date,
        farmer_name: "Pak Harjo".to_string(),
        farmer_group: Some("Tani Makmur".to_string()),
        farmer_group_type: None,
        extension_officer: "Dwi Lestari".to_string(),
        food: None,
        horti: None,
        plantation: None,
        commodity_type: None,
        has_pest_attack: false,
        pest_type: None,
        affected_area_level: None,
        weather: None,
        main_constraint: None,
        farmer_hope: None,
        training_needed: None,
        urgent_needs: None,
        water_access: None,
        notes: None,
        photos: Vec::new(),
    }
}

pub fn block(commodity: &str, land_area: f64) -> Option<CommodityBlock> {
    Some(CommodityBlock::new(commodity, land_area))
}
