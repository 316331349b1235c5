//! Monthly rice-field land inventory snapshots per district.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::common::{validate_non_negative, Lifecycle};
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;

/// Areas are in hectares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct RiceField {
    #[serde(default)]
    pub id: String,
    pub district: String,
    pub date: NaiveDate,
    /// Defaults to the year of `date`.
    #[serde(default)]
    pub year: i32,
    #[serde(default)]
    pub irrigated: f64,
    #[serde(default)]
    pub rainfed: f64,
    #[serde(default)]
    pub dryfield: f64,
    #[serde(default)]
    pub shifting: f64,
    #[serde(default)]
    pub unused: f64,
    /// irrigated + rainfed
    #[serde(default)]
    pub total_rice_field: f64,
    /// dryfield + shifting + unused
    #[serde(default)]
    pub total_dry_land: f64,
    #[serde(default)]
    pub grand_total: f64,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: DateTime<Utc>,
}

impl RiceField {
    pub fn new(district: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            id: String::new(),
            district: district.into(),
            date,
            year: 0,
            irrigated: 0.0,
            rainfed: 0.0,
            dryfield: 0.0,
            shifting: 0.0,
            unused: 0.0,
            total_rice_field: 0.0,
            total_dry_land: 0.0,
            grand_total: 0.0,
            created_by: None,
            created_at: DateTime::<Utc>::default(),
            updated_at: DateTime::<Utc>::default(),
        }
    }

    fn components(&self) -> [f64; 5] {
        [self.irrigated, self.rainfed, self.dryfield, self.shifting, self.unused]
    }

    /// Fill the year and any zero total. Idempotent.
    pub fn apply_derivations(&mut self) {
        if self.year == 0 {
            self.year = self.date.year();
        }
        if self.total_rice_field == 0.0 {
            self.total_rice_field = self.irrigated + self.rainfed;
        }
        if self.total_dry_land == 0.0 {
            self.total_dry_land = self.dryfield + self.shifting + self.unused;
        }
        if self.grand_total == 0.0 {
            self.grand_total = self.total_rice_field + self.total_dry_land;
        }
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.district.trim().is_empty() {
            return Err(CoreError::validation("district is required"));
        }
        let names = ["irrigated", "rainfed", "dryfield", "shifting", "unused"];
        for (name, value) in names.iter().zip(self.components()) {
            validate_non_negative(name, value)?;
        }
        for (name, value) in [
            ("total_rice_field", self.total_rice_field),
            ("total_dry_land", self.total_dry_land),
            ("grand_total", self.grand_total),
        ] {
            validate_non_negative(name, value)?;
        }
        Ok(())
    }
}

impl Lifecycle for RiceField {
    fn before_create(&mut self, ids: &IdGenerator, now: DateTime<Utc>) -> CoreResult<()> {
        if self.id.trim().is_empty() {
            self.id = ids.next_id()?;
        }
        self.created_at = now;
        self.updated_at = now;
        self.apply_derivations();
        Ok(())
    }

    fn before_update(&mut self, previous: &Self, now: DateTime<Utc>) {
        self.id = previous.id.clone();
        self.created_at = previous.created_at;
        self.created_by = previous.created_by.clone();
        self.updated_at = now.max(previous.created_at);

        if self.components() != previous.components() {
            self.total_rice_field = 0.0;
            self.total_dry_land = 0.0;
            self.grand_total = 0.0;
        }
        if self.date != previous.date && self.year == previous.year {
            self.year = 0;
        }
        self.apply_derivations();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> RiceField {
        let mut field = RiceField::new("Sukoharjo", NaiveDate::from_ymd_opt(2024, 5, 31).unwrap());
        field.irrigated = 120.0;
        field.rainfed = 30.0;
        field.dryfield = 10.0;
        field.shifting = 2.0;
        field.unused = 3.0;
        field
    }

    #[test]
    fn totals_and_year_are_backfilled() {
        let mut field = snapshot();
        field.apply_derivations();
        assert_eq!(field.year, 2024);
        assert_eq!(field.total_rice_field, 150.0);
        assert_eq!(field.total_dry_land, 15.0);
        assert_eq!(field.grand_total, 165.0);

        let once = field.clone();
        field.apply_derivations();
        assert_eq!(field, once);
    }

    #[test]
    fn explicit_totals_are_kept() {
        let mut field = snapshot();
        field.total_rice_field = 155.0;
        field.apply_derivations();
        assert_eq!(field.total_rice_field, 155.0);
        assert_eq!(field.grand_total, 170.0);
    }

    #[test]
    fn changed_component_recomputes_totals_on_update() {
        let ids = IdGenerator::new();
        let mut stored = snapshot();
        stored.before_create(&ids, Utc::now()).unwrap();

        let mut incoming = stored.clone();
        incoming.irrigated = 100.0;
        incoming.before_update(&stored, Utc::now());
        assert_eq!(incoming.total_rice_field, 130.0);
        assert_eq!(incoming.grand_total, 145.0);
        assert_eq!(incoming.id, stored.id);
    }
}
