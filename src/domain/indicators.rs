//! Executive indicator reference series.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::domain::enums::{token_enum, TokenError};

token_enum! {
    IndicatorKind {
        Economy => "ECONOMY",
        Demography => "DEMOGRAPHY",
        Social => "SOCIAL",
        Labor => "LABOR",
        Education => "EDUCATION",
    }
}

impl IndicatorKind {
    /// Backing table. A fixed identifier, never user input.
    pub fn table(self) -> &'static str {
        match self {
            Self::Economy => "economy_indicators",
            Self::Demography => "demography_indicators",
            Self::Social => "social_indicators",
            Self::Labor => "labor_indicators",
            Self::Education => "education_indicators",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct IndicatorValue {
    pub id: i64,
    pub indicator_name: String,
    pub year: i32,
    pub value: f64,
    pub unit: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Latest year's values of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub kind: IndicatorKind,
    pub year: Option<i32>,
    pub values: Vec<IndicatorValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_its_own_table() {
        let mut tables: Vec<_> = IndicatorKind::ALL.iter().map(|k| k.table()).collect();
        tables.sort_unstable();
        tables.dedup();
        assert_eq!(tables.len(), IndicatorKind::ALL.len());
        assert!("HEALTH".parse::<IndicatorKind>().is_err());
    }
}
