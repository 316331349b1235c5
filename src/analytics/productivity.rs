//! Estimated productivity per commodity, in tonnes per hectare.
//!
//! A commodity is matched by the first table entry whose key occurs in the
//! commodity's trimmed upper-case name, so "PADI SAWAH" and "Padi gogo" both
//! resolve to PADI. Unmatched commodities use the default rate.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

const CURRENT_RATES: &[(&str, f64)] = &[
    ("PADI", 5.2),
    ("JAGUNG", 4.8),
    ("KEDELAI", 1.5),
    ("CABAI", 8.0),
    ("TOMAT", 12.0),
    ("KOPI", 0.8),
    ("KAKAO", 0.6),
];
const CURRENT_DEFAULT: f64 = 3.0;

const PREVIOUS_RATES: &[(&str, f64)] = &[
    ("PADI", 5.0),
    ("JAGUNG", 4.6),
    ("KEDELAI", 1.45),
    ("CABAI", 7.7),
    ("TOMAT", 11.6),
    ("KOPI", 0.78),
    ("KAKAO", 0.58),
];
const PREVIOUS_DEFAULT: f64 = 2.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductivityYear {
    Current,
    Previous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductivityTable {
    pub current: Vec<(String, f64)>,
    pub current_default: f64,
    pub previous: Vec<(String, f64)>,
    pub previous_default: f64,
}

impl Default for ProductivityTable {
    fn default() -> Self {
        let owned = |rates: &[(&str, f64)]| {
            rates
                .iter()
                .map(|(name, rate)| (name.to_string(), *rate))
                .collect()
        };
        Self {
            current: owned(CURRENT_RATES),
            current_default: CURRENT_DEFAULT,
            previous: owned(PREVIOUS_RATES),
            previous_default: PREVIOUS_DEFAULT,
        }
    }
}

impl ProductivityTable {
    pub fn rate(&self, commodity: &str, year: ProductivityYear) -> f64 {
        let (rates, default) = match year {
            ProductivityYear::Current => (&self.current, self.current_default),
            ProductivityYear::Previous => (&self.previous, self.previous_default),
        };
        let normalized = commodity.trim().to_uppercase();
        rates
            .iter()
            .find(|(key, _)| normalized.contains(key.as_str()))
            .map(|(_, rate)| *rate)
            .unwrap_or(default)
    }

    pub fn rate_current(&self, commodity: &str) -> f64 {
        self.rate(commodity, ProductivityYear::Current)
    }

    pub fn rate_previous(&self, commodity: &str) -> f64 {
        self.rate(commodity, ProductivityYear::Previous)
    }

    /// Estimated production in tonnes for `land_area` hectares.
    pub fn estimate(&self, commodity: &str, land_area: f64, year: ProductivityYear) -> f64 {
        land_area * self.rate(commodity, year)
    }

    pub fn override_current(&mut self, raw: &str) -> CoreResult<()> {
        merge_overrides(&mut self.current, raw)
    }

    pub fn override_previous(&mut self, raw: &str) -> CoreResult<()> {
        merge_overrides(&mut self.previous, raw)
    }
}

/// Merge `NAME=rate;NAME=rate` entries into `rates`. Existing names are
/// replaced in place; new names are appended after the built-in entries.
fn merge_overrides(rates: &mut Vec<(String, f64)>, raw: &str) -> CoreResult<()> {
    for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, rate) = entry
            .split_once('=')
            .ok_or_else(|| {
                CoreError::validation(format!("productivity entry '{entry}' has no '='"))
            })?;
        let name = name.trim().to_uppercase();
        if name.is_empty() {
            return Err(CoreError::validation(format!(
                "productivity entry '{entry}' has no commodity name"
            )));
        }
        let rate: f64 = rate
            .trim()
            .parse()
            .map_err(|_| {
                CoreError::validation(format!("productivity rate in '{entry}' is not a number"))
            })?;
        if !rate.is_finite() || rate < 0.0 {
            return Err(CoreError::validation(format!(
                "productivity rate in '{entry}' must be non-negative"
            )));
        }
        match rates.iter_mut().find(|(key, _)| *key == name) {
            Some(existing) => existing.1 = rate,
            None => rates.push((name, rate)),
        }
    }
    Ok(())
}
