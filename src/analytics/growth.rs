//! Year-over-year growth rule.

use serde::{Deserialize, Serialize};

/// Growth of `current` over `previous` in percent.
///
/// `(current - previous) / previous * 100` when `previous > 0`; `100` when the
/// previous period was empty and the current one is not; `0` otherwise.
pub fn growth_pct(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        (current - previous) / previous * 100.0
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// A metric value paired with the same metric one year earlier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Growth {
    pub current: f64,
    pub previous: f64,
    pub growth_pct: f64,
}

impl Growth {
    pub fn new(current: f64, previous: f64) -> Self {
        Self {
            current,
            previous,
            growth_pct: growth_pct(current, previous),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_over_positive_previous() {
        assert_eq!(growth_pct(150.0, 100.0), 50.0);
        assert_eq!(growth_pct(50.0, 100.0), -50.0);
        assert_eq!(growth_pct(100.0, 100.0), 0.0);
    }

    #[test]
    fn empty_previous_period() {
        assert_eq!(growth_pct(3.0, 0.0), 100.0);
        assert_eq!(growth_pct(0.0, 0.0), 0.0);
    }

    #[test]
    fn growth_struct_uses_same_rule() {
        let g = Growth::new(12.0, 8.0);
        assert_eq!(g.growth_pct, 50.0);
        assert_eq!(Growth::new(0.0, 0.0).growth_pct, 0.0);
    }
}
