use crate::domain::dashboard::GroupCount;

/// Round to two decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// `count * 100 / total` rounded to two decimals; zero when `total` is zero.
pub fn percentage(count: i64, total: i64) -> f64 {
    if total <= 0 {
        return 0.0;
    }
    round2(count as f64 * 100.0 / total as f64)
}

/// Percentage shares of `weights` to two decimals, adjusted by largest
/// remainder so a non-empty total always sums to exactly 100.00.
///
/// Ties in the remainder go to the earlier entry. An all-zero input yields
/// all zeros.
pub fn shares(weights: &[f64]) -> Vec<f64> {
    let total: f64 = weights.iter().filter(|w| **w > 0.0).sum();
    if total <= 0.0 {
        return vec![0.0; weights.len()];
    }

    // Work in hundredths of a percent.
    let exact: Vec<f64> = weights
        .iter()
        .map(|w| w.max(0.0) * 10_000.0 / total)
        .collect();
    let mut units: Vec<i64> = exact.iter().map(|e| e.floor() as i64).collect();
    let missing = 10_000 - units.iter().sum::<i64>();

    let mut order: Vec<usize> = (0..exact.len()).collect();
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });
    for &idx in order.iter().take(missing.max(0) as usize) {
        units[idx] += 1;
    }

    units.into_iter().map(|u| u as f64 / 100.0).collect()
}

/// Turn `(label, count)` rows into [`GroupCount`]s whose percentage uses the
/// sum over all rows as denominator. Row order is preserved.
pub fn with_percentages(rows: Vec<(String, i64)>) -> Vec<GroupCount> {
    let counts: Vec<f64> = rows.iter().map(|(_, count)| *count as f64).collect();
    rows.into_iter()
        .zip(shares(&counts))
        .map(|((label, count), percentage)| GroupCount {
            percentage,
            label,
            count,
        })
        .collect()
}
