//! Group-by aggregations with NULL/empty label normalisation.

use std::collections::BTreeMap;

use sqlx::{PgPool, Postgres};

use crate::analytics::{shares, with_percentages};
use crate::domain::dashboard::{GroupBreakdown, GroupCount, EMPTY, NOT_SET};
use crate::error::{CoreError, CoreResult};
use crate::repositories::filter::{BindValues, SqlFilter};

/// Categorical label of `column`: NULL becomes `NOT_SET`, `''` becomes `EMPTY`.
pub fn label_expr(column: &str) -> String {
    format!(
        "(CASE WHEN {column} IS NULL THEN '{NOT_SET}' \
         WHEN {column}::text = '' THEN '{EMPTY}' ELSE {column}::text END)"
    )
}

/// Map a caller-facing dimension name to its column via an allow-list.
pub fn resolve_dimension(
    dimensions: &[(&'static str, &'static str)],
    key: &str,
) -> CoreResult<&'static str> {
    dimensions
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, column)| *column)
        .ok_or_else(|| CoreError::validation(format!("unknown dimension '{key}'")))
}

/// `(label, count)` per value of `column`, largest group first. Percentages
/// use the whole matching population, NULLs included.
pub async fn group_counts(
    pool: &PgPool,
    table: &str,
    column: &str,
    filter: &SqlFilter,
) -> CoreResult<Vec<GroupCount>> {
    let sql = format!(
        "SELECT {label} AS label, COUNT(*)::BIGINT AS count FROM {table} {where_clause} \
         GROUP BY 1 ORDER BY count DESC, label ASC",
        label = label_expr(column),
        where_clause = filter.where_clause(),
    );
    let rows = sqlx::query_as::<Postgres, (String, i64)>(&sql)
        .bind_values(filter.binds())
        .fetch_all(pool)
        .await?;
    Ok(with_percentages(rows))
}

/// Counts by `group_column`, each with sub-counts by `sub_column`.
pub async fn group_breakdown(
    pool: &PgPool,
    table: &str,
    group_column: &str,
    sub_column: &str,
    filter: &SqlFilter,
) -> CoreResult<Vec<GroupBreakdown>> {
    let sql = format!(
        "SELECT {group} AS label, {sub} AS sub_label, COUNT(*)::BIGINT AS count \
         FROM {table} {where_clause} GROUP BY 1, 2",
        group = label_expr(group_column),
        sub = label_expr(sub_column),
        where_clause = filter.where_clause(),
    );
    let rows = sqlx::query_as::<Postgres, (String, String, i64)>(&sql)
        .bind_values(filter.binds())
        .fetch_all(pool)
        .await?;
    Ok(assemble_breakdown(rows))
}

/// Fold `(group, sub, count)` rows into breakdowns ordered by count desc then
/// label. Sub-count percentages are relative to their group.
pub fn assemble_breakdown(rows: Vec<(String, String, i64)>) -> Vec<GroupBreakdown> {
    let mut grouped: BTreeMap<String, Vec<(String, i64)>> = BTreeMap::new();
    for (label, sub_label, count) in rows {
        grouped.entry(label).or_default().push((sub_label, count));
    }
    let totals: Vec<f64> = grouped
        .values()
        .map(|subs| subs.iter().map(|(_, c)| *c as f64).sum())
        .collect();
    let group_shares = shares(&totals);

    let mut breakdowns: Vec<GroupBreakdown> = grouped
        .into_iter()
        .zip(group_shares)
        .map(|((label, mut subs), percentage)| {
            subs.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            let count: i64 = subs.iter().map(|(_, c)| c).sum();
            GroupBreakdown {
                label,
                count,
                percentage,
                sub_counts: with_percentages(subs),
            }
        })
        .collect();
    breakdowns.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    breakdowns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_expression_covers_null_and_empty() {
        let expr = label_expr("district");
        assert!(expr.contains("district IS NULL THEN 'NOT_SET'"));
        assert!(expr.contains("district::text = '' THEN 'EMPTY'"));
    }

    #[test]
    fn dimensions_are_allow_listed() {
        let dims = [("status", "status"), ("district", "district")];
        assert_eq!(resolve_dimension(&dims, "district").unwrap(), "district");
        assert!(resolve_dimension(&dims, "password_hash").is_err());
    }

    #[test]
    fn breakdown_orders_and_sums() {
        let rows = vec![
            ("Jebres".to_string(), "SEVERE".to_string(), 2),
            ("Laweyan".to_string(), "MINOR".to_string(), 1),
            ("Jebres".to_string(), "MINOR".to_string(), 3),
            ("NOT_SET".to_string(), "SEVERE".to_string(), 1),
        ];
        let groups = assemble_breakdown(rows);
        assert_eq!(groups[0].label, "Jebres");
        assert_eq!(groups[0].count, 5);
        assert_eq!(groups[0].sub_counts[0].label, "MINOR");
        assert_eq!(groups[0].sub_counts[0].percentage, 60.0);
        let sum: f64 = groups.iter().map(|g| g.percentage).sum();
        assert!((sum - 100.0).abs() <= 0.05);
        assert_eq!(groups[1].label, "Laweyan");
    }
}
