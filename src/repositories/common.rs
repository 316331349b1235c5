//! Query patterns shared by the report repositories.

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};
use tracing::{info, instrument};

use crate::analytics::{growth_pct, round2};
use crate::domain::common::{ReportHeader, ReportPhoto};
use crate::domain::dashboard::{MapPoint, Metrics, YearValue};
use crate::domain::status::{ReportStatus, TransitionCheck, Workflow, TERMINAL_STATUSES};
use crate::error::{CoreError, CoreResult};
use crate::pagination::Window;
use crate::repositories::filter::{BindValue, BindValues, SqlFilter};
use crate::repositories::photos::PhotoTable;

/// Calendar year of a report timestamp, through alias `t`.
pub const REPORT_YEAR: &str = "EXTRACT(YEAR FROM t.report_datetime AT TIME ZONE 'UTC')::INT";

/// Calendar date of a report timestamp; the column date ranges apply to.
pub const REPORT_DATE: &str = "(report_datetime AT TIME ZONE 'UTC')::date";

/// `INSERT` of every column in `columns`, bound `$1..$n` in list order.
pub fn insert_sql(table: &str, columns: &str) -> String {
    let count = columns.split(',').count();
    let placeholders: Vec<String> = (1..=count).map(|i| format!("${i}")).collect();
    format!(
        "INSERT INTO {table} ({columns}) VALUES ({}) RETURNING {columns}",
        placeholders.join(", ")
    )
}

/// Overwrite keyed by the leading `id` column, bound in the same order as
/// [`insert_sql`] so one binder serves both.
///
/// `status` and `status_note` are never written here; only
/// [`update_status`] moves them. Their placeholders guard the row instead, so
/// an edit built from a stale read matches nothing once the status moved.
pub fn update_sql(table: &str, columns: &str) -> String {
    let mut targets = Vec::new();
    let mut values = Vec::new();
    let mut guards = vec!["id = $1".to_string()];
    for (idx, column) in columns.split(',').map(str::trim).enumerate().skip(1) {
        let param = idx + 1;
        match column {
            "status" => guards.push(format!("status = ${param}")),
            "status_note" => guards.push(format!("status_note IS NOT DISTINCT FROM ${param}")),
            _ => {
                targets.push(column);
                values.push(format!("${param}"));
            }
        }
    }
    format!(
        "UPDATE {table} SET ({}) = ({}) WHERE {} RETURNING {columns}",
        targets.join(", "),
        values.join(", "),
        guards.join(" AND ")
    )
}

/// Why a guarded edit matched no row: the report is gone, or its status
/// moved after the edit read it.
pub async fn edit_miss(pool: &PgPool, table: &str, id: &str) -> CoreError {
    let sql = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
    match sqlx::query_scalar::<Postgres, bool>(&sql)
        .bind(id)
        .fetch_one(pool)
        .await
    {
        Ok(true) => CoreError::Conflict(format!(
            "report {id} changed status while it was being edited"
        )),
        Ok(false) => CoreError::not_found(format!("report {id}")),
        Err(e) => e.into(),
    }
}

/// `status NOT IN (<terminal tokens>)`, for work queues.
pub fn open_status_condition() -> String {
    let tokens: Vec<String> = TERMINAL_STATUSES.iter().map(|s| format!("'{s}'")).collect();
    format!("status NOT IN ({})", tokens.join(", "))
}

/// Bind the header fields in [`HEADER_COLUMNS`](crate::domain::common::HEADER_COLUMNS) order.
pub fn bind_header<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    header: &'q ReportHeader,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    query
        .bind(&header.id)
        .bind(&header.reporter_name)
        .bind(&header.reporter_phone)
        .bind(header.latitude)
        .bind(header.longitude)
        .bind(&header.address)
        .bind(&header.village)
        .bind(&header.district)
        .bind(&header.regency)
        .bind(&header.created_by)
        .bind(header.created_at)
        .bind(header.updated_at)
}

/// A report that carries its photo collection.
pub trait PhotoOwner {
    fn report_id(&self) -> &str;
    fn set_photos(&mut self, photos: Vec<ReportPhoto>);
}

/// Eager-load photos for a page of reports with one extra query.
pub async fn attach_photos<T: PhotoOwner>(
    pool: &PgPool,
    photos: PhotoTable,
    mut reports: Vec<T>,
) -> CoreResult<Vec<T>> {
    let ids: Vec<String> = reports.iter().map(|r| r.report_id().to_string()).collect();
    let mut by_report = photos.load_many(pool, &ids).await?;
    for report in &mut reports {
        let attached = by_report.remove(report.report_id()).unwrap_or_default();
        report.set_photos(attached);
    }
    Ok(reports)
}

/// Add `{key}_previous` and `{key}_growth_pct` for each of `keys`.
pub fn add_growth(metrics: &mut Metrics, previous: &Metrics, keys: &[&str]) {
    for key in keys {
        let current = metrics.get(*key).copied().unwrap_or(0.0);
        let prev = previous.get(*key).copied().unwrap_or(0.0);
        metrics.insert(format!("{key}_previous"), prev);
        metrics.insert(format!("{key}_growth_pct"), round2(growth_pct(current, prev)));
    }
}

/// Page and total count read from one snapshot.
///
/// Both statements run in a single `REPEATABLE READ READ ONLY` transaction so
/// the total always describes the same rows the page was cut from.
pub async fn fetch_page<T>(
    pool: &PgPool,
    columns: &str,
    from: &str,
    filter: &SqlFilter,
    order: &str,
    window: Window,
) -> CoreResult<(Vec<T>, i64)>
where
    T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
{
    let where_clause = filter.where_clause();
    let count_sql = format!("SELECT COUNT(*)::BIGINT FROM {from} {where_clause}");
    let limit_idx = filter.next_param();
    let page_sql = format!(
        "SELECT {columns} FROM {from} {where_clause} {order} LIMIT ${limit_idx} OFFSET ${}",
        limit_idx + 1
    );

    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
        .execute(&mut *tx)
        .await?;

    let total = sqlx::query_scalar::<Postgres, i64>(&count_sql)
        .bind_values(filter.binds())
        .fetch_one(&mut *tx)
        .await?;
    let rows = sqlx::query_as::<Postgres, T>(&page_sql)
        .bind_values(filter.binds())
        .bind(window.limit)
        .bind(window.offset)
        .fetch_all(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok((rows, total))
}

/// Apply a status change with a compare-and-set on the current status.
///
/// Same status on a terminal row is a no-op; same status elsewhere only
/// replaces the note. Returns `Conflict` if the row changed underneath us.
#[instrument(skip(pool, note), fields(table = table))]
pub async fn update_status(
    pool: &PgPool,
    table: &str,
    workflow: Workflow,
    id: &str,
    to: ReportStatus,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> CoreResult<()> {
    let select = format!("SELECT status FROM {table} WHERE id = $1");
    let current = sqlx::query_scalar::<Postgres, ReportStatus>(&select)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| CoreError::not_found(format!("report {id}")))?;

    let check = workflow.check_transition(current, to)?;
    if check == TransitionCheck::Unchanged && current.is_terminal() {
        return Ok(());
    }

    let update = format!(
        "UPDATE {table} SET status = $1, status_note = $2, updated_at = GREATEST($3, created_at) \
         WHERE id = $4 AND status = $5"
    );
    let result = sqlx::query(&update)
        .bind(to)
        .bind(note)
        .bind(now)
        .bind(id)
        .bind(current)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::Conflict(format!(
            "report {id} changed status concurrently (expected {current})"
        )));
    }
    info!(from = %current, to = %to, "Report status updated");
    Ok(())
}

/// Delete a report row; photos go with it through the foreign key.
pub async fn delete_by_id(pool: &PgPool, table: &str, id: &str) -> CoreResult<()> {
    let sql = format!("DELETE FROM {table} WHERE id = $1");
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;
    if result.rows_affected() == 0 {
        return Err(CoreError::not_found(format!("report {id}")));
    }
    info!(table = table, id = id, "Report deleted");
    Ok(())
}

/// Count and summed value per year for `years`, zero-filled.
///
/// `year_expr` and `value_expr` refer to the table through alias `t`. The
/// filter must not carry a date range; the years define the span.
pub async fn yearly_trend(
    pool: &PgPool,
    table: &str,
    year_expr: &str,
    value_expr: &str,
    filter: &SqlFilter,
    years: &[i32],
) -> CoreResult<Vec<YearValue>> {
    let years_idx = filter.next_param();
    let sql = format!(
        "SELECT y.year::INT AS year, COUNT(t.id)::BIGINT AS count, \
                COALESCE(SUM({value_expr}), 0)::FLOAT8 AS value \
         FROM unnest(${years_idx}::INT[]) AS y(year) \
         LEFT JOIN {table} t ON {year_expr} = y.year AND {conditions} \
         GROUP BY y.year ORDER BY y.year",
        conditions = filter.conjunction(),
    );
    let years = BindValue::IntArray(years.to_vec());
    Ok(sqlx::query_as::<Postgres, YearValue>(&sql)
        .bind_values(filter.binds())
        .bind_value(&years)
        .fetch_all(pool)
        .await?)
}

/// Every located row matching `filter`, newest first. `projection` must
/// produce the [`MapPoint`] columns.
pub async fn map_points(
    pool: &PgPool,
    table: &str,
    projection: &str,
    order: &str,
    filter: &SqlFilter,
) -> CoreResult<Vec<MapPoint>> {
    let sql = format!(
        "SELECT {projection} FROM {table} {where_clause} ORDER BY {order}, id DESC",
        where_clause = filter.where_with(&["latitude IS NOT NULL", "longitude IS NOT NULL"]),
    );
    Ok(sqlx::query_as::<Postgres, MapPoint>(&sql)
        .bind_values(filter.binds())
        .fetch_all(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::common::HEADER_COLUMNS;

    #[test]
    fn insert_numbers_every_column() {
        let sql = insert_sql("things", "id, name, size");
        assert_eq!(
            sql,
            "INSERT INTO things (id, name, size) VALUES ($1, $2, $3) RETURNING id, name, size"
        );
    }

    #[test]
    fn update_keys_on_leading_id() {
        let sql = update_sql("things", "id, name, size");
        assert_eq!(
            sql,
            "UPDATE things SET (name, size) = ($2, $3) WHERE id = $1 RETURNING id, name, size"
        );
        let header = update_sql("road_reports", HEADER_COLUMNS);
        assert!(header.contains("$12"));
        assert!(!header.contains("$13"));
    }

    #[test]
    fn update_guards_status_instead_of_writing_it() {
        let sql = update_sql("things", "id, name, status, status_note, size");
        assert_eq!(
            sql,
            "UPDATE things SET (name, size) = ($2, $5) \
             WHERE id = $1 AND status = $3 AND status_note IS NOT DISTINCT FROM $4 \
             RETURNING id, name, status, status_note, size"
        );
    }

    #[test]
    fn open_statuses_exclude_terminal_tokens() {
        assert_eq!(
            open_status_condition(),
            "status NOT IN ('COMPLETED', 'REJECTED', 'RESOLVED')"
        );
    }

    #[test]
    fn growth_pairs_previous_values() {
        let mut current = Metrics::new();
        current.insert("total_reports".into(), 15.0);
        current.insert("budget".into(), 5.0);
        let mut previous = Metrics::new();
        previous.insert("total_reports".into(), 10.0);
        add_growth(&mut current, &previous, &["total_reports", "budget"]);
        assert_eq!(current["total_reports_growth_pct"], 50.0);
        assert_eq!(current["total_reports_previous"], 10.0);
        assert_eq!(current["budget_growth_pct"], 100.0);
    }
}
