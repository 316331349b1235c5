//! Read-only access to the five indicator series.

use sqlx::{PgPool, Postgres};

use crate::context::RequestContext;
use crate::domain::indicators::{IndicatorKind, IndicatorValue};
use crate::error::{CoreError, CoreResult};

const COLUMNS: &str = "id, indicator_name, year, value, unit, created_at";

#[derive(Clone)]
pub struct IndicatorRepository {
    pool: PgPool,
}

impl IndicatorRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Every indicator of `kind` recorded for `year`, by name.
    pub async fn list_by_year(
        &self,
        ctx: &RequestContext,
        kind: IndicatorKind,
        year: i32,
    ) -> CoreResult<Vec<IndicatorValue>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE year = $1 ORDER BY indicator_name ASC, id ASC",
            kind.table()
        );
        ctx.run(async {
            Ok(sqlx::query_as::<Postgres, IndicatorValue>(&sql)
                .bind(year)
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    /// The value of one indicator in one year.
    pub async fn find(
        &self,
        ctx: &RequestContext,
        kind: IndicatorKind,
        indicator_name: &str,
        year: i32,
    ) -> CoreResult<IndicatorValue> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE indicator_name = $1 AND year = $2 \
             ORDER BY id DESC LIMIT 1",
            kind.table()
        );
        ctx.run(async {
            sqlx::query_as::<Postgres, IndicatorValue>(&sql)
                .bind(indicator_name)
                .bind(year)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| {
                    CoreError::not_found(format!("{kind} indicator '{indicator_name}' for {year}"))
                })
        })
        .await
    }

    /// Full series of one indicator, oldest year first.
    pub async fn list_by_indicator(
        &self,
        ctx: &RequestContext,
        kind: IndicatorKind,
        indicator_name: &str,
    ) -> CoreResult<Vec<IndicatorValue>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE indicator_name = $1 ORDER BY year ASC, id ASC",
            kind.table()
        );
        ctx.run(async {
            Ok(sqlx::query_as::<Postgres, IndicatorValue>(&sql)
                .bind(indicator_name)
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }

    /// Distinct years with data, newest first.
    pub async fn available_years(
        &self,
        ctx: &RequestContext,
        kind: IndicatorKind,
    ) -> CoreResult<Vec<i32>> {
        let sql = format!("SELECT DISTINCT year FROM {} ORDER BY year DESC", kind.table());
        ctx.run(async {
            Ok(sqlx::query_scalar::<Postgres, i32>(&sql)
                .fetch_all(&self.pool)
                .await?)
        })
        .await
    }
}
