//! Photo tables. Every report table has a sibling `*_photos` table whose
//! `report_id` references it with `ON DELETE CASCADE`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, instrument};

use crate::domain::common::{NewPhoto, ReportPhoto};
use crate::error::{CoreError, CoreResult};
use crate::ids::IdGenerator;

const COLUMNS: &str = "id, report_id, photo_url, caption, created_at";

#[derive(Debug, Clone, Copy)]
pub struct PhotoTable {
    pub table: &'static str,
    /// Owning report table, for existence checks.
    pub parent: &'static str,
}

impl PhotoTable {
    /// Insert photos for a report inside the caller's transaction.
    pub async fn insert_all(
        &self,
        conn: &mut PgConnection,
        ids: &IdGenerator,
        report_id: &str,
        photos: &[NewPhoto],
        now: DateTime<Utc>,
    ) -> CoreResult<Vec<ReportPhoto>> {
        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES ($1, $2, $3, $4, $5) RETURNING {COLUMNS}",
            self.table
        );
        let mut stored = Vec::with_capacity(photos.len());
        for photo in photos {
            photo.validate()?;
            let row = sqlx::query_as::<_, ReportPhoto>(&sql)
                .bind(ids.next_id()?)
                .bind(report_id)
                .bind(photo.photo_url.trim())
                .bind(&photo.caption)
                .bind(now)
                .fetch_one(&mut *conn)
                .await?;
            stored.push(row);
        }
        Ok(stored)
    }

    pub async fn load(&self, pool: &PgPool, report_id: &str) -> CoreResult<Vec<ReportPhoto>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE report_id = $1 ORDER BY created_at, id",
            self.table
        );
        Ok(sqlx::query_as::<_, ReportPhoto>(&sql)
            .bind(report_id)
            .fetch_all(pool)
            .await?)
    }

    /// Photos for many reports in one round trip, keyed by report id.
    pub async fn load_many(
        &self,
        pool: &PgPool,
        report_ids: &[String],
    ) -> CoreResult<HashMap<String, Vec<ReportPhoto>>> {
        if report_ids.is_empty() {
            return Ok(HashMap::new());
        }
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE report_id = ANY($1) ORDER BY created_at, id",
            self.table
        );
        let rows = sqlx::query_as::<_, ReportPhoto>(&sql)
            .bind(report_ids)
            .fetch_all(pool)
            .await?;
        let mut by_report: HashMap<String, Vec<ReportPhoto>> = HashMap::new();
        for photo in rows {
            by_report.entry(photo.report_id.clone()).or_default().push(photo);
        }
        Ok(by_report)
    }

    /// Attach one photo to an existing report.
    #[instrument(skip(self, pool, ids, photo), fields(table = self.table))]
    pub async fn add(
        &self,
        pool: &PgPool,
        ids: &IdGenerator,
        report_id: &str,
        photo: &NewPhoto,
    ) -> CoreResult<ReportPhoto> {
        photo.validate()?;
        let sql = format!(
            "INSERT INTO {table} ({COLUMNS}) \
             SELECT $1, r.id, $3, $4, $5 FROM {parent} r WHERE r.id = $2 \
             RETURNING {COLUMNS}",
            table = self.table,
            parent = self.parent,
        );
        let stored = sqlx::query_as::<_, ReportPhoto>(&sql)
            .bind(ids.next_id()?)
            .bind(report_id)
            .bind(photo.photo_url.trim())
            .bind(&photo.caption)
            .bind(Utc::now())
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| CoreError::not_found(format!("report {report_id}")))?;
        info!(photo_id = %stored.id, "Photo attached");
        Ok(stored)
    }

    #[instrument(skip(self, pool), fields(table = self.table))]
    pub async fn delete(&self, pool: &PgPool, report_id: &str, photo_id: &str) -> CoreResult<()> {
        let sql = format!("DELETE FROM {} WHERE id = $1 AND report_id = $2", self.table);
        let result = sqlx::query(&sql)
            .bind(photo_id)
            .bind(report_id)
            .execute(pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CoreError::not_found(format!("photo {photo_id}")));
        }
        info!("Photo removed");
        Ok(())
    }
}
