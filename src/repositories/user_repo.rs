//! User accounts.
//!
//! Usernames and emails are stored lower-cased; both carry unique
//! constraints, so duplicates surface as `CoreError::Conflict`.

use chrono::Utc;
use sqlx::{PgPool, Postgres};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::context::RequestContext;
use crate::domain::enums::check_token;
use crate::domain::users::{normalize_email, normalize_username, NewUser, Role, User, UserUpdate};
use crate::error::{CoreError, CoreResult};
use crate::pagination::Page;
use crate::repositories::common;
use crate::repositories::filter::{order_clause, FilterField, FilterSpec, ListQuery, SqlFilter};

const COLUMNS: &str = "id, username, email, full_name, role, is_active, password_hash, \
     last_login_at, created_at, updated_at";

const SORTABLE: &[&str] = &["id", "username", "email", "role", "created_at", "last_login_at"];

pub static FILTERS: FilterSpec = FilterSpec {
    fields: &[
        FilterField::token("role", check_token::<Role>),
        FilterField::boolean("is_active"),
        FilterField::substring("search", &["username", "email", "full_name"]),
    ],
    date_column: "(created_at AT TIME ZONE 'UTC')::date",
    geo: false,
};

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user whose password has already been hashed.
    #[instrument(skip(self, ctx, user, password_hash), fields(username = %user.username))]
    pub async fn create(
        &self,
        ctx: &RequestContext,
        user: &NewUser,
        password_hash: String,
    ) -> CoreResult<User> {
        let username = normalize_username(&user.username)?;
        let email = normalize_email(&user.email)?;
        let now = Utc::now();
        let sql = format!(
            r#"
            INSERT INTO users ({COLUMNS})
            VALUES ($1, $2, $3, $4, $5, TRUE, $6, NULL, $7, $7)
            RETURNING {COLUMNS}
            "#
        );
        ctx.run(async {
            let created = sqlx::query_as::<Postgres, User>(&sql)
                .bind(Uuid::new_v4())
                .bind(&username)
                .bind(&email)
                .bind(user.full_name.as_deref().map(str::trim))
                .bind(user.role)
                .bind(&password_hash)
                .bind(now)
                .fetch_one(&self.pool)
                .await?;
            info!(user_id = %created.id, role = %created.role, "User created");
            Ok(created)
        })
        .await
    }

    pub async fn find_by_id(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<User> {
        let sql = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        ctx.run(async {
            sqlx::query_as::<Postgres, User>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("user {id}")))
        })
        .await
    }

    /// Look a user up by username or email. Returns `None` rather than
    /// `NotFound` so login failures stay indistinguishable.
    pub async fn find_by_login(
        &self,
        ctx: &RequestContext,
        login: &str,
    ) -> CoreResult<Option<User>> {
        let login = login.trim().to_lowercase();
        let sql = format!("SELECT {COLUMNS} FROM users WHERE username = $1 OR email = $1 LIMIT 1");
        ctx.run(async {
            Ok(sqlx::query_as::<Postgres, User>(&sql)
                .bind(&login)
                .fetch_optional(&self.pool)
                .await?)
        })
        .await
    }

    pub async fn find_all(
        &self,
        ctx: &RequestContext,
        query: &ListQuery,
        default_limit: i64,
        max_limit: i64,
    ) -> CoreResult<Page<User>> {
        let window = query.page.window(default_limit, max_limit)?;
        let mut filter = SqlFilter::new();
        filter.apply(&FILTERS, &query.filters)?;
        let order = order_clause(query.sort.as_ref(), SORTABLE, "created_at DESC")?;
        ctx.run(async {
            let (rows, total) = common::fetch_page::<User>(
                &self.pool, COLUMNS, "users", &filter, &order, window,
            )
            .await?;
            Ok(Page::new(rows, window, total))
        })
        .await
    }

    /// Change profile fields; absent fields keep their stored value.
    #[instrument(skip(self, ctx, update))]
    pub async fn update(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        update: &UserUpdate,
    ) -> CoreResult<User> {
        let username = update.username.as_deref().map(normalize_username).transpose()?;
        let email = update.email.as_deref().map(normalize_email).transpose()?;
        let sql = format!(
            r#"
            UPDATE users
            SET username = COALESCE($2, username),
                email = COALESCE($3, email),
                full_name = COALESCE($4, full_name),
                updated_at = $5
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        );
        ctx.run(async {
            let user = sqlx::query_as::<Postgres, User>(&sql)
                .bind(id)
                .bind(&username)
                .bind(&email)
                .bind(update.full_name.as_deref().map(str::trim))
                .bind(Utc::now())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("user {id}")))?;
            info!(user_id = %id, "User updated");
            Ok(user)
        })
        .await
    }

    pub async fn set_role(&self, ctx: &RequestContext, id: Uuid, role: Role) -> CoreResult<User> {
        let sql = format!(
            "UPDATE users SET role = $2, updated_at = $3 WHERE id = $1 RETURNING {COLUMNS}"
        );
        ctx.run(async {
            let user = sqlx::query_as::<Postgres, User>(&sql)
                .bind(id)
                .bind(role)
                .bind(Utc::now())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("user {id}")))?;
            info!(user_id = %id, role = %role, "User role changed");
            Ok(user)
        })
        .await
    }

    pub async fn set_active(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        active: bool,
    ) -> CoreResult<User> {
        let sql = format!(
            "UPDATE users SET is_active = $2, updated_at = $3 WHERE id = $1 RETURNING {COLUMNS}"
        );
        ctx.run(async {
            let user = sqlx::query_as::<Postgres, User>(&sql)
                .bind(id)
                .bind(active)
                .bind(Utc::now())
                .fetch_optional(&self.pool)
                .await?
                .ok_or_else(|| CoreError::not_found(format!("user {id}")))?;
            if active {
                info!(user_id = %id, "User activated");
            } else {
                warn!(user_id = %id, "User deactivated");
            }
            Ok(user)
        })
        .await
    }

    pub async fn update_password(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        password_hash: String,
    ) -> CoreResult<()> {
        ctx.run(async {
            let result =
                sqlx::query("UPDATE users SET password_hash = $2, updated_at = $3 WHERE id = $1")
                    .bind(id)
                    .bind(&password_hash)
                    .bind(Utc::now())
                    .execute(&self.pool)
                    .await?;
            if result.rows_affected() == 0 {
                return Err(CoreError::not_found(format!("user {id}")));
            }
            info!(user_id = %id, "Password changed");
            Ok(())
        })
        .await
    }

    /// Remove the account. Reports keep the id in `created_by`.
    pub async fn delete(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<()> {
        ctx.run(async {
            let result = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await?;
            if result.rows_affected() == 0 {
                return Err(CoreError::not_found(format!("user {id}")));
            }
            info!(user_id = %id, "User deleted");
            Ok(())
        })
        .await
    }

    pub async fn touch_last_login(&self, ctx: &RequestContext, id: Uuid) -> CoreResult<()> {
        ctx.run(async {
            sqlx::query("UPDATE users SET last_login_at = $2 WHERE id = $1")
                .bind(id)
                .bind(Utc::now())
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }
}
