//! Portal users and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::domain::enums::{token_enum, TokenError};
use crate::error::{CoreError, CoreResult};

token_enum! {
    /// Role controls capability only; it never identifies a user.
    Role {
        SuperAdmin => "SUPERADMIN",
        Admin => "ADMIN",
        Supervisor => "SUPERVISOR",
        Operator => "OPERATOR",
        Viewer => "VIEWER",
        User => "USER",
    }
}

impl Default for Role {
    fn default() -> Self {
        Self::User
    }
}

impl Role {
    /// Roles that only a super administrator may hand out.
    pub fn is_privileged(self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin)
    }
}

/// Stored user. `password_hash` never leaves the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub role: Role,
    pub is_active: bool,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    #[serde(default)]
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration input.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub password: String,
    #[serde(default)]
    pub role: Role,
}

/// Profile fields a user update may change.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
}

pub(crate) fn normalize_username(raw: &str) -> CoreResult<String> {
    let username = raw.trim().to_lowercase();
    if username.len() < 3 {
        return Err(CoreError::validation("username must be at least 3 characters"));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(CoreError::validation(
            "username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(username)
}

pub(crate) fn normalize_email(raw: &str) -> CoreResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.')
        });
    if !valid {
        return Err(CoreError::validation(format!("invalid email '{raw}'")));
    }
    Ok(email)
}

pub fn parse_role(token: &str) -> CoreResult<Role> {
    token
        .trim()
        .to_uppercase()
        .parse()
        .map_err(|e: TokenError| CoreError::from(e))
}
