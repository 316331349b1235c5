use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

use crate::analytics::productivity::ProductivityTable;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "staging" => Self::Staging,
            _ => Self::Dev,
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,

    // Database
    pub database_url: String,
    pub database_max_connections: u32,
    pub database_acquire_timeout_seconds: u64,

    // Redis
    pub redis_url: String,
    pub redis_cache_ttl_seconds: u64,
    pub cache_key_prefix: String,

    // Auth
    pub bcrypt_cost: u32,
    pub min_password_length: usize,

    // Pagination
    pub default_page_limit: i64,
    pub max_page_limit: i64,

    // Requests
    pub request_timeout_seconds: u64,

    // Agriculture estimates
    pub productivity: ProductivityTable,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup. Unknown keys are never
    /// consulted, so extra entries in the source are ignored.
    pub fn from_source<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Environment::from_str(&lookup("ENV").unwrap_or_else(|| "dev".to_string()));

        // Database
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let database_max_connections = parsed(&lookup, "DATABASE_MAX_CONNECTIONS").unwrap_or(10);
        let database_acquire_timeout_seconds =
            parsed(&lookup, "DATABASE_ACQUIRE_TIMEOUT_SECONDS").unwrap_or(5);

        // Redis
        let redis_url =
            lookup("REDIS_URL").unwrap_or_else(|| "redis://127.0.0.1:6379/0".to_string());
        let redis_cache_ttl_seconds =
            parsed(&lookup, "REDIS_CACHE_TTL_SECONDS").unwrap_or(300); // 5 min
        let cache_key_prefix = lookup("CACHE_KEY_PREFIX")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "brp".to_string());

        // Auth
        let bcrypt_cost = parsed(&lookup, "BCRYPT_COST")
            .unwrap_or(bcrypt::DEFAULT_COST)
            .clamp(4, 31);
        let min_password_length = parsed(&lookup, "MIN_PASSWORD_LENGTH").unwrap_or(8);

        // Pagination
        let max_page_limit: i64 = parsed(&lookup, "MAX_PAGE_LIMIT")
            .filter(|v| *v > 0)
            .unwrap_or(100);
        let default_page_limit: i64 = parsed(&lookup, "DEFAULT_PAGE_LIMIT")
            .filter(|v| *v > 0)
            .unwrap_or(20)
            .min(max_page_limit);

        let request_timeout_seconds = parsed(&lookup, "REQUEST_TIMEOUT_SECONDS").unwrap_or(30);

        // Agriculture estimates
        let mut productivity = ProductivityTable::default();
        if let Some(raw) = lookup("PRODUCTIVITY_RATES") {
            productivity
                .override_current(&raw)
                .context("PRODUCTIVITY_RATES is malformed")?;
        }
        if let Some(raw) = lookup("PRODUCTIVITY_RATES_PREVIOUS") {
            productivity
                .override_previous(&raw)
                .context("PRODUCTIVITY_RATES_PREVIOUS is malformed")?;
        }
        if let Some(rate) = parsed(&lookup, "PRODUCTIVITY_DEFAULT_RATE") {
            productivity.current_default = rate;
        }
        if let Some(rate) = parsed(&lookup, "PRODUCTIVITY_DEFAULT_RATE_PREVIOUS") {
            productivity.previous_default = rate;
        }

        Ok(Settings {
            env,
            database_url,
            database_max_connections,
            database_acquire_timeout_seconds,
            redis_url,
            redis_cache_ttl_seconds,
            cache_key_prefix,
            bcrypt_cost,
            min_password_length,
            default_page_limit,
            max_page_limit,
            request_timeout_seconds,
            productivity,
        })
    }
}

fn parsed<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(key).and_then(|s| s.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let settings =
            Settings::from_source(source(&[("DATABASE_URL", "postgres://localhost/reports")]))
                .unwrap();
        assert_eq!(settings.env, Environment::Dev);
        assert_eq!(settings.database_max_connections, 10);
        assert_eq!(settings.redis_cache_ttl_seconds, 300);
        assert_eq!(settings.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert_eq!(settings.default_page_limit, 20);
        assert_eq!(settings.max_page_limit, 100);
        assert_eq!(settings.cache_key_prefix, "brp");
        assert_eq!(settings.productivity.rate_current("PADI SAWAH"), 5.2);
    }

    #[test]
    fn database_url_is_required() {
        assert!(Settings::from_source(source(&[])).is_err());
    }

    #[test]
    fn unknown_and_malformed_keys_fall_back() {
        let settings = Settings::from_source(source(&[
            ("DATABASE_URL", "postgres://localhost/reports"),
            ("DEFAULT_PAGE_LIMIT", "lots"),
            ("BCRYPT_COST", "99"),
            ("SOMETHING_ELSE", "ignored"),
            ("ENV", "production"),
        ]))
        .unwrap();
        assert_eq!(settings.default_page_limit, 20);
        assert_eq!(settings.bcrypt_cost, 31);
        assert!(settings.env.is_prod());
    }

    #[test]
    fn productivity_overrides_are_applied() {
        let settings = Settings::from_source(source(&[
            ("DATABASE_URL", "postgres://localhost/reports"),
            ("PRODUCTIVITY_RATES", "PADI=6.1;SORGUM=2.2"),
            ("PRODUCTIVITY_DEFAULT_RATE", "3.3"),
        ]))
        .unwrap();
        assert_eq!(settings.productivity.rate_current("padi"), 6.1);
        assert_eq!(settings.productivity.rate_current("sorgum manis"), 2.2);
        assert_eq!(settings.productivity.rate_current("unknown"), 3.3);
        // previous table untouched
        assert_eq!(settings.productivity.rate_previous("PADI"), 5.0);
    }

    #[test]
    fn malformed_productivity_is_an_error() {
        let result = Settings::from_source(source(&[
            ("DATABASE_URL", "postgres://localhost/reports"),
            ("PRODUCTIVITY_RATES", "PADI=fast"),
        ]));
        assert!(result.is_err());
    }
}
