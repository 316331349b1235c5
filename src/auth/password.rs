//! Password hashing. bcrypt is CPU-bound, so both directions run on the
//! blocking pool.

use tokio::sync::OnceCell;

use crate::error::{CoreError, CoreResult};

/// bcrypt ignores input past 72 bytes; longer passwords are refused.
const MAX_PASSWORD_BYTES: usize = 72;

pub fn check_policy(password: &str, min_length: usize) -> CoreResult<()> {
    if password.chars().count() < min_length {
        return Err(CoreError::validation(format!(
            "password must be at least {min_length} characters"
        )));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(CoreError::validation(format!(
            "password must be at most {MAX_PASSWORD_BYTES} bytes"
        )));
    }
    Ok(())
}

pub async fn hash_password(password: String, cost: u32) -> CoreResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password hashing task failed");
            CoreError::StoreUnavailable("password hashing failed".to_string())
        })?
        .map_err(|e| {
            tracing::error!(error = %e, "bcrypt hash failed");
            CoreError::StoreUnavailable("password hashing failed".to_string())
        })
}

/// Constant-time check of `password` against a stored bcrypt hash. A
/// malformed hash verifies as `false`.
pub async fn verify_password(password: String, hash: String) -> CoreResult<bool> {
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Password verification task failed");
            CoreError::StoreUnavailable("password verification failed".to_string())
        })?;
    match result {
        Ok(matches) => Ok(matches),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is unreadable");
            Ok(false)
        }
    }
}

/// Hash checked when a login names no account, so that path pays for one
/// bcrypt verification like a real one. Built on first use at the configured
/// cost.
pub struct DecoyHash {
    cost: u32,
    hash: OnceCell<String>,
}

impl DecoyHash {
    pub fn new(cost: u32) -> Self {
        Self {
            cost,
            hash: OnceCell::new(),
        }
    }

    pub async fn verify(&self, password: &str) -> CoreResult<bool> {
        let hash = self
            .hash
            .get_or_try_init(|| hash_password("decoy-login-password".to_string(), self.cost))
            .await?;
        verify_password(password.to_string(), hash.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_checks_length() {
        assert!(check_policy("short", 8).is_err());
        assert!(check_policy("long enough", 8).is_ok());
        assert!(check_policy(&"x".repeat(80), 8).is_err());
    }

    #[tokio::test]
    async fn hash_then_verify() {
        let hash = hash_password("s3cret-pass".into(), 4).await.unwrap();
        assert!(hash.starts_with("$2"));
        assert!(verify_password("s3cret-pass".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong-pass".into(), hash).await.unwrap());
    }

    #[tokio::test]
    async fn garbage_hash_does_not_verify() {
        assert!(!verify_password("anything".into(), "not-a-hash".into()).await.unwrap());
    }

    #[tokio::test]
    async fn decoy_runs_bcrypt_at_the_configured_cost() {
        let decoy = DecoyHash::new(4);
        assert!(!decoy.verify("operator.one").await.unwrap());
        let hash = decoy.hash.get().unwrap();
        assert!(hash.starts_with("$2b$04$"));

        decoy.verify("again").await.unwrap();
        assert_eq!(decoy.hash.get().unwrap(), hash);
    }
}
