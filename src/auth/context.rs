use uuid::Uuid;

use crate::auth::roles::Capability;
use crate::domain::users::{Role, User};
use crate::error::{CoreError, CoreResult};

/// The authenticated caller, as established by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    pub user_id: Uuid,
    pub username: String,
    pub role: Role,
}

impl AuthContext {
    pub fn new(user_id: Uuid, username: impl Into<String>, role: Role) -> Self {
        Self {
            user_id,
            username: username.into(),
            role,
        }
    }

    pub fn from_user(user: &User) -> Self {
        Self::new(user.id, user.username.clone(), user.role)
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.role.can(capability)
    }

    /// `Unauthorized` unless the caller's role carries `capability`.
    pub fn require(&self, capability: Capability) -> CoreResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            tracing::warn!(
                user_id = %self.user_id,
                role = %self.role,
                capability = %capability,
                "Capability denied"
            );
            Err(CoreError::unauthorized(format!(
                "role {} may not {}",
                self.role,
                capability.as_str().replace('_', " ")
            )))
        }
    }

    /// Value stored in a report's `created_by`.
    pub fn owner_id(&self) -> String {
        self.user_id.to_string()
    }
}
