//! Accounts, login and role administration.

use std::sync::Arc;

use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::auth::password::{check_policy, hash_password, verify_password, DecoyHash};
use crate::auth::{AuthContext, Capability};
use crate::config::Settings;
use crate::context::RequestContext;
use crate::domain::users::{NewUser, Role, User, UserUpdate};
use crate::error::{CoreError, CoreResult};
use crate::pagination::Page;
use crate::repositories::{ListQuery, UserRepository};

/// The one message every failed login gets.
const BAD_CREDENTIALS: &str = "invalid username or password";

#[derive(Clone)]
pub struct UserService {
    users: UserRepository,
    decoy: Arc<DecoyHash>,
    bcrypt_cost: u32,
    min_password_length: usize,
    default_limit: i64,
    max_limit: i64,
}

impl UserService {
    pub fn new(users: UserRepository, settings: &Settings) -> Self {
        Self {
            users,
            decoy: Arc::new(DecoyHash::new(settings.bcrypt_cost)),
            bcrypt_cost: settings.bcrypt_cost,
            min_password_length: settings.min_password_length,
            default_limit: settings.default_page_limit,
            max_limit: settings.max_page_limit,
        }
    }

    /// Self-service sign-up. The account always starts as `USER`.
    #[instrument(skip(self, ctx, new_user), fields(username = %new_user.username))]
    pub async fn register(&self, ctx: &RequestContext, mut new_user: NewUser) -> CoreResult<User> {
        new_user.role = Role::User;
        self.insert(ctx, new_user).await
    }

    /// Account created by an administrator with any role they may grant.
    #[instrument(
        skip(self, ctx, auth, new_user),
        fields(username = %new_user.username, role = %new_user.role)
    )]
    pub async fn create_user(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        new_user: NewUser,
    ) -> CoreResult<User> {
        auth.require(Capability::ManageUsers)?;
        self.require_grant(auth, new_user.role)?;
        self.insert(ctx, new_user).await
    }

    async fn insert(&self, ctx: &RequestContext, new_user: NewUser) -> CoreResult<User> {
        check_policy(&new_user.password, self.min_password_length)?;
        let hash = hash_password(new_user.password.clone(), self.bcrypt_cost).await?;
        self.users.create(ctx, &new_user, hash).await
    }

    /// Verify a login. Unknown users, inactive users and wrong passwords all
    /// fail with the same `Unauthorized` message.
    #[instrument(skip(self, ctx, password))]
    pub async fn authenticate(
        &self,
        ctx: &RequestContext,
        login: &str,
        password: &str,
    ) -> CoreResult<User> {
        let Some(user) = self.users.find_by_login(ctx, login).await? else {
            self.decoy.verify(password).await?;
            return Err(CoreError::unauthorized(BAD_CREDENTIALS));
        };
        let matches = verify_password(password.to_string(), user.password_hash.clone()).await?;
        if !matches || !user.is_active {
            warn!(user_id = %user.id, active = user.is_active, "Login rejected");
            return Err(CoreError::unauthorized(BAD_CREDENTIALS));
        }
        if let Err(e) = self.users.touch_last_login(ctx, user.id).await {
            warn!(user_id = %user.id, error = %e, "Failed to record last login");
        }
        info!(user_id = %user.id, "User logged in");
        Ok(user)
    }

    pub async fn get(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
    ) -> CoreResult<User> {
        self.require_self_or_admin(auth, id)?;
        self.users.find_by_id(ctx, id).await
    }

    pub async fn list(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        query: &ListQuery,
    ) -> CoreResult<Page<User>> {
        auth.require(Capability::ManageUsers)?;
        self.users
            .find_all(ctx, query, self.default_limit, self.max_limit)
            .await
    }

    pub async fn update_profile(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
        update: &UserUpdate,
    ) -> CoreResult<User> {
        self.require_self_or_admin(auth, id)?;
        self.users.update(ctx, id, update).await
    }

    /// The caller changes their own password, proving the current one.
    #[instrument(skip_all, fields(user_id = %auth.user_id))]
    pub async fn change_password(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        current: &str,
        new_password: &str,
    ) -> CoreResult<()> {
        let user = self.users.find_by_id(ctx, auth.user_id).await?;
        if !verify_password(current.to_string(), user.password_hash).await? {
            return Err(CoreError::unauthorized("current password is incorrect"));
        }
        self.store_password(ctx, auth.user_id, new_password).await
    }

    /// Administrative reset without the current password.
    pub async fn reset_password(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
        new_password: &str,
    ) -> CoreResult<()> {
        auth.require(Capability::ManageUsers)?;
        let target = self.users.find_by_id(ctx, id).await?;
        self.require_grant(auth, target.role)?;
        self.store_password(ctx, id, new_password).await
    }

    async fn store_password(
        &self,
        ctx: &RequestContext,
        id: Uuid,
        new_password: &str,
    ) -> CoreResult<()> {
        check_policy(new_password, self.min_password_length)?;
        let hash = hash_password(new_password.to_string(), self.bcrypt_cost).await?;
        self.users.update_password(ctx, id, hash).await
    }

    /// Only a super administrator may hand out or take away SUPERADMIN and
    /// ADMIN.
    #[instrument(skip(self, ctx, auth), fields(by = %auth.user_id))]
    pub async fn set_role(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
        role: Role,
    ) -> CoreResult<User> {
        auth.require(Capability::ManageUsers)?;
        self.require_grant(auth, role)?;
        let target = self.users.find_by_id(ctx, id).await?;
        self.require_grant(auth, target.role)?;
        self.users.set_role(ctx, id, role).await
    }

    pub async fn deactivate(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
    ) -> CoreResult<User> {
        self.set_active(ctx, auth, id, false).await
    }

    pub async fn activate(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
    ) -> CoreResult<User> {
        self.set_active(ctx, auth, id, true).await
    }

    async fn set_active(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
        active: bool,
    ) -> CoreResult<User> {
        auth.require(Capability::ManageUsers)?;
        if id == auth.user_id && !active {
            return Err(CoreError::validation("cannot deactivate your own account"));
        }
        let target = self.users.find_by_id(ctx, id).await?;
        self.require_grant(auth, target.role)?;
        self.users.set_active(ctx, id, active).await
    }

    pub async fn delete(
        &self,
        ctx: &RequestContext,
        auth: &AuthContext,
        id: Uuid,
    ) -> CoreResult<()> {
        auth.require(Capability::ManageUsers)?;
        if id == auth.user_id {
            return Err(CoreError::validation("cannot delete your own account"));
        }
        let target = self.users.find_by_id(ctx, id).await?;
        self.require_grant(auth, target.role)?;
        self.users.delete(ctx, id).await
    }

    fn require_grant(&self, auth: &AuthContext, role: Role) -> CoreResult<()> {
        if auth.role.can_grant(role) {
            Ok(())
        } else {
            Err(CoreError::unauthorized(format!(
                "role {} may not manage {role} accounts",
                auth.role
            )))
        }
    }

    fn require_self_or_admin(&self, auth: &AuthContext, id: Uuid) -> CoreResult<()> {
        if auth.user_id == id {
            Ok(())
        } else {
            auth.require(Capability::ManageUsers)
        }
    }
}
