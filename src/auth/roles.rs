//! Role-based capabilities. There is no per-record ACL; a role either has a
//! capability everywhere or nowhere.

use crate::domain::users::Role;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Lists, detail views and dashboards.
    ViewReports,
    SubmitReports,
    /// Change a report's content or photos.
    EditReports,
    /// Move a report through its status workflow.
    ReviewReports,
    DeleteReports,
    ManageUsers,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ViewReports => "view_reports",
            Self::SubmitReports => "submit_reports",
            Self::EditReports => "edit_reports",
            Self::ReviewReports => "review_reports",
            Self::DeleteReports => "delete_reports",
            Self::ManageUsers => "manage_users",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Role {
    pub fn can(self, capability: Capability) -> bool {
        use Capability::*;
        match self {
            Role::SuperAdmin | Role::Admin => true,
            Role::Supervisor => matches!(
                capability,
                ViewReports | SubmitReports | EditReports | ReviewReports
            ),
            Role::Operator => matches!(capability, ViewReports | SubmitReports | EditReports),
            Role::User => matches!(capability, ViewReports | SubmitReports),
            Role::Viewer => matches!(capability, ViewReports),
        }
    }

    /// Whether this role may hand `target` to another user.
    pub fn can_grant(self, target: Role) -> bool {
        match self {
            Role::SuperAdmin => true,
            Role::Admin => !target.is_privileged(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewers_only_read() {
        assert!(Role::Viewer.can(Capability::ViewReports));
        assert!(!Role::Viewer.can(Capability::SubmitReports));
    }

    #[test]
    fn review_needs_supervisor() {
        assert!(!Role::Operator.can(Capability::ReviewReports));
        assert!(Role::Supervisor.can(Capability::ReviewReports));
        assert!(!Role::Supervisor.can(Capability::DeleteReports));
        assert!(Role::Admin.can(Capability::DeleteReports));
    }

    #[test]
    fn only_superadmin_grants_privileged_roles() {
        assert!(Role::SuperAdmin.can_grant(Role::Admin));
        assert!(!Role::Admin.can_grant(Role::Admin));
        assert!(!Role::Admin.can_grant(Role::SuperAdmin));
        assert!(Role::Admin.can_grant(Role::Operator));
        assert!(!Role::Supervisor.can_grant(Role::User));
    }
}
