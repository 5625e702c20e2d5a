use serde::{Deserialize, Serialize};

use workshop_core::UserId;

use crate::{Permission, Role, role_permissions};

/// A fully resolved caller for authorization decisions.
///
/// Built by the caller from its session; `permissions` holds grants beyond
/// what the roles imply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: UserId,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
}

impl Principal {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self {
            user_id,
            roles: vec![role],
            permissions: Vec::new(),
        }
    }

    pub fn admin(user_id: UserId) -> Self {
        Self::new(user_id, Role::ADMIN)
    }

    pub fn user(user_id: UserId) -> Self {
        Self::new(user_id, Role::USER)
    }

    pub fn is_admin(&self) -> bool {
        self.roles.iter().any(Role::is_admin)
    }

    /// Role-derived plus explicit permissions.
    pub fn effective_permissions(&self) -> Vec<Permission> {
        let mut perms: Vec<Permission> = self
            .roles
            .iter()
            .flat_map(role_permissions)
            .chain(self.permissions.iter().cloned())
            .collect();
        perms.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        perms.dedup();
        perms
    }
}
