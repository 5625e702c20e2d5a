use thiserror::Error;

use workshop_core::{DomainError, UserId};

use crate::{Permission, Principal, Role};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

impl From<AuthzError> for DomainError {
    fn from(_: AuthzError) -> Self {
        DomainError::Unauthorized
    }
}

/// Permissions implied by a role. `ADMIN` holds the wildcard.
pub fn role_permissions(role: &Role) -> Vec<Permission> {
    if role.is_admin() {
        vec![Permission::WILDCARD]
    } else {
        Vec::new()
    }
}

/// Authorize a principal for one permission.
///
/// - No IO
/// - No panics
/// - No business logic (pure policy check)
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    let granted = principal
        .effective_permissions()
        .iter()
        .any(|p| p.is_wildcard() || p == required);

    if granted {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

/// Which service records a principal may see in the history view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryScope {
    All,
    /// Only records of vehicles whose owner login is this user.
    OwnedBy(UserId),
}

pub fn history_scope(principal: &Principal) -> HistoryScope {
    match authorize(principal, &Permission::HISTORY_READ_ALL) {
        Ok(()) => HistoryScope::All,
        Err(_) => HistoryScope::OwnedBy(principal.user_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_granted_everything() {
        let admin = Principal::admin(UserId::new());
        assert!(authorize(&admin, &Permission::REPORTS_DETAILED).is_ok());
        assert_eq!(history_scope(&admin), HistoryScope::All);
    }

    #[test]
    fn admin_role_is_case_insensitive() {
        let principal = Principal::new(UserId::new(), Role::new("admin"));
        assert!(principal.is_admin());
        assert!(authorize(&principal, &Permission::REPORTS_DETAILED).is_ok());
    }

    #[test]
    fn plain_user_is_scoped_to_owned_vehicles() {
        let user_id = UserId::new();
        let user = Principal::user(user_id);
        assert_eq!(history_scope(&user), HistoryScope::OwnedBy(user_id));

        let err = authorize(&user, &Permission::REPORTS_DETAILED).unwrap_err();
        assert_eq!(err, AuthzError::Forbidden("reports.detailed".to_string()));
        assert_eq!(DomainError::from(err), DomainError::Unauthorized);
    }

    #[test]
    fn explicit_grant_widens_history_scope() {
        let mut clerk = Principal::new(UserId::new(), Role::new("CLERK"));
        clerk.permissions.push(Permission::HISTORY_READ_ALL);
        assert_eq!(history_scope(&clerk), HistoryScope::All);
        assert!(authorize(&clerk, &Permission::REPORTS_DETAILED).is_err());
    }
}
