//! `workshop-auth`: "who is calling" for the ledger's RBAC-gated reads.
//!
//! Session lookup happens elsewhere; this crate only models the resolved
//! principal and the pure policy checks made against it.

pub mod authorize;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, HistoryScope, authorize, history_scope, role_permissions};
pub use permissions::Permission;
pub use principal::Principal;
pub use roles::Role;
