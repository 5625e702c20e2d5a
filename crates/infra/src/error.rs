//! Infrastructure and ledger error types.

use thiserror::Error;

use workshop_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Storage failure.
///
/// These are infrastructure errors (connectivity, constraint violations,
/// unreadable rows) as opposed to business rule failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique constraint, stale version or serialization failure.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Error returned by every ledger operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for LedgerError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::Domain(DomainError::Conflict(msg)),
            other => LedgerError::Store(other),
        }
    }
}

impl From<workshop_auth::AuthzError> for LedgerError {
    fn from(value: workshop_auth::AuthzError) -> Self {
        LedgerError::Domain(value.into())
    }
}

impl LedgerError {
    /// The business-level error, if this is one.
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            LedgerError::Domain(e) => Some(e),
            LedgerError::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_surface_as_domain_conflicts() {
        let err = LedgerError::from(StoreError::Conflict("duplicate sku".to_string()));
        assert_eq!(
            err.domain(),
            Some(&DomainError::Conflict("duplicate sku".to_string()))
        );

        let err = LedgerError::from(StoreError::Corrupt("bad status".to_string()));
        assert!(err.domain().is_none());
    }
}
