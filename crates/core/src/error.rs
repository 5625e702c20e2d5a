//! Domain error model.

use thiserror::Error;

use crate::id::{PartId, PurchaseOrderId};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic, business-level failures only. Storage failures are modelled
/// in the infrastructure layer and wrapped alongside these.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Bad numeric/enum/text input, caught before any mutation.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A service visit could not be tied to a vehicle.
    #[error("vehicle registration number is required")]
    VehicleRequired,

    #[error("part {0} not found")]
    PartNotFound(PartId),

    #[error("purchase order {0} not found")]
    OrderNotFound(PurchaseOrderId),

    /// A workflow action was attempted from a state that does not allow it.
    #[error("cannot {action} {entity} in state {from}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        action: &'static str,
    },

    /// Generic record lookup miss.
    #[error("{0} not found")]
    NotFound(String),

    /// A decrement would oversell a part while overselling is disabled.
    #[error("insufficient stock for part {part_id}: available {available}, requested {requested}")]
    InsufficientStock {
        part_id: PartId,
        available: i64,
        requested: i64,
    },

    /// Uniqueness or concurrency conflict (duplicate SKU, stale version, ...).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The acting principal may not perform this read.
    #[error("unauthorized")]
    Unauthorized,
}

impl DomainError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_transition(
        entity: &'static str,
        from: impl core::fmt::Display,
        action: &'static str,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            action,
        }
    }
}
