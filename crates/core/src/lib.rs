//! `workshop-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by every ledger
//! module (no infrastructure concerns).

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod event;
pub mod id;

pub use aggregate::{Aggregate, AggregateRoot, ExpectedVersion};
pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use event::Event;
pub use id::{
    CustomerId, JobId, LineItemId, MechanicId, PartId, PurchaseOrderId, ServiceRecordId, UserId,
    VehicleId, VendorId,
};
