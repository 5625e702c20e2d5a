//! Purchasing domain module (supplier purchase orders).
//!
//! This crate contains business rules for purchase orders, implemented purely as
//! deterministic domain logic (no IO, no storage). Receiving an order emits a
//! `GoodsReceived` event that the infrastructure layer turns into stock
//! increments.

pub mod order;

pub use order::{
    GoodsReceived, NewOrderEntry, NewPurchaseOrder, OrderEntry, OrderStatusChanged,
    PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent, PurchaseOrderStatus, UpdateStatus,
};
