//! Inventory domain module: part catalog entries and the stock ledger rules.
//!
//! Business rules only (no IO, no storage). Stock deltas are planned here and
//! applied by the infrastructure layer inside the caller's transaction.

pub mod movement;
pub mod part;

pub use movement::{
    NewStockMovement, OversellPolicy, StockMovement, StockSource, plan_decrement, plan_increment,
};
pub use part::{NewPart, Part, PartUpdate};
