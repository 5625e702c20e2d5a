//! Storage collaborator for the ledger.
//!
//! One transactional trait, a Postgres implementation and an in-memory one
//! for tests and local development.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::{InMemoryStore, InMemoryTx};
pub use postgres::{PgTx, PostgresStore};
pub use r#trait::{RecordFilter, StoreTx, WorkshopStore};
