//! Infrastructure layer: storage, configuration and the ledger operations
//! that orchestrate the domain crates inside storage transactions.

pub mod config;
pub mod error;
pub mod job_workflow;
pub mod order_receiving;
pub mod reporting;
pub mod service_builder;
pub mod stock_ledger;
pub mod store;
pub mod workshop;

#[cfg(test)]
mod integration_tests;

pub use config::{
    DatabaseConfig, LedgerConfig, MissingPartPolicy, ReportingConfig, WorkshopConfig,
};
pub use error::{LedgerError, LedgerResult, StoreError, StoreResult};
pub use job_workflow::JobCompletion;
pub use reporting::{
    DateRange, GeneralStats, InventoryValuation, RevenuePoint, ServiceDistribution,
};
pub use store::{InMemoryStore, PostgresStore, RecordFilter, StoreTx, WorkshopStore};
pub use workshop::Workshop;
