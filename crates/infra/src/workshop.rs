//! The ledger facade.

use tracing::{info, instrument};

use crate::config::{LedgerConfig, ReportingConfig, WorkshopConfig};
use crate::error::StoreResult;
use crate::store::{PostgresStore, WorkshopStore};

/// Entry point for every ledger operation.
///
/// Operations are grouped by module (`service_builder`, `job_workflow`,
/// `order_receiving`, `stock_ledger`, `reporting`); each mutating operation
/// runs in exactly one storage transaction.
#[derive(Debug, Clone)]
pub struct Workshop<S> {
    pub(crate) store: S,
    pub(crate) ledger: LedgerConfig,
    pub(crate) reporting: ReportingConfig,
}

impl<S: WorkshopStore> Workshop<S> {
    /// A facade with default policies.
    pub fn new(store: S) -> Self {
        Self {
            store,
            ledger: LedgerConfig::default(),
            reporting: ReportingConfig::default(),
        }
    }

    pub fn with_ledger_config(mut self, ledger: LedgerConfig) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_reporting_config(mut self, reporting: ReportingConfig) -> Self {
        self.reporting = reporting;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn ledger_config(&self) -> LedgerConfig {
        self.ledger
    }
}

impl Workshop<PostgresStore> {
    /// Connect to Postgres, apply the schema and return a ready facade.
    #[instrument(skip_all, err)]
    pub async fn connect(config: &WorkshopConfig) -> StoreResult<Self> {
        let store = PostgresStore::connect(&config.database).await?;
        store.apply_schema().await?;

        info!(
            missing_part = ?config.ledger.missing_part,
            oversell = ?config.ledger.oversell,
            "workshop ledger ready"
        );
        Ok(Workshop::new(store)
            .with_ledger_config(config.ledger)
            .with_reporting_config(config.reporting))
    }
}
