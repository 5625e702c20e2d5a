use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use workshop_core::{
    ExpectedVersion, JobId, PartId, PurchaseOrderId, ServiceRecordId, UserId, VehicleId,
};
use workshop_inventory::{NewPart, NewStockMovement, Part, StockMovement};
use workshop_jobs::{JobTicket, NewJobTicket};
use workshop_purchasing::{NewPurchaseOrder, PurchaseOrder};
use workshop_service::{
    NewLineItem, NewServiceRecord, NewVehicle, ServiceLineItem, ServiceRecord, ServiceStatus,
    Vehicle,
};

use crate::error::StoreResult;

/// Filter for listing service records. Results are newest visit first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    /// Only records created at or after this instant.
    pub created_since: Option<DateTime<Utc>>,
    pub status: Option<ServiceStatus>,
    /// Only records of vehicles owned by this login.
    pub owner: Option<UserId>,
    pub limit: Option<usize>,
}

impl RecordFilter {
    pub fn matches(&self, record: &ServiceRecord, vehicle_owner: Option<UserId>) -> bool {
        self.created_since.is_none_or(|since| record.created_at >= since)
            && self.status.is_none_or(|s| record.status == s)
            && self.owner.is_none_or(|owner| vehicle_owner == Some(owner))
    }
}

/// Transactional storage collaborator for the ledger.
///
/// Every ledger operation runs inside one `StoreTx`. Implementations must:
/// - make all writes of a transaction visible atomically on `commit`
/// - discard every write on `rollback` or when the transaction is dropped
/// - serialize concurrent transactions (or detect conflicts and fail them)
#[async_trait]
pub trait WorkshopStore: Send + Sync {
    type Tx: StoreTx;

    async fn begin(&self) -> StoreResult<Self::Tx>;
}

/// One open storage transaction.
///
/// Lookups return `Ok(None)` for missing rows; deciding whether that is an
/// error is left to the caller.
#[async_trait]
pub trait StoreTx: Send + Sized {
    // Vehicles.
    async fn get_vehicle(&mut self, id: VehicleId) -> StoreResult<Option<Vehicle>>;
    /// `registration` must already be normalized.
    async fn find_vehicle_by_registration(
        &mut self,
        registration: &str,
    ) -> StoreResult<Option<Vehicle>>;
    /// Fails with `Conflict` on a duplicate registration number.
    async fn insert_vehicle(&mut self, vehicle: &NewVehicle) -> StoreResult<Vehicle>;
    async fn update_vehicle(&mut self, vehicle: &Vehicle) -> StoreResult<()>;

    // Service records and their lines.
    /// Inserts with `total_cost = 0`.
    async fn insert_service_record(&mut self, record: &NewServiceRecord)
    -> StoreResult<ServiceRecord>;
    async fn get_service_record(&mut self, id: ServiceRecordId)
    -> StoreResult<Option<ServiceRecord>>;
    /// Rewrites scalar fields; never `total_cost`.
    async fn update_service_record(&mut self, record: &ServiceRecord) -> StoreResult<()>;
    async fn set_service_total(&mut self, id: ServiceRecordId, total: Decimal) -> StoreResult<()>;
    async fn delete_service_record(&mut self, id: ServiceRecordId) -> StoreResult<bool>;
    async fn list_service_records(
        &mut self,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<ServiceRecord>>;
    async fn insert_line_item(&mut self, line: &NewLineItem) -> StoreResult<ServiceLineItem>;
    /// Lines of one record in insertion order.
    async fn list_line_items(
        &mut self,
        record_id: ServiceRecordId,
    ) -> StoreResult<Vec<ServiceLineItem>>;
    async fn delete_line_items(&mut self, record_id: ServiceRecordId) -> StoreResult<u64>;

    // Parts and stock.
    /// Fails with `Conflict` on a duplicate SKU.
    async fn insert_part(&mut self, part: &NewPart) -> StoreResult<Part>;
    async fn get_part(&mut self, id: PartId) -> StoreResult<Option<Part>>;
    /// Like `get_part`, but holds the row until the transaction ends.
    async fn lock_part(&mut self, id: PartId) -> StoreResult<Option<Part>>;
    async fn list_parts(&mut self) -> StoreResult<Vec<Part>>;
    /// Write catalog fields back. `stock` is never written here.
    /// Fails with `Conflict` on a duplicate SKU.
    async fn update_part(&mut self, part: &Part) -> StoreResult<()>;
    /// `Ok(false)` when the part does not exist; `Conflict` while line items
    /// or stock movements still reference it.
    async fn delete_part(&mut self, id: PartId) -> StoreResult<bool>;
    /// Atomically add `movement.delta` to the part's stock and record the
    /// movement. `Ok(None)` when the part does not exist; `Conflict` when the
    /// movement's source has already moved stock.
    async fn apply_stock_movement(
        &mut self,
        movement: &NewStockMovement,
    ) -> StoreResult<Option<StockMovement>>;
    async fn list_stock_movements(&mut self, part_id: PartId) -> StoreResult<Vec<StockMovement>>;

    // Job tickets.
    /// Fails with `Conflict` on a duplicate job number.
    async fn insert_job(&mut self, job: NewJobTicket) -> StoreResult<JobTicket>;
    async fn get_job(&mut self, id: JobId) -> StoreResult<Option<JobTicket>>;
    async fn find_job_by_number(&mut self, job_number: &str) -> StoreResult<Option<JobTicket>>;
    /// Writes the ticket back; `Conflict` when the stored version does not
    /// satisfy `expected`.
    async fn update_job(&mut self, job: &JobTicket, expected: ExpectedVersion) -> StoreResult<()>;
    async fn delete_job(&mut self, id: JobId) -> StoreResult<bool>;
    /// Newest submission first.
    async fn list_jobs(&mut self) -> StoreResult<Vec<JobTicket>>;

    // Purchase orders.
    async fn insert_order(
        &mut self,
        order: &NewPurchaseOrder,
        order_date: DateTime<Utc>,
    ) -> StoreResult<PurchaseOrder>;
    /// Loads and locks the order until the transaction ends.
    async fn get_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>>;
    async fn update_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()>;
    async fn delete_order(&mut self, id: PurchaseOrderId) -> StoreResult<bool>;

    async fn commit(self) -> StoreResult<()>;
    async fn rollback(self) -> StoreResult<()>;
}
