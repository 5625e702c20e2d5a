use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};

use workshop_core::{
    Entity, ExpectedVersion, JobId, LineItemId, PartId, PurchaseOrderId, ServiceRecordId,
    VehicleId,
};
use workshop_inventory::{NewPart, NewStockMovement, Part, StockMovement};
use workshop_jobs::{JobTicket, NewJobTicket};
use workshop_purchasing::{NewPurchaseOrder, PurchaseOrder, PurchaseOrderStatus};
use workshop_service::{
    NewLineItem, NewServiceRecord, NewVehicle, ServiceLineItem, ServiceRecord, Vehicle,
};

use super::r#trait::{RecordFilter, StoreTx, WorkshopStore};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct Sequences {
    vehicle: i64,
    record: i64,
    line: i64,
    part: i64,
    job: i64,
    order: i64,
}

/// Store a row under its own id and return it.
fn put<E: Entity + Clone>(table: &mut BTreeMap<E::Id, E>, row: E) -> E {
    table.insert(row.id(), row.clone());
    row
}

fn next(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Clone, Default)]
struct Tables {
    seq: Sequences,
    vehicles: BTreeMap<VehicleId, Vehicle>,
    records: BTreeMap<ServiceRecordId, ServiceRecord>,
    lines: BTreeMap<LineItemId, ServiceLineItem>,
    parts: BTreeMap<PartId, Part>,
    movements: Vec<StockMovement>,
    jobs: BTreeMap<JobId, JobTicket>,
    orders: BTreeMap<PurchaseOrderId, PurchaseOrder>,
}

/// In-memory workshop store.
///
/// Intended for tests/dev. Transactions are serialized behind one async
/// mutex; each works on a copy of the tables that replaces the shared state
/// on commit and is discarded otherwise.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkshopStore for InMemoryStore {
    type Tx = InMemoryTx;

    async fn begin(&self) -> StoreResult<InMemoryTx> {
        let guard = self.tables.clone().lock_owned().await;
        let work = (*guard).clone();
        Ok(InMemoryTx { guard, work })
    }
}

/// Transaction over an [`InMemoryStore`]; holds the store lock until it ends.
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    work: Tables,
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn get_vehicle(&mut self, id: VehicleId) -> StoreResult<Option<Vehicle>> {
        Ok(self.work.vehicles.get(&id).cloned())
    }

    async fn find_vehicle_by_registration(
        &mut self,
        registration: &str,
    ) -> StoreResult<Option<Vehicle>> {
        Ok(self
            .work
            .vehicles
            .values()
            .find(|v| v.registration_number == registration)
            .cloned())
    }

    async fn insert_vehicle(&mut self, vehicle: &NewVehicle) -> StoreResult<Vehicle> {
        if self
            .work
            .vehicles
            .values()
            .any(|v| v.registration_number == vehicle.registration_number)
        {
            return Err(StoreError::Conflict(format!(
                "vehicle {} already exists",
                vehicle.registration_number
            )));
        }
        let stored = Vehicle {
            id: VehicleId::new(next(&mut self.work.seq.vehicle)),
            registration_number: vehicle.registration_number.clone(),
            model: vehicle.model.clone(),
            vehicle_type: vehicle.vehicle_type,
            owner_name: vehicle.owner_name.clone(),
            owner_phone: vehicle.owner_phone.clone(),
            owner_address: vehicle.owner_address.clone(),
            owner_gstin: vehicle.owner_gstin.clone(),
            chassis_number: vehicle.chassis_number.clone(),
            engine_number: vehicle.engine_number.clone(),
            owner_user_id: vehicle.owner_user_id,
            customer_id: vehicle.customer_id,
            created_at: Utc::now(),
        };
        Ok(put(&mut self.work.vehicles, stored))
    }

    async fn update_vehicle(&mut self, vehicle: &Vehicle) -> StoreResult<()> {
        put(&mut self.work.vehicles, vehicle.clone());
        Ok(())
    }

    async fn insert_service_record(
        &mut self,
        record: &NewServiceRecord,
    ) -> StoreResult<ServiceRecord> {
        let stored = ServiceRecord {
            id: ServiceRecordId::new(next(&mut self.work.seq.record)),
            vehicle_id: record.vehicle_id,
            date: record.date,
            status: record.status,
            details: record.details.clone(),
            total_cost: Decimal::ZERO,
            created_at: Utc::now(),
        };
        Ok(put(&mut self.work.records, stored))
    }

    async fn get_service_record(
        &mut self,
        id: ServiceRecordId,
    ) -> StoreResult<Option<ServiceRecord>> {
        Ok(self.work.records.get(&id).cloned())
    }

    async fn update_service_record(&mut self, record: &ServiceRecord) -> StoreResult<()> {
        if let Some(stored) = self.work.records.get_mut(&record.id) {
            stored.date = record.date;
            stored.status = record.status;
            stored.details = record.details.clone();
        }
        Ok(())
    }

    async fn set_service_total(&mut self, id: ServiceRecordId, total: Decimal) -> StoreResult<()> {
        if let Some(stored) = self.work.records.get_mut(&id) {
            stored.total_cost = total;
        }
        Ok(())
    }

    async fn delete_service_record(&mut self, id: ServiceRecordId) -> StoreResult<bool> {
        Ok(self.work.records.remove(&id).is_some())
    }

    async fn list_service_records(
        &mut self,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<ServiceRecord>> {
        let mut records: Vec<ServiceRecord> = self
            .work
            .records
            .values()
            .filter(|r| {
                let owner = self
                    .work
                    .vehicles
                    .get(&r.vehicle_id)
                    .and_then(|v| v.owner_user_id);
                filter.matches(r, owner)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    async fn insert_line_item(&mut self, line: &NewLineItem) -> StoreResult<ServiceLineItem> {
        let stored = ServiceLineItem {
            id: LineItemId::new(next(&mut self.work.seq.line)),
            service_record_id: line.service_record_id,
            item_type: line.item_type,
            part_id: line.part_id,
            description: line.description.clone(),
            hsn_sac: line.hsn_sac.clone(),
            issue_type: line.issue_type.clone(),
            uom: line.uom.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            pricing: line.pricing.clone(),
            vendor_id: line.vendor_id,
        };
        Ok(put(&mut self.work.lines, stored))
    }

    async fn list_line_items(
        &mut self,
        record_id: ServiceRecordId,
    ) -> StoreResult<Vec<ServiceLineItem>> {
        Ok(self
            .work
            .lines
            .values()
            .filter(|l| l.service_record_id == record_id)
            .cloned()
            .collect())
    }

    async fn delete_line_items(&mut self, record_id: ServiceRecordId) -> StoreResult<u64> {
        let before = self.work.lines.len();
        self.work
            .lines
            .retain(|_, l| l.service_record_id != record_id);
        Ok(u64::try_from(before - self.work.lines.len()).unwrap_or(u64::MAX))
    }

    async fn insert_part(&mut self, part: &NewPart) -> StoreResult<Part> {
        if self.work.parts.values().any(|p| p.sku == part.sku) {
            return Err(StoreError::Conflict(format!(
                "part with SKU {} already exists",
                part.sku
            )));
        }
        let stored = Part {
            id: PartId::new(next(&mut self.work.seq.part)),
            sku: part.sku.clone(),
            name: part.name.clone(),
            category: part.category.clone().unwrap_or_default(),
            price: part.price,
            stock: part.stock,
            min_stock_level: part.min_stock_level.unwrap_or_default(),
            created_at: Utc::now(),
        };
        Ok(put(&mut self.work.parts, stored))
    }

    async fn get_part(&mut self, id: PartId) -> StoreResult<Option<Part>> {
        Ok(self.work.parts.get(&id).cloned())
    }

    async fn lock_part(&mut self, id: PartId) -> StoreResult<Option<Part>> {
        // The whole store is already locked by this transaction.
        self.get_part(id).await
    }

    async fn list_parts(&mut self) -> StoreResult<Vec<Part>> {
        Ok(self.work.parts.values().cloned().collect())
    }

    async fn update_part(&mut self, part: &Part) -> StoreResult<()> {
        if self
            .work
            .parts
            .values()
            .any(|p| p.id != part.id && p.sku == part.sku)
        {
            return Err(StoreError::Conflict(format!(
                "part with SKU {} already exists",
                part.sku
            )));
        }
        if let Some(stored) = self.work.parts.get_mut(&part.id) {
            stored.sku = part.sku.clone();
            stored.name = part.name.clone();
            stored.category = part.category.clone();
            stored.price = part.price;
            stored.min_stock_level = part.min_stock_level;
        }
        Ok(())
    }

    async fn delete_part(&mut self, id: PartId) -> StoreResult<bool> {
        let referenced = self.work.lines.values().any(|l| l.part_id == Some(id))
            || self.work.movements.iter().any(|m| m.part_id == id);
        if referenced {
            return Err(StoreError::Conflict(format!(
                "part {id} is referenced by line items or stock movements"
            )));
        }
        Ok(self.work.parts.remove(&id).is_some())
    }

    async fn apply_stock_movement(
        &mut self,
        movement: &NewStockMovement,
    ) -> StoreResult<Option<StockMovement>> {
        if self
            .work
            .movements
            .iter()
            .any(|m| m.source == movement.source)
        {
            return Err(StoreError::Conflict(format!(
                "stock already moved for {}",
                movement.source.key()
            )));
        }
        let Some(part) = self.work.parts.get_mut(&movement.part_id) else {
            return Ok(None);
        };
        part.stock = part.stock.checked_add(movement.delta).ok_or_else(|| {
            StoreError::Conflict(format!("stock overflow for part {}", movement.part_id))
        })?;

        let applied = StockMovement {
            part_id: movement.part_id,
            delta: movement.delta,
            stock_after: part.stock,
            source: movement.source,
            occurred_at: Utc::now(),
        };
        self.work.movements.push(applied.clone());
        Ok(Some(applied))
    }

    async fn list_stock_movements(&mut self, part_id: PartId) -> StoreResult<Vec<StockMovement>> {
        Ok(self
            .work
            .movements
            .iter()
            .filter(|m| m.part_id == part_id)
            .cloned()
            .collect())
    }

    async fn insert_job(&mut self, job: NewJobTicket) -> StoreResult<JobTicket> {
        if self
            .work
            .jobs
            .values()
            .any(|j| j.job_number == job.submission.job_number)
        {
            return Err(StoreError::Conflict(format!(
                "job {} already exists",
                job.submission.job_number
            )));
        }
        let ticket = job.into_ticket(JobId::new(next(&mut self.work.seq.job)));
        self.work.jobs.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    async fn get_job(&mut self, id: JobId) -> StoreResult<Option<JobTicket>> {
        Ok(self.work.jobs.get(&id).cloned())
    }

    async fn find_job_by_number(&mut self, job_number: &str) -> StoreResult<Option<JobTicket>> {
        Ok(self
            .work
            .jobs
            .values()
            .find(|j| j.job_number == job_number)
            .cloned())
    }

    async fn update_job(&mut self, job: &JobTicket, expected: ExpectedVersion) -> StoreResult<()> {
        let stored = self
            .work
            .jobs
            .get_mut(&job.id)
            .ok_or_else(|| StoreError::Conflict(format!("job {} no longer exists", job.id)))?;
        if !expected.matches(stored.version) {
            return Err(StoreError::Conflict(format!(
                "job {}: expected {expected:?}, found {}",
                job.id, stored.version
            )));
        }
        *stored = job.clone();
        Ok(())
    }

    async fn delete_job(&mut self, id: JobId) -> StoreResult<bool> {
        Ok(self.work.jobs.remove(&id).is_some())
    }

    async fn list_jobs(&mut self) -> StoreResult<Vec<JobTicket>> {
        let mut jobs: Vec<JobTicket> = self.work.jobs.values().cloned().collect();
        jobs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));
        Ok(jobs)
    }

    async fn insert_order(
        &mut self,
        order: &NewPurchaseOrder,
        order_date: DateTime<Utc>,
    ) -> StoreResult<PurchaseOrder> {
        let stored = PurchaseOrder {
            id: PurchaseOrderId::new(next(&mut self.work.seq.order)),
            supplier: order.supplier.trim().to_string(),
            vendor_id: order.vendor_id,
            order_date,
            status: PurchaseOrderStatus::Pending,
            entries: order.numbered_entries(),
            version: 0,
        };
        self.work.orders.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn get_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        Ok(self.work.orders.get(&id).cloned())
    }

    async fn update_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let stored = self.work.orders.get_mut(&order.id).ok_or_else(|| {
            StoreError::Conflict(format!("purchase order {} no longer exists", order.id))
        })?;
        if !expected.matches(stored.version) {
            return Err(StoreError::Conflict(format!(
                "purchase order {}: expected {expected:?}, found {}",
                order.id, stored.version
            )));
        }
        *stored = order.clone();
        Ok(())
    }

    async fn delete_order(&mut self, id: PurchaseOrderId) -> StoreResult<bool> {
        Ok(self.work.orders.remove(&id).is_some())
    }

    async fn commit(self) -> StoreResult<()> {
        let InMemoryTx { mut guard, work } = self;
        *guard = work;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use workshop_inventory::StockSource;

    fn new_part(sku: &str) -> NewPart {
        NewPart {
            sku: sku.to_string(),
            name: "Brake pad".to_string(),
            category: Some("Brakes".to_string()),
            price: dec!(450),
            stock: 50,
            min_stock_level: Some(5),
        }
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let store = InMemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_part(&new_part("BRK-1")).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        assert!(tx.list_parts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let part = tx.insert_part(&new_part("BRK-1")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.get_part(part.id).await.unwrap(), Some(part));
    }

    #[tokio::test]
    async fn vehicle_update_replaces_the_row_with_the_same_id() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let details = workshop_service::VehicleDetails {
            registration_number: Some("KA01AB1234".to_string()),
            ..Default::default()
        };
        let mut vehicle = tx
            .insert_vehicle(&NewVehicle::from_details(&details).unwrap())
            .await
            .unwrap();

        vehicle.model = "Swift".to_string();
        tx.update_vehicle(&vehicle).await.unwrap();

        assert_eq!(tx.work.vehicles.len(), 1);
        assert_eq!(tx.get_vehicle(vehicle.id).await.unwrap(), Some(vehicle));
    }

    #[tokio::test]
    async fn duplicate_sku_conflicts() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_part(&new_part("BRK-1")).await.unwrap();
        let err = tx.insert_part(&new_part("BRK-1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn movement_source_is_unique() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let part = tx.insert_part(&new_part("BRK-1")).await.unwrap();
        let movement = NewStockMovement {
            part_id: part.id,
            delta: -3,
            source: StockSource::LineItem {
                line_item_id: LineItemId::new(1),
            },
        };

        let applied = tx.apply_stock_movement(&movement).await.unwrap().unwrap();
        assert_eq!(applied.stock_after, 47);

        let err = tx.apply_stock_movement(&movement).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        assert_eq!(tx.get_part(part.id).await.unwrap().unwrap().stock, 47);
    }

    #[tokio::test]
    async fn movement_for_missing_part_is_none() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let applied = tx
            .apply_stock_movement(&NewStockMovement {
                part_id: PartId::new(99),
                delta: 5,
                source: StockSource::OrderReceipt {
                    order_id: PurchaseOrderId::new(1),
                    line_no: 1,
                },
            })
            .await
            .unwrap();
        assert!(applied.is_none());
    }
}
