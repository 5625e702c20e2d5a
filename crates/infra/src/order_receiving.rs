//! Purchase order receiving: the move into `RECEIVED` adds every ordered part
//! to stock, once, in the same transaction as the status change.

use chrono::Utc;
use tracing::{info, instrument};

use workshop_core::{Aggregate, DomainError, Event, ExpectedVersion, PurchaseOrderId};
use workshop_purchasing::{
    NewPurchaseOrder, PurchaseOrder, PurchaseOrderCommand, PurchaseOrderEvent,
    PurchaseOrderStatus, UpdateStatus,
};

use crate::error::LedgerResult;
use crate::stock_ledger;
use crate::store::{StoreTx, WorkshopStore};
use crate::workshop::Workshop;

impl<S: WorkshopStore> Workshop<S> {
    /// Create a PENDING order with entries numbered from 1.
    #[instrument(skip_all, fields(supplier = %order.supplier, entries = order.entries.len()), err)]
    pub async fn create_order(&self, order: NewPurchaseOrder) -> LedgerResult<PurchaseOrder> {
        order.validate()?;
        let order_date = order.order_date.unwrap_or_else(Utc::now);

        let mut tx = self.store.begin().await?;
        let created = tx.insert_order(&order, order_date).await?;
        tx.commit().await?;

        info!(order_id = %created.id, "purchase order created");
        Ok(created)
    }

    /// Change an order's status.
    ///
    /// Only the edge into `RECEIVED` moves stock; setting `RECEIVED` again is
    /// a no-op and leaving `RECEIVED` is an `InvalidTransition`.
    #[instrument(skip(self), err)]
    pub async fn update_order_status(
        &self,
        id: PurchaseOrderId,
        new_status: PurchaseOrderStatus,
    ) -> LedgerResult<PurchaseOrder> {
        let mut tx = self.store.begin().await?;
        let mut order = tx
            .get_order(id)
            .await?
            .ok_or(DomainError::OrderNotFound(id))?;

        let expected = ExpectedVersion::Exact(order.version);
        let events = order.handle(&PurchaseOrderCommand::UpdateStatus(UpdateStatus {
            new_status,
            occurred_at: Utc::now(),
        }))?;

        for event in &events {
            if let PurchaseOrderEvent::GoodsReceived(received) = event {
                for (line_no, part_id, quantity) in received.stock_lines() {
                    stock_ledger::increment_for_order_receipt(
                        &mut tx, part_id, quantity, id, line_no,
                    )
                    .await?;
                }
            }
            order.apply(event);
            info!(order_id = %id, event_type = event.event_type(), status = %order.status, "purchase order transition");
        }

        if !events.is_empty() {
            tx.update_order(&order, expected).await?;
        }
        tx.commit().await?;
        Ok(order)
    }

    #[instrument(skip(self), err)]
    pub async fn get_order(&self, id: PurchaseOrderId) -> LedgerResult<PurchaseOrder> {
        let mut tx = self.store.begin().await?;
        let order = tx
            .get_order(id)
            .await?
            .ok_or(DomainError::OrderNotFound(id))?;
        tx.rollback().await?;
        Ok(order)
    }

    /// Delete an order. Stock already received stays.
    #[instrument(skip(self), err)]
    pub async fn delete_order(&self, id: PurchaseOrderId) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_order(id).await? {
            return Err(DomainError::OrderNotFound(id).into());
        }
        tx.commit().await?;

        info!(order_id = %id, "purchase order deleted");
        Ok(())
    }
}
