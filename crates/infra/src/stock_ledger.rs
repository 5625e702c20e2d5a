//! Inventory stock ledger: every stock change is one recorded movement.
//!
//! The decrement/increment helpers run inside a caller-owned transaction; the
//! part catalog operations open their own.

use tracing::{info, instrument};

use workshop_core::{DomainError, LineItemId, PartId, PurchaseOrderId};
use workshop_inventory::{
    NewPart, OversellPolicy, Part, PartUpdate, StockMovement, plan_decrement, plan_increment,
};

use crate::error::LedgerResult;
use crate::store::{StoreTx, WorkshopStore};
use crate::workshop::Workshop;

/// Take `quantity` units of a part out of stock for one line item.
///
/// Fails with `PartNotFound` when the part does not exist, and with
/// `InsufficientStock` when `policy` forbids overselling.
#[instrument(skip(tx), err)]
pub async fn decrement_for_line_item<T: StoreTx>(
    tx: &mut T,
    part_id: PartId,
    quantity: i64,
    line_item_id: LineItemId,
    policy: OversellPolicy,
) -> LedgerResult<StockMovement> {
    let part = tx
        .lock_part(part_id)
        .await?
        .ok_or(DomainError::PartNotFound(part_id))?;
    let movement = plan_decrement(&part, quantity, line_item_id, policy)?;
    let applied = tx
        .apply_stock_movement(&movement)
        .await?
        .ok_or(DomainError::PartNotFound(part_id))?;

    info!(
        part_id = %part_id,
        delta = applied.delta,
        stock_after = applied.stock_after,
        "stock decremented"
    );
    Ok(applied)
}

/// Add `quantity` units of a part received on one purchase order line.
#[instrument(skip(tx), err)]
pub async fn increment_for_order_receipt<T: StoreTx>(
    tx: &mut T,
    part_id: PartId,
    quantity: i64,
    order_id: PurchaseOrderId,
    line_no: u32,
) -> LedgerResult<StockMovement> {
    let movement = plan_increment(part_id, quantity, order_id, line_no)?;
    let applied = tx
        .apply_stock_movement(&movement)
        .await?
        .ok_or(DomainError::PartNotFound(part_id))?;

    info!(
        part_id = %part_id,
        delta = applied.delta,
        stock_after = applied.stock_after,
        "stock incremented"
    );
    Ok(applied)
}

impl<S: WorkshopStore> Workshop<S> {
    /// Add a part to the catalog. SKUs are unique.
    #[instrument(skip_all, fields(sku = %part.sku), err)]
    pub async fn create_part(&self, part: NewPart) -> LedgerResult<Part> {
        let part = part.normalized()?;
        let mut tx = self.store.begin().await?;
        let created = tx.insert_part(&part).await?;
        tx.commit().await?;

        info!(part_id = %created.id, "part created");
        Ok(created)
    }

    #[instrument(skip(self), err)]
    pub async fn get_part(&self, id: PartId) -> LedgerResult<Part> {
        let mut tx = self.store.begin().await?;
        let part = tx.get_part(id).await?.ok_or(DomainError::PartNotFound(id))?;
        tx.rollback().await?;
        Ok(part)
    }

    #[instrument(skip(self), err)]
    pub async fn list_parts(&self) -> LedgerResult<Vec<Part>> {
        let mut tx = self.store.begin().await?;
        let parts = tx.list_parts().await?;
        tx.rollback().await?;
        Ok(parts)
    }

    /// Edit catalog fields. Stock only changes through movements.
    #[instrument(skip(self, update), err)]
    pub async fn update_part(&self, id: PartId, update: PartUpdate) -> LedgerResult<Part> {
        let mut tx = self.store.begin().await?;
        let mut part = tx.get_part(id).await?.ok_or(DomainError::PartNotFound(id))?;
        update.apply_to(&mut part)?;
        tx.update_part(&part).await?;
        tx.commit().await?;

        info!(part_id = %id, sku = %part.sku, "part updated");
        Ok(part)
    }

    /// Remove a part that no line item or stock movement references.
    #[instrument(skip(self), err)]
    pub async fn delete_part(&self, id: PartId) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_part(id).await? {
            return Err(DomainError::PartNotFound(id).into());
        }
        tx.commit().await?;

        info!(part_id = %id, "part deleted");
        Ok(())
    }

    /// Movements applied to one part, oldest first.
    #[instrument(skip(self), err)]
    pub async fn stock_movements(&self, part_id: PartId) -> LedgerResult<Vec<StockMovement>> {
        let mut tx = self.store.begin().await?;
        let movements = tx.list_stock_movements(part_id).await?;
        tx.rollback().await?;
        Ok(movements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;

    fn brake_pad(stock: i64) -> NewPart {
        NewPart {
            sku: "BRK-001".to_string(),
            name: "Brake pad".to_string(),
            category: None,
            price: dec!(450),
            stock,
            min_stock_level: None,
        }
    }

    async fn seeded(stock: i64) -> (InMemoryStore, Part) {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let part = tx
            .insert_part(&brake_pad(stock).normalized().unwrap())
            .await
            .unwrap();
        tx.commit().await.unwrap();
        (store, part)
    }

    #[tokio::test]
    async fn decrement_records_movement() {
        let (store, part) = seeded(50).await;
        let mut tx = store.begin().await.unwrap();
        let movement = decrement_for_line_item(
            &mut tx,
            part.id,
            3,
            LineItemId::new(1),
            OversellPolicy::Allow,
        )
        .await
        .unwrap();
        assert_eq!(movement.stock_after, 47);
        assert_eq!(tx.list_stock_movements(part.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn oversell_is_allowed_by_default() {
        let (store, part) = seeded(2).await;
        let mut tx = store.begin().await.unwrap();
        let movement = decrement_for_line_item(
            &mut tx,
            part.id,
            5,
            LineItemId::new(1),
            OversellPolicy::default(),
        )
        .await
        .unwrap();
        assert_eq!(movement.stock_after, -3);
    }

    #[tokio::test]
    async fn oversell_reject_leaves_stock_alone() {
        let (store, part) = seeded(2).await;
        let mut tx = store.begin().await.unwrap();
        let err = decrement_for_line_item(
            &mut tx,
            part.id,
            5,
            LineItemId::new(1),
            OversellPolicy::Reject,
        )
        .await
        .unwrap_err();

        match err.domain() {
            Some(DomainError::InsufficientStock {
                available,
                requested,
                ..
            }) => {
                assert_eq!(*available, 2);
                assert_eq!(*requested, 5);
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(tx.get_part(part.id).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn missing_part_is_part_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = increment_for_order_receipt(&mut tx, PartId::new(7), 10, PurchaseOrderId::new(1), 1)
            .await
            .unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::PartNotFound(PartId::new(7))));
    }

    #[tokio::test]
    async fn second_movement_for_same_line_conflicts() {
        let (store, part) = seeded(50).await;
        let mut tx = store.begin().await.unwrap();
        decrement_for_line_item(&mut tx, part.id, 3, LineItemId::new(1), OversellPolicy::Allow)
            .await
            .unwrap();
        let err = decrement_for_line_item(
            &mut tx,
            part.id,
            3,
            LineItemId::new(1),
            OversellPolicy::Allow,
        )
        .await
        .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
        assert_eq!(tx.get_part(part.id).await.unwrap().unwrap().stock, 47);
    }

    #[tokio::test]
    async fn catalog_rejects_duplicate_sku() {
        let workshop = Workshop::new(InMemoryStore::new());
        let created = workshop.create_part(brake_pad(10)).await.unwrap();
        assert_eq!(created.category, "General");
        assert_eq!(created.min_stock_level, 5);

        let err = workshop.create_part(brake_pad(4)).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
        assert_eq!(workshop.list_parts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn catalog_edits_never_touch_stock() {
        let workshop = Workshop::new(InMemoryStore::new());
        let part = workshop.create_part(brake_pad(12)).await.unwrap();

        let updated = workshop
            .update_part(
                part.id,
                PartUpdate {
                    name: Some("Ceramic brake pad".to_string()),
                    price: Some(dec!(520)),
                    ..PartUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Ceramic brake pad");
        assert_eq!(updated.stock, 12);
        assert_eq!(workshop.get_part(part.id).await.unwrap(), updated);

        let err = workshop
            .update_part(PartId::new(99), PartUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::PartNotFound(PartId::new(99))));
    }

    #[tokio::test]
    async fn sku_edits_stay_unique() {
        let workshop = Workshop::new(InMemoryStore::new());
        workshop.create_part(brake_pad(1)).await.unwrap();
        let other = workshop
            .create_part(NewPart {
                sku: "BRK-002".to_string(),
                ..brake_pad(1)
            })
            .await
            .unwrap();

        let err = workshop
            .update_part(
                other.id,
                PartUpdate {
                    sku: Some("BRK-001".to_string()),
                    ..PartUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
        assert_eq!(workshop.get_part(other.id).await.unwrap().sku, "BRK-002");
    }

    #[tokio::test]
    async fn parts_with_movements_cannot_be_deleted() {
        let workshop = Workshop::new(InMemoryStore::new());
        let unused = workshop.create_part(brake_pad(5)).await.unwrap();
        workshop.delete_part(unused.id).await.unwrap();
        let err = workshop.get_part(unused.id).await.unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::PartNotFound(unused.id)));

        let used = workshop.create_part(brake_pad(5)).await.unwrap();
        let mut tx = workshop.store().begin().await.unwrap();
        decrement_for_line_item(&mut tx, used.id, 1, LineItemId::new(1), OversellPolicy::Allow)
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let err = workshop.delete_part(used.id).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::Conflict(_))));
        assert_eq!(workshop.get_part(used.id).await.unwrap().stock, 4);
    }
}
