use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use workshop_core::{DomainError, DomainResult, LineItemId, PartId, PurchaseOrderId};

use crate::part::Part;

/// What caused a stock delta.
///
/// A source may move stock at most once; stores reject a second movement with
/// the same source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockSource {
    /// Part consumed by a service line item.
    LineItem { line_item_id: LineItemId },
    /// Part received on a purchase order line.
    OrderReceipt {
        order_id: PurchaseOrderId,
        line_no: u32,
    },
}

impl StockSource {
    pub fn kind(&self) -> &'static str {
        match self {
            StockSource::LineItem { .. } => "line_item",
            StockSource::OrderReceipt { .. } => "order_receipt",
        }
    }

    /// Stable uniqueness key, e.g. `line_item:12` or `order_receipt:3:1`.
    pub fn key(&self) -> String {
        match self {
            StockSource::LineItem { line_item_id } => format!("line_item:{line_item_id}"),
            StockSource::OrderReceipt { order_id, line_no } => {
                format!("order_receipt:{order_id}:{line_no}")
            }
        }
    }
}

/// Whether a decrement may take stock below zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OversellPolicy {
    /// Decrement unconditionally; negative stock is a reporting signal.
    #[default]
    Allow,
    /// Refuse decrements that would leave negative stock.
    Reject,
}

/// A planned stock delta, applied atomically by the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewStockMovement {
    pub part_id: PartId,
    pub delta: i64,
    pub source: StockSource,
}

/// A stock delta that has been applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockMovement {
    pub part_id: PartId,
    pub delta: i64,
    pub stock_after: i64,
    pub source: StockSource,
    pub occurred_at: DateTime<Utc>,
}

/// Plan the decrement for a part consumed by one line item.
pub fn plan_decrement(
    part: &Part,
    quantity: i64,
    line_item_id: LineItemId,
    policy: OversellPolicy,
) -> DomainResult<NewStockMovement> {
    if quantity < 0 {
        return Err(DomainError::invalid_input("quantity cannot be negative"));
    }
    if policy == OversellPolicy::Reject && part.stock < quantity {
        return Err(DomainError::InsufficientStock {
            part_id: part.id,
            available: part.stock,
            requested: quantity,
        });
    }
    Ok(NewStockMovement {
        part_id: part.id,
        delta: -quantity,
        source: StockSource::LineItem { line_item_id },
    })
}

/// Plan the increment for one received purchase order line.
pub fn plan_increment(
    part_id: PartId,
    quantity: i64,
    order_id: PurchaseOrderId,
    line_no: u32,
) -> DomainResult<NewStockMovement> {
    if quantity < 0 {
        return Err(DomainError::invalid_input("quantity cannot be negative"));
    }
    Ok(NewStockMovement {
        part_id,
        delta: quantity,
        source: StockSource::OrderReceipt { order_id, line_no },
    })
}
