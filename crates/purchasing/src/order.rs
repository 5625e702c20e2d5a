use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use workshop_core::{
    Aggregate, AggregateRoot, DomainError, DomainResult, Event, PartId, PurchaseOrderId,
    VendorId,
};

/// Purchase order status lifecycle. `Received` is one-way.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseOrderStatus {
    #[default]
    Pending,
    Ordered,
    Received,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseOrderStatus::Pending => "PENDING",
            PurchaseOrderStatus::Ordered => "ORDERED",
            PurchaseOrderStatus::Received => "RECEIVED",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "PENDING" => Ok(PurchaseOrderStatus::Pending),
            "ORDERED" => Ok(PurchaseOrderStatus::Ordered),
            "RECEIVED" => Ok(PurchaseOrderStatus::Received),
            other => Err(DomainError::invalid_input(format!(
                "unknown order status: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Purchase order entry. Entries without a part are free-text lines and never
/// move stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEntry {
    pub line_no: u32,
    pub part_id: Option<PartId>,
    pub quantity: i64,
}

/// Aggregate root: PurchaseOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub id: PurchaseOrderId,
    pub supplier: String,
    pub vendor_id: Option<VendorId>,
    pub order_date: DateTime<Utc>,
    pub status: PurchaseOrderStatus,
    pub entries: Vec<OrderEntry>,
    pub version: u64,
}

impl AggregateRoot for PurchaseOrder {
    type Id = PurchaseOrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderEntry {
    pub part_id: Option<PartId>,
    pub quantity: i64,
}

/// Input for creating a purchase order; it always starts `PENDING`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPurchaseOrder {
    pub supplier: String,
    pub vendor_id: Option<VendorId>,
    /// Defaults to the creation time.
    pub order_date: Option<DateTime<Utc>>,
    pub entries: Vec<NewOrderEntry>,
}

impl NewPurchaseOrder {
    pub fn validate(&self) -> DomainResult<()> {
        if self.supplier.trim().is_empty() {
            return Err(DomainError::invalid_input("supplier is required"));
        }
        if self.entries.is_empty() {
            return Err(DomainError::invalid_input(
                "purchase order needs at least one entry",
            ));
        }
        if self.entries.iter().any(|e| e.quantity <= 0) {
            return Err(DomainError::invalid_input("quantity must be positive"));
        }
        Ok(())
    }

    /// Entries numbered from 1 in input order.
    pub fn numbered_entries(&self) -> Vec<OrderEntry> {
        self.entries
            .iter()
            .zip(1u32..)
            .map(|(e, line_no)| OrderEntry {
                line_no,
                part_id: e.part_id,
                quantity: e.quantity,
            })
            .collect()
    }
}

/// Command: UpdateStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStatus {
    pub new_status: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderCommand {
    UpdateStatus(UpdateStatus),
}

/// Event: OrderStatusChanged (any move that is not into `RECEIVED`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub to: PurchaseOrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: GoodsReceived.
///
/// Carries the entries whose quantities must be added to stock, exactly once
/// per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoodsReceived {
    pub order_id: PurchaseOrderId,
    pub from: PurchaseOrderStatus,
    pub entries: Vec<OrderEntry>,
    pub occurred_at: DateTime<Utc>,
}

impl GoodsReceived {
    /// `(line_no, part, quantity)` for every entry that names a part.
    pub fn stock_lines(&self) -> impl Iterator<Item = (u32, PartId, i64)> + '_ {
        self.entries
            .iter()
            .filter_map(|e| e.part_id.map(|p| (e.line_no, p, e.quantity)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderEvent {
    StatusChanged(OrderStatusChanged),
    GoodsReceived(GoodsReceived),
}

impl Event for PurchaseOrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PurchaseOrderEvent::StatusChanged(_) => "purchasing.order.status_changed",
            PurchaseOrderEvent::GoodsReceived(_) => "purchasing.order.goods_received",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PurchaseOrderEvent::StatusChanged(e) => e.occurred_at,
            PurchaseOrderEvent::GoodsReceived(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PurchaseOrder {
    type Command = PurchaseOrderCommand;
    type Event = PurchaseOrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PurchaseOrderEvent::StatusChanged(e) => {
                self.status = e.to;
            }
            PurchaseOrderEvent::GoodsReceived(_) => {
                self.status = PurchaseOrderStatus::Received;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PurchaseOrderCommand::UpdateStatus(cmd) => self.handle_update_status(cmd),
        }
    }
}

impl PurchaseOrder {
    fn handle_update_status(
        &self,
        cmd: &UpdateStatus,
    ) -> Result<Vec<PurchaseOrderEvent>, DomainError> {
        use PurchaseOrderStatus::Received;

        match (self.status, cmd.new_status) {
            // Same status (including RECEIVED -> RECEIVED) is a no-op.
            (from, to) if from == to => Ok(Vec::new()),
            (Received, _) => Err(DomainError::invalid_transition(
                "purchase order",
                self.status,
                "reopen",
            )),
            (from, Received) => Ok(vec![PurchaseOrderEvent::GoodsReceived(GoodsReceived {
                order_id: self.id,
                from,
                entries: self.entries.clone(),
                occurred_at: cmd.occurred_at,
            })]),
            (from, to) => Ok(vec![PurchaseOrderEvent::StatusChanged(OrderStatusChanged {
                order_id: self.id,
                from,
                to,
                occurred_at: cmd.occurred_at,
            })]),
        }
    }
}
