use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use workshop_core::{
    DomainError, DomainResult, Entity, LineItemId, MechanicId, PartId, ServiceRecordId, VehicleId,
    VendorId,
};
use workshop_pricing::{LinePricing, sum_line_totals};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Pending => "PENDING",
            ServiceStatus::InProgress => "IN_PROGRESS",
            ServiceStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "PENDING" => Ok(ServiceStatus::Pending),
            "IN_PROGRESS" => Ok(ServiceStatus::InProgress),
            "COMPLETED" => Ok(ServiceStatus::Completed),
            other => Err(DomainError::invalid_input(format!(
                "unknown service status: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Part,
    #[default]
    Labor,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Part => "PART",
            ItemType::Labor => "LABOR",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "PART" => Ok(ItemType::Part),
            "LABOR" => Ok(ItemType::Labor),
            other => Err(DomainError::invalid_input(format!(
                "unknown item type: {other}"
            ))),
        }
    }
}

impl core::fmt::Display for ItemType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form visit fields; everything `update_service_record` may rewrite
/// apart from status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitDetails {
    pub odometer: Option<i64>,
    pub service_type: Option<String>,
    pub fuel_level: Option<String>,
    pub service_advisor: Option<String>,
    pub complaint: Option<String>,
    pub mechanic_notes: Option<String>,
    pub estimated_date: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub customer_signature: Option<String>,
    pub advisor_signature: Option<String>,
    pub mechanic_id: Option<MechanicId>,
}

impl VisitDetails {
    pub fn validate(&self) -> DomainResult<()> {
        if matches!(self.odometer, Some(o) if o < 0) {
            return Err(DomainError::invalid_input("odometer cannot be negative"));
        }
        Ok(())
    }
}

/// One workshop visit for one vehicle.
///
/// `total_cost` is a cache of the line totals and is only ever written by the
/// ledger together with the lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: ServiceRecordId,
    pub vehicle_id: VehicleId,
    pub date: DateTime<Utc>,
    pub status: ServiceStatus,
    pub details: VisitDetails,
    pub total_cost: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Entity for ServiceRecord {
    type Id = ServiceRecordId;

    fn id(&self) -> ServiceRecordId {
        self.id
    }
}

/// A record about to be inserted; stores create it with a zero total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewServiceRecord {
    pub vehicle_id: VehicleId,
    pub date: DateTime<Utc>,
    pub status: ServiceStatus,
    pub details: VisitDetails,
}

/// A priced charge on a service record. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLineItem {
    pub id: LineItemId,
    pub service_record_id: ServiceRecordId,
    pub item_type: ItemType,
    /// Set for `PART` lines whose part was resolved.
    pub part_id: Option<PartId>,
    pub description: String,
    pub hsn_sac: String,
    pub issue_type: String,
    pub uom: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub pricing: LinePricing,
    pub vendor_id: Option<VendorId>,
}

impl ServiceLineItem {
    pub fn line_total(&self) -> Decimal {
        self.pricing.line_total
    }
}

impl Entity for ServiceLineItem {
    type Id = LineItemId;

    fn id(&self) -> LineItemId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLineItem {
    pub service_record_id: ServiceRecordId,
    pub item_type: ItemType,
    pub part_id: Option<PartId>,
    pub description: String,
    pub hsn_sac: String,
    pub issue_type: String,
    pub uom: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub pricing: LinePricing,
    pub vendor_id: Option<VendorId>,
}

/// A record with its line items, as returned by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecordWithLines {
    pub record: ServiceRecord,
    pub lines: Vec<ServiceLineItem>,
}

impl ServiceRecordWithLines {
    /// Whether the cached total equals the sum of line totals.
    pub fn is_reconciled(&self) -> bool {
        sum_line_totals(self.lines.iter().map(|l| &l.pricing.line_total))
            .map(|sum| sum == self.record.total_cost.normalize())
            .unwrap_or(false)
    }
}

/// Job board number for the ticket raised from a service record.
pub fn job_number_for(record_id: ServiceRecordId) -> String {
    format!("JOB-{:04}", record_id.get())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use workshop_pricing::{LineCharge, price_line};

    #[test]
    fn job_numbers_are_zero_padded() {
        assert_eq!(job_number_for(ServiceRecordId::new(7)), "JOB-0007");
        assert_eq!(job_number_for(ServiceRecordId::new(12345)), "JOB-12345");
    }

    #[test]
    fn statuses_parse_their_wire_names() {
        assert_eq!(
            ServiceStatus::parse("IN_PROGRESS").unwrap(),
            ServiceStatus::InProgress
        );
        assert_eq!(ItemType::parse("PART").unwrap(), ItemType::Part);
        assert!(ServiceStatus::parse("DONE").is_err());
    }

    #[test]
    fn negative_odometer_is_invalid() {
        let details = VisitDetails {
            odometer: Some(-1),
            ..VisitDetails::default()
        };
        assert!(matches!(
            details.validate(),
            Err(DomainError::InvalidInput(_))
        ));
    }

    #[test]
    fn reconciliation_compares_cached_total() {
        let pricing = price_line(&LineCharge::flat(1, dec!(500))).unwrap();
        let line = ServiceLineItem {
            id: LineItemId::new(1),
            service_record_id: ServiceRecordId::new(1),
            item_type: ItemType::Labor,
            part_id: None,
            description: "Labour".to_string(),
            hsn_sac: String::new(),
            issue_type: "Paid".to_string(),
            uom: "Nos".to_string(),
            quantity: 1,
            unit_price: dec!(500),
            pricing,
            vendor_id: None,
        };
        let mut with_lines = ServiceRecordWithLines {
            record: ServiceRecord {
                id: ServiceRecordId::new(1),
                vehicle_id: VehicleId::new(1),
                date: Utc::now(),
                status: ServiceStatus::Completed,
                details: VisitDetails::default(),
                total_cost: dec!(500.00),
                created_at: Utc::now(),
            },
            lines: vec![line],
        };
        assert!(with_lines.is_reconciled());

        with_lines.record.total_cost = dec!(499);
        assert!(!with_lines.is_reconciled());
    }
}
