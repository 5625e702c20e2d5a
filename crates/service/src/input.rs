//! Operation inputs for the service record builder.
//!
//! Inputs are validated and priced with [`CreateServiceRecord::prepare`]
//! before the caller opens a storage transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use workshop_core::{
    DomainError, DomainResult, MechanicId, PartId, ServiceRecordId, VehicleId, VendorId,
};
use workshop_pricing::{LineCharge, LinePricing, price_line};

use crate::record::{
    ItemType, NewLineItem, NewServiceRecord, ServiceRecord, ServiceStatus, VisitDetails,
};
use crate::vehicle::{VehicleDetails, non_blank, normalize_registration};

pub const DEFAULT_ISSUE_TYPE: &str = "Paid";
pub const DEFAULT_UOM: &str = "Nos";
pub const DEFAULT_SUBMITTER: &str = "Service Advisor";

/// One requested charge on a visit.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItemInput {
    pub item_type: ItemType,
    pub part_id: Option<PartId>,
    pub description: Option<String>,
    pub hsn_sac: Option<String>,
    pub issue_type: Option<String>,
    pub uom: Option<String>,
    /// Defaults to 1.
    pub quantity: Option<i64>,
    pub unit_price: Decimal,
    pub discount_percent: Option<Decimal>,
    pub discount_amount: Option<Decimal>,
    pub cgst_percent: Option<Decimal>,
    pub sgst_percent: Option<Decimal>,
    pub cess_percent: Option<Decimal>,
    pub vendor_id: Option<VendorId>,
}

impl LineItemInput {
    pub fn labor(description: impl Into<String>, unit_price: Decimal) -> Self {
        Self {
            item_type: ItemType::Labor,
            description: Some(description.into()),
            unit_price,
            ..Self::default()
        }
    }

    pub fn part(part_id: PartId, quantity: i64, unit_price: Decimal) -> Self {
        Self {
            item_type: ItemType::Part,
            part_id: Some(part_id),
            quantity: Some(quantity),
            unit_price,
            ..Self::default()
        }
    }

    fn prepare(&self) -> DomainResult<PreparedLine> {
        if self.item_type == ItemType::Part && self.part_id.is_none() {
            return Err(DomainError::invalid_input("PART line must reference a part"));
        }
        let quantity = self.quantity.unwrap_or(1);
        let pricing = price_line(&LineCharge {
            quantity,
            unit_price: self.unit_price,
            discount_percent: self.discount_percent,
            discount_amount: self.discount_amount,
            cgst_percent: self.cgst_percent.unwrap_or_default(),
            sgst_percent: self.sgst_percent.unwrap_or_default(),
            cess_percent: self.cess_percent.unwrap_or_default(),
        })?;

        Ok(PreparedLine {
            item_type: self.item_type,
            part_id: self.part_id,
            description: non_blank(&self.description),
            hsn_sac: non_blank(&self.hsn_sac).unwrap_or_default(),
            issue_type: non_blank(&self.issue_type)
                .unwrap_or_else(|| DEFAULT_ISSUE_TYPE.to_string()),
            uom: non_blank(&self.uom).unwrap_or_else(|| DEFAULT_UOM.to_string()),
            quantity,
            unit_price: self.unit_price,
            pricing,
            vendor_id: self.vendor_id,
        })
    }
}

/// A validated, priced line awaiting its record id and part resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedLine {
    pub item_type: ItemType,
    pub part_id: Option<PartId>,
    pub description: Option<String>,
    pub hsn_sac: String,
    pub issue_type: String,
    pub uom: String,
    pub quantity: i64,
    pub unit_price: Decimal,
    pub pricing: LinePricing,
    pub vendor_id: Option<VendorId>,
}

impl PreparedLine {
    /// Bind the line to its record.
    ///
    /// `part_id` is the resolved part (or `None` when the part was skipped);
    /// `fallback_description` is used when the input carried no description.
    pub fn into_new(
        self,
        service_record_id: ServiceRecordId,
        part_id: Option<PartId>,
        fallback_description: Option<&str>,
    ) -> NewLineItem {
        NewLineItem {
            service_record_id,
            item_type: self.item_type,
            part_id,
            description: self
                .description
                .or_else(|| fallback_description.map(str::to_string))
                .unwrap_or_default(),
            hsn_sac: self.hsn_sac,
            issue_type: self.issue_type,
            uom: self.uom,
            quantity: self.quantity,
            unit_price: self.unit_price,
            pricing: self.pricing,
            vendor_id: self.vendor_id,
        }
    }
}

/// Request to raise a PENDING job ticket from a new service record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    pub submitted_by: String,
    pub assigned_approver: Option<String>,
}

/// Input for `create_service_record`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateServiceRecord {
    /// Explicit vehicle; when absent the registration number in `vehicle` is
    /// used to find or create one.
    pub vehicle_id: Option<VehicleId>,
    pub vehicle: VehicleDetails,
    /// Visit date; defaults to now.
    pub date: Option<DateTime<Utc>>,
    pub status: Option<ServiceStatus>,
    pub details: VisitDetails,
    pub items: Vec<LineItemInput>,
    pub submit_to_job_board: bool,
    pub assigned_approver: Option<String>,
    pub submitted_by: Option<String>,
}

/// A validated `CreateServiceRecord` with every line priced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedServiceRecord {
    pub vehicle_id: Option<VehicleId>,
    pub vehicle: VehicleDetails,
    pub date: DateTime<Utc>,
    pub status: ServiceStatus,
    pub details: VisitDetails,
    pub lines: Vec<PreparedLine>,
    pub submission: Option<JobSubmission>,
}

impl PreparedServiceRecord {
    pub fn new_record(&self, vehicle_id: VehicleId) -> NewServiceRecord {
        NewServiceRecord {
            vehicle_id,
            date: self.date,
            status: self.status,
            details: self.details.clone(),
        }
    }
}

impl CreateServiceRecord {
    pub fn prepare(self, now: DateTime<Utc>) -> DomainResult<PreparedServiceRecord> {
        self.details.validate()?;

        let has_registration = self
            .vehicle
            .registration_number
            .as_deref()
            .and_then(normalize_registration)
            .is_some();
        if self.vehicle_id.is_none() && !has_registration {
            return Err(DomainError::VehicleRequired);
        }

        let lines = self
            .items
            .iter()
            .map(LineItemInput::prepare)
            .collect::<DomainResult<Vec<_>>>()?;

        let submission = (self.submit_to_job_board || self.assigned_approver.is_some()).then(|| {
            JobSubmission {
                submitted_by: non_blank(&self.submitted_by)
                    .unwrap_or_else(|| DEFAULT_SUBMITTER.to_string()),
                assigned_approver: self.assigned_approver.clone(),
            }
        });

        Ok(PreparedServiceRecord {
            vehicle_id: self.vehicle_id,
            vehicle: self.vehicle,
            date: self.date.unwrap_or(now),
            status: self.status.unwrap_or_default(),
            details: self.details,
            lines,
            submission,
        })
    }
}

/// Patch for `update_service_record`. `None` leaves a field unchanged.
///
/// Line items, stock and totals are never touched by an update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateServiceRecord {
    pub status: Option<ServiceStatus>,
    pub odometer: Option<i64>,
    pub service_type: Option<String>,
    pub fuel_level: Option<String>,
    pub service_advisor: Option<String>,
    pub complaint: Option<String>,
    pub mechanic_notes: Option<String>,
    pub estimated_date: Option<DateTime<Utc>>,
    pub images: Option<Vec<String>>,
    pub customer_signature: Option<String>,
    pub advisor_signature: Option<String>,
    pub mechanic_id: Option<MechanicId>,
}

impl UpdateServiceRecord {
    pub fn validate(&self) -> DomainResult<()> {
        if matches!(self.odometer, Some(o) if o < 0) {
            return Err(DomainError::invalid_input("odometer cannot be negative"));
        }
        Ok(())
    }

    pub fn apply_to(&self, record: &mut ServiceRecord) {
        let d = &mut record.details;
        if let Some(status) = self.status {
            record.status = status;
        }
        if let Some(odometer) = self.odometer {
            d.odometer = Some(odometer);
        }
        for (slot, value) in [
            (&mut d.service_type, &self.service_type),
            (&mut d.fuel_level, &self.fuel_level),
            (&mut d.service_advisor, &self.service_advisor),
            (&mut d.complaint, &self.complaint),
            (&mut d.mechanic_notes, &self.mechanic_notes),
            (&mut d.customer_signature, &self.customer_signature),
            (&mut d.advisor_signature, &self.advisor_signature),
        ] {
            if let Some(v) = value {
                *slot = Some(v.clone());
            }
        }
        if let Some(date) = self.estimated_date {
            d.estimated_date = Some(date);
        }
        if let Some(images) = &self.images {
            d.images = images.clone();
        }
        if let Some(mechanic_id) = self.mechanic_id {
            d.mechanic_id = Some(mechanic_id);
        }
    }
}
