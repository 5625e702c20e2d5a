//! Service record builder: turns a visit into a record with priced lines,
//! stock effects and (optionally) a job board ticket, all in one transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument, warn};

use workshop_core::{DomainError, ServiceRecordId, VehicleId};
use workshop_inventory::OversellPolicy;
use workshop_jobs::{JobTicket, Priority, SubmitJob};
use workshop_pricing::{LineCharge, price_line, sum_line_totals};
use workshop_service::input::{DEFAULT_ISSUE_TYPE, DEFAULT_UOM};
use workshop_service::{
    CreateServiceRecord, ItemType, JobSubmission, NewLineItem, NewServiceRecord, NewVehicle,
    PreparedLine, ServiceLineItem, ServiceRecord, ServiceRecordWithLines, ServiceStatus,
    UpdateServiceRecord, Vehicle, VehicleDetails, VisitDetails, job_number_for,
    normalize_registration,
};

use crate::config::MissingPartPolicy;
use crate::error::LedgerResult;
use crate::job_workflow;
use crate::stock_ledger;
use crate::store::{StoreTx, WorkshopStore};
use crate::workshop::Workshop;

const DEFAULT_REPAIR_TYPE: &str = "General";
const DEFAULT_JOB_DESCRIPTION: &str = "No description";
const AUTO_JOB_NOTES: &str = "Auto-generated from Service Record";

impl<S: WorkshopStore> Workshop<S> {
    /// Record a visit: resolve the vehicle, price and persist every line,
    /// take parts out of stock, cache the total and optionally raise a
    /// PENDING job ticket.
    ///
    /// Input is validated before the transaction opens; any later failure
    /// rolls back every effect.
    #[instrument(
        skip_all,
        fields(vehicle_id = ?input.vehicle_id, items = input.items.len()),
        err
    )]
    pub async fn create_service_record(
        &self,
        input: CreateServiceRecord,
    ) -> LedgerResult<ServiceRecordWithLines> {
        let now = Utc::now();
        let prepared = input.prepare(now)?;

        let mut tx = self.store.begin().await?;
        let vehicle = resolve_vehicle(&mut tx, prepared.vehicle_id, &prepared.vehicle).await?;
        let mut record = tx
            .insert_service_record(&prepared.new_record(vehicle.id))
            .await?;

        let mut lines = Vec::with_capacity(prepared.lines.len());
        for line in prepared.lines {
            let persisted = persist_line(
                &mut tx,
                record.id,
                line,
                self.ledger.missing_part,
                self.ledger.oversell,
            )
            .await?;
            lines.push(persisted);
        }

        let total = sum_line_totals(lines.iter().map(|l| &l.pricing.line_total))?;
        tx.set_service_total(record.id, total).await?;
        record.total_cost = total;

        if let Some(submission) = &prepared.submission {
            let ticket = submit_for_record(&mut tx, &record, &vehicle, submission, now).await?;
            info!(job_id = %ticket.id, job_number = %ticket.job_number, "job submitted from service record");
        }

        tx.commit().await?;

        info!(
            record_id = %record.id,
            vehicle_id = %vehicle.id,
            lines = lines.len(),
            total = %total,
            "service record created"
        );
        Ok(ServiceRecordWithLines { record, lines })
    }

    /// Rewrite scalar visit fields. Lines, stock and totals are untouched.
    #[instrument(skip(self, patch), err)]
    pub async fn update_service_record(
        &self,
        id: ServiceRecordId,
        patch: UpdateServiceRecord,
    ) -> LedgerResult<ServiceRecord> {
        patch.validate()?;

        let mut tx = self.store.begin().await?;
        let mut record = tx
            .get_service_record(id)
            .await?
            .ok_or_else(|| record_not_found(id))?;
        patch.apply_to(&mut record);
        tx.update_service_record(&record).await?;
        tx.commit().await?;

        info!(record_id = %id, status = %record.status, "service record updated");
        Ok(record)
    }

    /// Delete a record and its lines. Stock consumed by the lines is not
    /// restored.
    #[instrument(skip(self), err)]
    pub async fn delete_service_record(&self, id: ServiceRecordId) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;
        if tx.get_service_record(id).await?.is_none() {
            return Err(record_not_found(id).into());
        }
        let removed_lines = tx.delete_line_items(id).await?;
        tx.delete_service_record(id).await?;
        tx.commit().await?;

        info!(record_id = %id, removed_lines, "service record deleted");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_service_record(
        &self,
        id: ServiceRecordId,
    ) -> LedgerResult<ServiceRecordWithLines> {
        let mut tx = self.store.begin().await?;
        let record = tx
            .get_service_record(id)
            .await?
            .ok_or_else(|| record_not_found(id))?;
        let lines = tx.list_line_items(id).await?;
        tx.rollback().await?;
        Ok(ServiceRecordWithLines { record, lines })
    }
}

fn record_not_found(id: ServiceRecordId) -> DomainError {
    DomainError::not_found(format!("service record {id}"))
}

/// Find the visit's vehicle, refreshing its owner fields, or create it from
/// the registration number.
async fn resolve_vehicle<T: StoreTx>(
    tx: &mut T,
    vehicle_id: Option<VehicleId>,
    details: &VehicleDetails,
) -> LedgerResult<Vehicle> {
    let existing = match vehicle_id {
        Some(id) => Some(
            tx.get_vehicle(id)
                .await?
                .ok_or_else(|| DomainError::not_found(format!("vehicle {id}")))?,
        ),
        None => {
            let registration = details
                .registration_number
                .as_deref()
                .and_then(normalize_registration)
                .ok_or(DomainError::VehicleRequired)?;
            tx.find_vehicle_by_registration(&registration).await?
        }
    };

    match existing {
        Some(mut vehicle) => {
            if vehicle.enrich(details) {
                tx.update_vehicle(&vehicle).await?;
            }
            Ok(vehicle)
        }
        None => {
            let vehicle = tx.insert_vehicle(&NewVehicle::from_details(details)?).await?;
            info!(vehicle_id = %vehicle.id, registration = %vehicle.registration_number, "vehicle created");
            Ok(vehicle)
        }
    }
}

/// Persist one priced line and, for a resolved `PART` line, decrement stock.
async fn persist_line<T: StoreTx>(
    tx: &mut T,
    record_id: ServiceRecordId,
    line: PreparedLine,
    missing_part: MissingPartPolicy,
    oversell: OversellPolicy,
) -> LedgerResult<ServiceLineItem> {
    let requested_part = match line.item_type {
        ItemType::Part => line.part_id,
        ItemType::Labor => None,
    };
    let Some(part_id) = requested_part else {
        return Ok(tx.insert_line_item(&line.into_new(record_id, None, None)).await?);
    };

    let Some(part) = tx.lock_part(part_id).await? else {
        return match missing_part {
            MissingPartPolicy::Abort => Err(DomainError::PartNotFound(part_id).into()),
            MissingPartPolicy::Skip => {
                warn!(record_id = %record_id, part_id = %part_id, "part not found; line kept without stock change");
                Ok(tx.insert_line_item(&line.into_new(record_id, None, None)).await?)
            }
        };
    };

    let quantity = line.quantity;
    let persisted = tx
        .insert_line_item(&line.into_new(record_id, Some(part.id), Some(&part.name)))
        .await?;
    stock_ledger::decrement_for_line_item(tx, part.id, quantity, persisted.id, oversell).await?;
    Ok(persisted)
}

/// Upsert the PENDING ticket raised from a freshly created record.
async fn submit_for_record<T: StoreTx>(
    tx: &mut T,
    record: &ServiceRecord,
    vehicle: &Vehicle,
    submission: &JobSubmission,
    now: DateTime<Utc>,
) -> LedgerResult<JobTicket> {
    let details = &record.details;
    let submit = SubmitJob {
        job_number: job_number_for(record.id),
        customer_id: vehicle.customer_id,
        vehicle_id: Some(vehicle.id),
        mechanic_id: details.mechanic_id,
        repair_type: non_blank_or(&details.service_type, DEFAULT_REPAIR_TYPE),
        description: non_blank_or(&details.complaint, DEFAULT_JOB_DESCRIPTION),
        priority: Priority::default(),
        submitted_by: submission.submitted_by.clone(),
        assigned_approver: submission.assigned_approver.clone(),
        estimated_cost: Some(record.total_cost),
        notes: Some(AUTO_JOB_NOTES.to_string()),
        occurred_at: now,
    };
    job_workflow::upsert_pending(tx, submit).await
}

fn non_blank_or(value: &Option<String>, fallback: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => fallback.to_string(),
    }
}

/// Persist the COMPLETED record for a finished job.
///
/// The cost becomes a single untaxed `LABOR` line so the cached total equals
/// the sum of line totals.
pub(crate) async fn persist_completed_record<T: StoreTx>(
    tx: &mut T,
    ticket: &JobTicket,
    vehicle_id: VehicleId,
    cost: Decimal,
    completed_at: DateTime<Utc>,
) -> LedgerResult<ServiceRecordWithLines> {
    if tx.get_vehicle(vehicle_id).await?.is_none() {
        return Err(DomainError::not_found(format!("vehicle {vehicle_id}")).into());
    }

    let mut record = tx
        .insert_service_record(&NewServiceRecord {
            vehicle_id,
            date: completed_at,
            status: ServiceStatus::Completed,
            details: VisitDetails {
                service_type: Some(ticket.repair_type.clone()),
                complaint: Some(ticket.description.clone()),
                mechanic_notes: ticket.notes.clone(),
                mechanic_id: ticket.mechanic_id,
                ..VisitDetails::default()
            },
        })
        .await?;

    let pricing = price_line(&LineCharge::flat(1, cost))?;
    let line = tx
        .insert_line_item(&NewLineItem {
            service_record_id: record.id,
            item_type: ItemType::Labor,
            part_id: None,
            description: ticket.repair_type.clone(),
            hsn_sac: String::new(),
            issue_type: DEFAULT_ISSUE_TYPE.to_string(),
            uom: DEFAULT_UOM.to_string(),
            quantity: 1,
            unit_price: cost,
            pricing,
            vendor_id: None,
        })
        .await?;

    tx.set_service_total(record.id, line.line_total()).await?;
    record.total_cost = line.line_total();

    Ok(ServiceRecordWithLines {
        record,
        lines: vec![line],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use rust_decimal_macros::dec;
    use workshop_service::LineItemInput;

    fn registration(reg: &str) -> VehicleDetails {
        VehicleDetails {
            registration_number: Some(reg.to_string()),
            ..VehicleDetails::default()
        }
    }

    #[tokio::test]
    async fn new_registration_creates_placeholder_vehicle() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let vehicle = resolve_vehicle(&mut tx, None, &registration(" ka01ab1234 "))
            .await
            .unwrap();
        assert_eq!(vehicle.registration_number, "KA01AB1234");
        assert_eq!(vehicle.model, "Unknown Model");
        assert_eq!(vehicle.owner_name, "Unknown Owner");

        let again = resolve_vehicle(
            &mut tx,
            None,
            &VehicleDetails {
                owner_name: Some("Asha".to_string()),
                ..registration("KA01AB1234")
            },
        )
        .await
        .unwrap();
        assert_eq!(again.id, vehicle.id);
        assert_eq!(again.owner_name, "Asha");
    }

    #[tokio::test]
    async fn unknown_vehicle_id_is_not_found() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let err = resolve_vehicle(&mut tx, Some(VehicleId::new(9)), &VehicleDetails::default())
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn missing_part_is_skipped_by_default() {
        let workshop = Workshop::new(InMemoryStore::new());
        let created = workshop
            .create_service_record(CreateServiceRecord {
                vehicle: registration("KA01AB1234"),
                items: vec![LineItemInput::part(
                    workshop_core::PartId::new(404),
                    2,
                    dec!(100),
                )],
                ..CreateServiceRecord::default()
            })
            .await
            .unwrap();

        assert_eq!(created.lines.len(), 1);
        assert_eq!(created.lines[0].part_id, None);
        assert_eq!(created.record.total_cost, dec!(200));
        assert!(created.is_reconciled());
    }

    #[tokio::test]
    async fn completed_record_carries_one_labor_line() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let vehicle = resolve_vehicle(&mut tx, None, &registration("KA01AB1234"))
            .await
            .unwrap();
        let ticket = workshop_jobs::NewJobTicket::new(SubmitJob {
            job_number: "JOB-0001".to_string(),
            customer_id: None,
            vehicle_id: Some(vehicle.id),
            mechanic_id: None,
            repair_type: "Brakes".to_string(),
            description: "Squealing".to_string(),
            priority: Priority::High,
            submitted_by: "Service Advisor".to_string(),
            assigned_approver: None,
            estimated_cost: None,
            notes: None,
            occurred_at: Utc::now(),
        })
        .unwrap()
        .into_ticket(workshop_core::JobId::new(1));

        let done = persist_completed_record(&mut tx, &ticket, vehicle.id, dec!(1500), Utc::now())
            .await
            .unwrap();
        assert_eq!(done.record.status, ServiceStatus::Completed);
        assert_eq!(done.record.details.service_type.as_deref(), Some("Brakes"));
        assert_eq!(done.lines.len(), 1);
        assert_eq!(done.lines[0].item_type, ItemType::Labor);
        assert_eq!(done.record.total_cost, dec!(1500));
        assert!(done.is_reconciled());
    }
}
