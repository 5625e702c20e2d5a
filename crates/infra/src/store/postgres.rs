//! Postgres-backed workshop store.
//!
//! Every ledger transaction is a `SERIALIZABLE` Postgres transaction. Stock
//! deltas are applied with a single `UPDATE ... SET stock = stock + $1`, so
//! concurrent decrements never lose updates.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (serialization failure) | `40001` | `Conflict` |
//! | Row decode / unknown enum text | N/A | `Corrupt` |
//! | Anything else | N/A | `Database` |

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;

use workshop_core::{
    CustomerId, DomainResult, ExpectedVersion, JobId, LineItemId, MechanicId, PartId,
    PurchaseOrderId, ServiceRecordId, UserId, VehicleId, VendorId,
};
use workshop_inventory::{NewPart, NewStockMovement, Part, StockMovement, StockSource};
use workshop_jobs::{JobStatus, JobTicket, NewJobTicket, Priority};
use workshop_pricing::LinePricing;
use workshop_purchasing::{NewPurchaseOrder, OrderEntry, PurchaseOrder, PurchaseOrderStatus};
use workshop_service::{
    ItemType, NewLineItem, NewServiceRecord, NewVehicle, ServiceLineItem, ServiceRecord,
    ServiceStatus, Vehicle, VehicleType, VisitDetails,
};

use super::r#trait::{RecordFilter, StoreTx, WorkshopStore};
use crate::config::DatabaseConfig;
use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = include_str!("../../migrations/0001_workshop.sql");

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool for `config`.
    #[instrument(skip(config), fields(max_connections = config.max_connections), err)]
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Create any missing tables and indexes.
    #[instrument(skip(self), err)]
    pub async fn apply_schema(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("apply_schema", e))?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl WorkshopStore for PostgresStore {
    type Tx = PgTx;

    async fn begin(&self) -> StoreResult<PgTx> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_isolation", e))?;
        Ok(PgTx { tx })
    }
}

/// An open `SERIALIZABLE` transaction. Dropping it rolls back.
pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgTx {
    #[instrument(skip(self), err)]
    async fn get_vehicle(&mut self, id: VehicleId) -> StoreResult<Option<Vehicle>> {
        let row = sqlx::query("SELECT * FROM vehicles WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_vehicle", e))?;
        row.as_ref().map(vehicle_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_vehicle_by_registration(
        &mut self,
        registration: &str,
    ) -> StoreResult<Option<Vehicle>> {
        let row = sqlx::query("SELECT * FROM vehicles WHERE registration_number = $1")
            .bind(registration)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_vehicle_by_registration", e))?;
        row.as_ref().map(vehicle_from_row).transpose()
    }

    #[instrument(skip_all, fields(registration = %vehicle.registration_number), err)]
    async fn insert_vehicle(&mut self, vehicle: &NewVehicle) -> StoreResult<Vehicle> {
        let row = sqlx::query(
            r#"
            INSERT INTO vehicles (
                registration_number,
                model,
                vehicle_type,
                owner_name,
                owner_phone,
                owner_address,
                owner_gstin,
                chassis_number,
                engine_number,
                owner_user_id,
                customer_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(&vehicle.registration_number)
        .bind(&vehicle.model)
        .bind(vehicle.vehicle_type.as_str())
        .bind(&vehicle.owner_name)
        .bind(&vehicle.owner_phone)
        .bind(&vehicle.owner_address)
        .bind(&vehicle.owner_gstin)
        .bind(&vehicle.chassis_number)
        .bind(&vehicle.engine_number)
        .bind(vehicle.owner_user_id.map(|u| *u.as_uuid()))
        .bind(vehicle.customer_id.map(CustomerId::get))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_vehicle", e))?;
        vehicle_from_row(&row)
    }

    #[instrument(skip_all, fields(vehicle_id = %vehicle.id), err)]
    async fn update_vehicle(&mut self, vehicle: &Vehicle) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE vehicles SET
                model = $2,
                vehicle_type = $3,
                owner_name = $4,
                owner_phone = $5,
                owner_address = $6,
                owner_gstin = $7,
                chassis_number = $8,
                engine_number = $9,
                owner_user_id = $10,
                customer_id = $11
            WHERE id = $1
            "#,
        )
        .bind(vehicle.id.get())
        .bind(&vehicle.model)
        .bind(vehicle.vehicle_type.as_str())
        .bind(&vehicle.owner_name)
        .bind(&vehicle.owner_phone)
        .bind(&vehicle.owner_address)
        .bind(&vehicle.owner_gstin)
        .bind(&vehicle.chassis_number)
        .bind(&vehicle.engine_number)
        .bind(vehicle.owner_user_id.map(|u| *u.as_uuid()))
        .bind(vehicle.customer_id.map(CustomerId::get))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_vehicle", e))?;
        Ok(())
    }

    #[instrument(skip_all, fields(vehicle_id = %record.vehicle_id), err)]
    async fn insert_service_record(
        &mut self,
        record: &NewServiceRecord,
    ) -> StoreResult<ServiceRecord> {
        let d = &record.details;
        let row = sqlx::query(
            r#"
            INSERT INTO service_records (
                vehicle_id,
                date,
                status,
                odometer,
                service_type,
                fuel_level,
                service_advisor,
                complaint,
                mechanic_notes,
                estimated_date,
                images,
                customer_signature,
                advisor_signature,
                mechanic_id,
                total_cost
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, 0)
            RETURNING *
            "#,
        )
        .bind(record.vehicle_id.get())
        .bind(record.date)
        .bind(record.status.as_str())
        .bind(d.odometer)
        .bind(&d.service_type)
        .bind(&d.fuel_level)
        .bind(&d.service_advisor)
        .bind(&d.complaint)
        .bind(&d.mechanic_notes)
        .bind(d.estimated_date)
        .bind(Json(&d.images))
        .bind(&d.customer_signature)
        .bind(&d.advisor_signature)
        .bind(d.mechanic_id.map(MechanicId::get))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_service_record", e))?;
        record_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn get_service_record(
        &mut self,
        id: ServiceRecordId,
    ) -> StoreResult<Option<ServiceRecord>> {
        let row = sqlx::query("SELECT * FROM service_records WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_service_record", e))?;
        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip_all, fields(record_id = %record.id), err)]
    async fn update_service_record(&mut self, record: &ServiceRecord) -> StoreResult<()> {
        let d = &record.details;
        sqlx::query(
            r#"
            UPDATE service_records SET
                date = $2,
                status = $3,
                odometer = $4,
                service_type = $5,
                fuel_level = $6,
                service_advisor = $7,
                complaint = $8,
                mechanic_notes = $9,
                estimated_date = $10,
                images = $11,
                customer_signature = $12,
                advisor_signature = $13,
                mechanic_id = $14
            WHERE id = $1
            "#,
        )
        .bind(record.id.get())
        .bind(record.date)
        .bind(record.status.as_str())
        .bind(d.odometer)
        .bind(&d.service_type)
        .bind(&d.fuel_level)
        .bind(&d.service_advisor)
        .bind(&d.complaint)
        .bind(&d.mechanic_notes)
        .bind(d.estimated_date)
        .bind(Json(&d.images))
        .bind(&d.customer_signature)
        .bind(&d.advisor_signature)
        .bind(d.mechanic_id.map(MechanicId::get))
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_service_record", e))?;
        Ok(())
    }

    #[instrument(skip(self, total), fields(total = %total), err)]
    async fn set_service_total(&mut self, id: ServiceRecordId, total: Decimal) -> StoreResult<()> {
        sqlx::query("UPDATE service_records SET total_cost = $2 WHERE id = $1")
            .bind(id.get())
            .bind(total)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("set_service_total", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_service_record(&mut self, id: ServiceRecordId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM service_records WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_service_record", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn list_service_records(
        &mut self,
        filter: &RecordFilter,
    ) -> StoreResult<Vec<ServiceRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT r.*
            FROM service_records r
            JOIN vehicles v ON v.id = r.vehicle_id
            WHERE ($1::timestamptz IS NULL OR r.created_at >= $1)
                AND ($2::text IS NULL OR r.status = $2)
                AND ($3::uuid IS NULL OR v.owner_user_id = $3)
            ORDER BY r.date DESC, r.id DESC
            LIMIT $4
            "#,
        )
        .bind(filter.created_since)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.owner.map(|u| *u.as_uuid()))
        .bind(filter.limit.map(|l| i64::try_from(l).unwrap_or(i64::MAX)))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_service_records", e))?;
        rows.iter().map(record_from_row).collect()
    }

    #[instrument(skip_all, fields(record_id = %line.service_record_id), err)]
    async fn insert_line_item(&mut self, line: &NewLineItem) -> StoreResult<ServiceLineItem> {
        let p = &line.pricing;
        let row = sqlx::query(
            r#"
            INSERT INTO service_line_items (
                service_record_id,
                item_type,
                part_id,
                description,
                hsn_sac,
                issue_type,
                uom,
                quantity,
                unit_price,
                gross,
                discount_percent,
                discount_amount,
                taxable_value,
                cgst_percent,
                cgst_amount,
                sgst_percent,
                sgst_amount,
                cess_percent,
                cess_amount,
                line_total,
                vendor_id
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                $12, $13, $14, $15, $16, $17, $18, $19, $20, $21
            )
            RETURNING *
            "#,
        )
        .bind(line.service_record_id.get())
        .bind(line.item_type.as_str())
        .bind(line.part_id.map(PartId::get))
        .bind(&line.description)
        .bind(&line.hsn_sac)
        .bind(&line.issue_type)
        .bind(&line.uom)
        .bind(line.quantity)
        .bind(line.unit_price)
        .bind(p.gross)
        .bind(p.discount_percent)
        .bind(p.discount_amount)
        .bind(p.taxable_value)
        .bind(p.cgst_percent)
        .bind(p.cgst_amount)
        .bind(p.sgst_percent)
        .bind(p.sgst_amount)
        .bind(p.cess_percent)
        .bind(p.cess_amount)
        .bind(p.line_total)
        .bind(line.vendor_id.map(VendorId::get))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_line_item", e))?;
        line_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn list_line_items(
        &mut self,
        record_id: ServiceRecordId,
    ) -> StoreResult<Vec<ServiceLineItem>> {
        let rows = sqlx::query(
            "SELECT * FROM service_line_items WHERE service_record_id = $1 ORDER BY id ASC",
        )
        .bind(record_id.get())
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("list_line_items", e))?;
        rows.iter().map(line_from_row).collect()
    }

    #[instrument(skip(self), err)]
    async fn delete_line_items(&mut self, record_id: ServiceRecordId) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM service_line_items WHERE service_record_id = $1")
            .bind(record_id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_line_items", e))?;
        Ok(result.rows_affected())
    }

    #[instrument(skip_all, fields(sku = %part.sku), err)]
    async fn insert_part(&mut self, part: &NewPart) -> StoreResult<Part> {
        let row = sqlx::query(
            r#"
            INSERT INTO parts (sku, name, category, price, stock, min_stock_level)
            VALUES ($1, $2, COALESCE($3, 'General'), $4, $5, COALESCE($6, 5))
            RETURNING *
            "#,
        )
        .bind(&part.sku)
        .bind(&part.name)
        .bind(&part.category)
        .bind(part.price)
        .bind(part.stock)
        .bind(part.min_stock_level)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_part", e))?;
        part_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn get_part(&mut self, id: PartId) -> StoreResult<Option<Part>> {
        let row = sqlx::query("SELECT * FROM parts WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_part", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn lock_part(&mut self, id: PartId) -> StoreResult<Option<Part>> {
        let row = sqlx::query("SELECT * FROM parts WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("lock_part", e))?;
        row.as_ref().map(part_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_parts(&mut self) -> StoreResult<Vec<Part>> {
        let rows = sqlx::query("SELECT * FROM parts ORDER BY id ASC")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_parts", e))?;
        rows.iter().map(part_from_row).collect()
    }

    #[instrument(skip_all, fields(part_id = %part.id), err)]
    async fn update_part(&mut self, part: &Part) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE parts
            SET sku = $2, name = $3, category = $4, price = $5, min_stock_level = $6
            WHERE id = $1
            "#,
        )
        .bind(part.id.get())
        .bind(&part.sku)
        .bind(&part.name)
        .bind(&part.category)
        .bind(part.price)
        .bind(part.min_stock_level)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_part", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_part(&mut self, id: PartId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM parts WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_part", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        skip_all,
        fields(
            part_id = %movement.part_id,
            delta = movement.delta,
            source = %movement.source.key()
        ),
        err
    )]
    async fn apply_stock_movement(
        &mut self,
        movement: &NewStockMovement,
    ) -> StoreResult<Option<StockMovement>> {
        let row = sqlx::query("UPDATE parts SET stock = stock + $1 WHERE id = $2 RETURNING stock")
            .bind(movement.delta)
            .bind(movement.part_id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("apply_stock_delta", e))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let stock_after: i64 = row
            .try_get("stock")
            .map_err(|e| corrupt("parts", e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO stock_movements (
                part_id,
                delta,
                stock_after,
                source_kind,
                source_key,
                source
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING occurred_at
            "#,
        )
        .bind(movement.part_id.get())
        .bind(movement.delta)
        .bind(stock_after)
        .bind(movement.source.kind())
        .bind(movement.source.key())
        .bind(Json(movement.source))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_stock_movement", e))?;
        let occurred_at: DateTime<Utc> = row
            .try_get("occurred_at")
            .map_err(|e| corrupt("stock_movements", e))?;

        Ok(Some(StockMovement {
            part_id: movement.part_id,
            delta: movement.delta,
            stock_after,
            source: movement.source,
            occurred_at,
        }))
    }

    #[instrument(skip(self), err)]
    async fn list_stock_movements(&mut self, part_id: PartId) -> StoreResult<Vec<StockMovement>> {
        let rows = sqlx::query("SELECT * FROM stock_movements WHERE part_id = $1 ORDER BY id ASC")
            .bind(part_id.get())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_stock_movements", e))?;
        rows.iter()
            .map(|row| -> Result<StockMovement, sqlx::Error> {
                let source: Json<StockSource> = row.try_get("source")?;
                Ok(StockMovement {
                    part_id: PartId::new(row.try_get("part_id")?),
                    delta: row.try_get("delta")?,
                    stock_after: row.try_get("stock_after")?,
                    source: source.0,
                    occurred_at: row.try_get("occurred_at")?,
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| corrupt("stock_movements", e))
    }

    #[instrument(skip_all, fields(job_number = %job.submission.job_number), err)]
    async fn insert_job(&mut self, job: NewJobTicket) -> StoreResult<JobTicket> {
        let s = &job.submission;
        let row = sqlx::query(
            r#"
            INSERT INTO job_tickets (
                job_number,
                customer_id,
                vehicle_id,
                mechanic_id,
                repair_type,
                description,
                priority,
                status,
                submitted_by,
                submitted_at,
                assigned_approver,
                estimated_cost,
                notes,
                version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 0)
            RETURNING id
            "#,
        )
        .bind(&s.job_number)
        .bind(s.customer_id.map(CustomerId::get))
        .bind(s.vehicle_id.map(VehicleId::get))
        .bind(s.mechanic_id.map(MechanicId::get))
        .bind(&s.repair_type)
        .bind(&s.description)
        .bind(s.priority.as_str())
        .bind(JobStatus::Pending.as_str())
        .bind(&s.submitted_by)
        .bind(s.occurred_at)
        .bind(&s.assigned_approver)
        .bind(s.estimated_cost)
        .bind(&s.notes)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_job", e))?;
        let id: i64 = row.try_get("id").map_err(|e| corrupt("job_tickets", e))?;
        Ok(job.into_ticket(JobId::new(id)))
    }

    #[instrument(skip(self), err)]
    async fn get_job(&mut self, id: JobId) -> StoreResult<Option<JobTicket>> {
        let row = sqlx::query("SELECT * FROM job_tickets WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn find_job_by_number(&mut self, job_number: &str) -> StoreResult<Option<JobTicket>> {
        let row = sqlx::query("SELECT * FROM job_tickets WHERE job_number = $1 FOR UPDATE")
            .bind(job_number)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("find_job_by_number", e))?;
        row.as_ref().map(job_from_row).transpose()
    }

    #[instrument(skip_all, fields(job_id = %job.id, expected = ?expected), err)]
    async fn update_job(&mut self, job: &JobTicket, expected: ExpectedVersion) -> StoreResult<()> {
        let expected_version = expected_param(expected)?;
        let version = version_param(job.version)?;
        let result = sqlx::query(
            r#"
            UPDATE job_tickets SET
                customer_id = $3,
                vehicle_id = $4,
                mechanic_id = $5,
                repair_type = $6,
                description = $7,
                priority = $8,
                status = $9,
                submitted_by = $10,
                submitted_at = $11,
                assigned_approver = $12,
                approved_by = $13,
                approved_at = $14,
                rejected_by = $15,
                rejected_at = $16,
                rejection_reason = $17,
                started_at = $18,
                completed_at = $19,
                estimated_cost = $20,
                final_cost = $21,
                notes = $22,
                version = $23
            WHERE id = $1 AND ($2::bigint IS NULL OR version = $2)
            "#,
        )
        .bind(job.id.get())
        .bind(expected_version)
        .bind(job.customer_id.map(CustomerId::get))
        .bind(job.vehicle_id.map(VehicleId::get))
        .bind(job.mechanic_id.map(MechanicId::get))
        .bind(&job.repair_type)
        .bind(&job.description)
        .bind(job.priority.as_str())
        .bind(job.status.as_str())
        .bind(&job.submitted_by)
        .bind(job.submitted_at)
        .bind(&job.assigned_approver)
        .bind(&job.approved_by)
        .bind(job.approved_at)
        .bind(&job.rejected_by)
        .bind(job.rejected_at)
        .bind(&job.rejection_reason)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.estimated_cost)
        .bind(job.final_cost)
        .bind(&job.notes)
        .bind(version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "job {}: optimistic concurrency check failed (expected {expected:?})",
                job.id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_job(&mut self, id: JobId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM job_tickets WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_job", e))?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), err)]
    async fn list_jobs(&mut self) -> StoreResult<Vec<JobTicket>> {
        let rows = sqlx::query("SELECT * FROM job_tickets ORDER BY submitted_at DESC, id DESC")
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("list_jobs", e))?;
        rows.iter().map(job_from_row).collect()
    }

    #[instrument(skip_all, fields(supplier = %order.supplier, entries = order.entries.len()), err)]
    async fn insert_order(
        &mut self,
        order: &NewPurchaseOrder,
        order_date: DateTime<Utc>,
    ) -> StoreResult<PurchaseOrder> {
        let row = sqlx::query(
            r#"
            INSERT INTO purchase_orders (supplier, vendor_id, order_date, status, entries, version)
            VALUES ($1, $2, $3, $4, $5, 0)
            RETURNING *
            "#,
        )
        .bind(order.supplier.trim())
        .bind(order.vendor_id.map(VendorId::get))
        .bind(order_date)
        .bind(PurchaseOrderStatus::Pending.as_str())
        .bind(Json(order.numbered_entries()))
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("insert_order", e))?;
        order_from_row(&row)
    }

    #[instrument(skip(self), err)]
    async fn get_order(&mut self, id: PurchaseOrderId) -> StoreResult<Option<PurchaseOrder>> {
        let row = sqlx::query("SELECT * FROM purchase_orders WHERE id = $1 FOR UPDATE")
            .bind(id.get())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("get_order", e))?;
        row.as_ref().map(order_from_row).transpose()
    }

    #[instrument(skip_all, fields(order_id = %order.id, expected = ?expected), err)]
    async fn update_order(
        &mut self,
        order: &PurchaseOrder,
        expected: ExpectedVersion,
    ) -> StoreResult<()> {
        let expected_version = expected_param(expected)?;
        let version = version_param(order.version)?;
        let result = sqlx::query(
            r#"
            UPDATE purchase_orders SET
                supplier = $3,
                vendor_id = $4,
                order_date = $5,
                status = $6,
                entries = $7,
                version = $8
            WHERE id = $1 AND ($2::bigint IS NULL OR version = $2)
            "#,
        )
        .bind(order.id.get())
        .bind(expected_version)
        .bind(&order.supplier)
        .bind(order.vendor_id.map(VendorId::get))
        .bind(order.order_date)
        .bind(order.status.as_str())
        .bind(Json(&order.entries))
        .bind(version)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("update_order", e))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "purchase order {}: optimistic concurrency check failed (expected {expected:?})",
                order.id
            )));
        }
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn delete_order(&mut self, id: PurchaseOrderId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM purchase_orders WHERE id = $1")
            .bind(id.get())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| map_sqlx_error("delete_order", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

fn expected_param(expected: ExpectedVersion) -> StoreResult<Option<i64>> {
    match expected {
        ExpectedVersion::Any => Ok(None),
        ExpectedVersion::Exact(v) => version_param(v).map(Some),
    }
}

/// Versions are stored as `BIGINT`.
fn version_param(version: u64) -> StoreResult<i64> {
    i64::try_from(version)
        .map_err(|_| StoreError::Conflict(format!("version {version} is out of range")))
}

fn stored_version(version: i64) -> Result<u64, sqlx::Error> {
    u64::try_from(version).map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

/// Map SQLx errors to StoreError.
fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        // 23503: foreign key violation, 23505: unique violation,
        // 40001: serialization failure
        if matches!(
            db_err.code().as_deref(),
            Some("23503") | Some("23505") | Some("40001")
        ) {
            return StoreError::Conflict(format!(
                "database conflict in {}: {}",
                operation,
                db_err.message()
            ));
        }
    }
    StoreError::Database(err)
}

fn corrupt(table: &str, err: sqlx::Error) -> StoreError {
    StoreError::Corrupt(format!("failed to decode {table} row: {err}"))
}

/// Surface an unknown enum text as a decode error.
fn decode<T>(value: DomainResult<T>) -> Result<T, sqlx::Error> {
    value.map_err(|e| sqlx::Error::Decode(Box::new(e)))
}

fn opt_id<T>(row: &PgRow, column: &str, make: fn(i64) -> T) -> Result<Option<T>, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(column)?.map(make))
}

// Row mapping

fn vehicle_from_row(row: &PgRow) -> StoreResult<Vehicle> {
    let decoded = (|| -> Result<Vehicle, sqlx::Error> {
        let vehicle_type: String = row.try_get("vehicle_type")?;
        let owner_user_id: Option<uuid::Uuid> = row.try_get("owner_user_id")?;
        Ok(Vehicle {
            id: VehicleId::new(row.try_get("id")?),
            registration_number: row.try_get("registration_number")?,
            model: row.try_get("model")?,
            vehicle_type: decode(VehicleType::parse(&vehicle_type))?,
            owner_name: row.try_get("owner_name")?,
            owner_phone: row.try_get("owner_phone")?,
            owner_address: row.try_get("owner_address")?,
            owner_gstin: row.try_get("owner_gstin")?,
            chassis_number: row.try_get("chassis_number")?,
            engine_number: row.try_get("engine_number")?,
            owner_user_id: owner_user_id.map(UserId::from_uuid),
            customer_id: opt_id(row, "customer_id", CustomerId::new)?,
            created_at: row.try_get("created_at")?,
        })
    })();
    decoded.map_err(|e| corrupt("vehicles", e))
}

fn record_from_row(row: &PgRow) -> StoreResult<ServiceRecord> {
    let decoded = (|| -> Result<ServiceRecord, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let images: Json<Vec<String>> = row.try_get("images")?;
        Ok(ServiceRecord {
            id: ServiceRecordId::new(row.try_get("id")?),
            vehicle_id: VehicleId::new(row.try_get("vehicle_id")?),
            date: row.try_get("date")?,
            status: decode(ServiceStatus::parse(&status))?,
            details: VisitDetails {
                odometer: row.try_get("odometer")?,
                service_type: row.try_get("service_type")?,
                fuel_level: row.try_get("fuel_level")?,
                service_advisor: row.try_get("service_advisor")?,
                complaint: row.try_get("complaint")?,
                mechanic_notes: row.try_get("mechanic_notes")?,
                estimated_date: row.try_get("estimated_date")?,
                images: images.0,
                customer_signature: row.try_get("customer_signature")?,
                advisor_signature: row.try_get("advisor_signature")?,
                mechanic_id: opt_id(row, "mechanic_id", MechanicId::new)?,
            },
            total_cost: row.try_get("total_cost")?,
            created_at: row.try_get("created_at")?,
        })
    })();
    decoded.map_err(|e| corrupt("service_records", e))
}

fn line_from_row(row: &PgRow) -> StoreResult<ServiceLineItem> {
    let decoded = (|| -> Result<ServiceLineItem, sqlx::Error> {
        let item_type: String = row.try_get("item_type")?;
        Ok(ServiceLineItem {
            id: LineItemId::new(row.try_get("id")?),
            service_record_id: ServiceRecordId::new(row.try_get("service_record_id")?),
            item_type: decode(ItemType::parse(&item_type))?,
            part_id: opt_id(row, "part_id", PartId::new)?,
            description: row.try_get("description")?,
            hsn_sac: row.try_get("hsn_sac")?,
            issue_type: row.try_get("issue_type")?,
            uom: row.try_get("uom")?,
            quantity: row.try_get("quantity")?,
            unit_price: row.try_get("unit_price")?,
            pricing: LinePricing {
                gross: row.try_get("gross")?,
                discount_percent: row.try_get("discount_percent")?,
                discount_amount: row.try_get("discount_amount")?,
                taxable_value: row.try_get("taxable_value")?,
                cgst_percent: row.try_get("cgst_percent")?,
                cgst_amount: row.try_get("cgst_amount")?,
                sgst_percent: row.try_get("sgst_percent")?,
                sgst_amount: row.try_get("sgst_amount")?,
                cess_percent: row.try_get("cess_percent")?,
                cess_amount: row.try_get("cess_amount")?,
                line_total: row.try_get("line_total")?,
            },
            vendor_id: opt_id(row, "vendor_id", VendorId::new)?,
        })
    })();
    decoded.map_err(|e| corrupt("service_line_items", e))
}

fn part_from_row(row: &PgRow) -> StoreResult<Part> {
    let decoded = (|| -> Result<Part, sqlx::Error> {
        Ok(Part {
            id: PartId::new(row.try_get("id")?),
            sku: row.try_get("sku")?,
            name: row.try_get("name")?,
            category: row.try_get("category")?,
            price: row.try_get("price")?,
            stock: row.try_get("stock")?,
            min_stock_level: row.try_get("min_stock_level")?,
            created_at: row.try_get("created_at")?,
        })
    })();
    decoded.map_err(|e| corrupt("parts", e))
}

fn job_from_row(row: &PgRow) -> StoreResult<JobTicket> {
    let decoded = (|| -> Result<JobTicket, sqlx::Error> {
        let priority: String = row.try_get("priority")?;
        let status: String = row.try_get("status")?;
        let version: i64 = row.try_get("version")?;
        Ok(JobTicket {
            id: JobId::new(row.try_get("id")?),
            job_number: row.try_get("job_number")?,
            customer_id: opt_id(row, "customer_id", CustomerId::new)?,
            vehicle_id: opt_id(row, "vehicle_id", VehicleId::new)?,
            mechanic_id: opt_id(row, "mechanic_id", MechanicId::new)?,
            repair_type: row.try_get("repair_type")?,
            description: row.try_get("description")?,
            priority: decode(Priority::parse(&priority))?,
            status: decode(JobStatus::parse(&status))?,
            submitted_by: row.try_get("submitted_by")?,
            submitted_at: row.try_get("submitted_at")?,
            assigned_approver: row.try_get("assigned_approver")?,
            approved_by: row.try_get("approved_by")?,
            approved_at: row.try_get("approved_at")?,
            rejected_by: row.try_get("rejected_by")?,
            rejected_at: row.try_get("rejected_at")?,
            rejection_reason: row.try_get("rejection_reason")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            estimated_cost: row.try_get("estimated_cost")?,
            final_cost: row.try_get("final_cost")?,
            notes: row.try_get("notes")?,
            version: stored_version(version)?,
        })
    })();
    decoded.map_err(|e| corrupt("job_tickets", e))
}

fn order_from_row(row: &PgRow) -> StoreResult<PurchaseOrder> {
    let decoded = (|| -> Result<PurchaseOrder, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let entries: Json<Vec<OrderEntry>> = row.try_get("entries")?;
        let version: i64 = row.try_get("version")?;
        Ok(PurchaseOrder {
            id: PurchaseOrderId::new(row.try_get("id")?),
            supplier: row.try_get("supplier")?,
            vendor_id: opt_id(row, "vendor_id", VendorId::new)?,
            order_date: row.try_get("order_date")?,
            status: decode(PurchaseOrderStatus::parse(&status))?,
            entries: entries.0,
            version: stored_version(version)?,
        })
    })();
    decoded.map_err(|e| corrupt("purchase_orders", e))
}
