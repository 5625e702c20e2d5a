//! Read-only reporting over committed data, plus the RBAC-gated history
//! reads.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use workshop_auth::{HistoryScope, Permission, Principal, authorize, history_scope};
use workshop_core::{DomainError, DomainResult};
use workshop_inventory::Part;
use workshop_jobs::JobStatus;
use workshop_pricing::sum_line_totals;
use workshop_service::{ServiceRecord, ServiceStatus};

use crate::error::LedgerResult;
use crate::store::{RecordFilter, StoreTx, WorkshopStore};
use crate::workshop::Workshop;

const UNSPECIFIED_SERVICE_TYPE: &str = "Unspecified";

/// Reporting window, always ending now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Yearly,
    All,
}

impl DateRange {
    /// First instant inside the window (UTC). `None` for `All`.
    pub fn start(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let first_day = match self {
            DateRange::Daily => today,
            DateRange::Weekly => today.checked_sub_days(Days::new(u64::from(
                today.weekday().num_days_from_monday(),
            )))?,
            DateRange::Monthly => NaiveDate::from_ymd_opt(today.year(), today.month(), 1)?,
            DateRange::Yearly => NaiveDate::from_ymd_opt(today.year(), 1, 1)?,
            DateRange::All => return None,
        };
        Some(first_day.and_hms_opt(0, 0, 0)?.and_utc())
    }

    /// Label of the revenue bucket `at` falls into.
    pub fn bucket_label(self, at: DateTime<Utc>) -> String {
        let pattern = match self {
            DateRange::Daily => "%H:00",
            DateRange::Weekly => "%a",
            DateRange::Monthly => "%d %b",
            DateRange::Yearly => "%b",
            DateRange::All => "%b %Y",
        };
        at.format(pattern).to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralStats {
    /// Total of COMPLETED records in the window.
    pub revenue: Decimal,
    /// Records created in the window.
    pub job_count: usize,
    pub low_stock_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenuePoint {
    pub label: String,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDistribution {
    pub by_status: Vec<(ServiceStatus, usize)>,
    pub by_service_type: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryValuation {
    /// Σ price × stock.
    pub total_value: Decimal,
    pub total_units: i64,
    /// Most valuable parts first.
    pub top_parts: Vec<Part>,
}

impl<S: WorkshopStore> Workshop<S> {
    #[instrument(skip(self), err)]
    pub async fn general_stats(&self, range: DateRange) -> LedgerResult<GeneralStats> {
        let mut tx = self.store.begin().await?;
        let records = records_since(&mut tx, range, None).await?;
        let parts = tx.list_parts().await?;
        tx.rollback().await?;

        Ok(GeneralStats {
            revenue: completed_revenue(records.iter())?,
            job_count: records.len(),
            low_stock_count: parts.iter().filter(|p| p.is_low_stock()).count(),
        })
    }

    /// Revenue of COMPLETED records per bucket, oldest bucket first.
    #[instrument(skip(self), err)]
    pub async fn revenue_over_time(&self, range: DateRange) -> LedgerResult<Vec<RevenuePoint>> {
        let mut tx = self.store.begin().await?;
        let mut records = records_since(&mut tx, range, Some(ServiceStatus::Completed)).await?;
        tx.rollback().await?;

        records.sort_by_key(|r| (r.created_at, r.id));
        let mut points: Vec<RevenuePoint> = Vec::new();
        for record in &records {
            let label = range.bucket_label(record.created_at);
            match points.last_mut() {
                Some(last) if last.label == label => {
                    last.revenue = checked_sum(last.revenue, record.total_cost)?;
                }
                _ => points.push(RevenuePoint {
                    label,
                    revenue: record.total_cost,
                }),
            }
        }
        Ok(points)
    }

    #[instrument(skip(self), err)]
    pub async fn service_distribution(&self, range: DateRange) -> LedgerResult<ServiceDistribution> {
        let mut tx = self.store.begin().await?;
        let records = records_since(&mut tx, range, None).await?;
        tx.rollback().await?;

        let by_status = [
            ServiceStatus::Pending,
            ServiceStatus::InProgress,
            ServiceStatus::Completed,
        ]
        .into_iter()
        .map(|status| (status, records.iter().filter(|r| r.status == status).count()))
        .collect();

        let mut by_service_type = BTreeMap::new();
        for record in &records {
            let service_type = record
                .details
                .service_type
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(UNSPECIFIED_SERVICE_TYPE);
            *by_service_type.entry(service_type.to_string()).or_insert(0) += 1;
        }

        Ok(ServiceDistribution {
            by_status,
            by_service_type,
        })
    }

    /// Ticket count for every job status.
    #[instrument(skip(self), err)]
    pub async fn job_status_distribution(&self) -> LedgerResult<Vec<(JobStatus, usize)>> {
        let mut tx = self.store.begin().await?;
        let jobs = tx.list_jobs().await?;
        tx.rollback().await?;

        Ok(JobStatus::ALL
            .into_iter()
            .map(|status| (status, jobs.iter().filter(|j| j.status == status).count()))
            .collect())
    }

    /// Stock valuation; `top` defaults to `reporting.top_parts`.
    #[instrument(skip(self), err)]
    pub async fn inventory_valuation(&self, top: Option<usize>) -> LedgerResult<InventoryValuation> {
        let mut tx = self.store.begin().await?;
        let mut parts = tx.list_parts().await?;
        tx.rollback().await?;

        let mut total_value = Decimal::ZERO;
        let mut total_units: i64 = 0;
        for part in &parts {
            let value = part
                .price
                .checked_mul(Decimal::from(part.stock))
                .ok_or_else(|| DomainError::invalid_input("inventory value overflow"))?;
            total_value = checked_sum(total_value, value)?;
            total_units = total_units
                .checked_add(part.stock)
                .ok_or_else(|| DomainError::invalid_input("inventory unit count overflow"))?;
        }

        parts.sort_by(|a, b| b.stock_value().cmp(&a.stock_value()).then(a.id.cmp(&b.id)));
        parts.truncate(top.unwrap_or(self.reporting.top_parts));

        Ok(InventoryValuation {
            total_value: total_value.normalize(),
            total_units,
            top_parts: parts,
        })
    }

    /// Parts at or below their reorder level, lowest stock first.
    #[instrument(skip(self), err)]
    pub async fn low_stock_parts(&self) -> LedgerResult<Vec<Part>> {
        let mut tx = self.store.begin().await?;
        let parts = tx.list_parts().await?;
        tx.rollback().await?;

        let mut low: Vec<Part> = parts.into_iter().filter(Part::is_low_stock).collect();
        low.sort_by_key(|p| (p.stock, p.id));
        Ok(low)
    }

    /// Service history visible to `principal`, newest visit first.
    ///
    /// Admins see every record; everyone else only records of vehicles they
    /// own.
    #[instrument(skip_all, fields(user_id = %principal.user_id), err)]
    pub async fn service_history(&self, principal: &Principal) -> LedgerResult<Vec<ServiceRecord>> {
        let owner = match history_scope(principal) {
            HistoryScope::All => None,
            HistoryScope::OwnedBy(user_id) => Some(user_id),
        };

        let mut tx = self.store.begin().await?;
        let records = tx
            .list_service_records(&RecordFilter {
                owner,
                ..RecordFilter::default()
            })
            .await?;
        tx.rollback().await?;
        Ok(records)
    }

    /// The most recent records in the window. Admin only.
    #[instrument(skip_all, fields(user_id = %principal.user_id, range = ?range), err)]
    pub async fn detailed_report(
        &self,
        principal: &Principal,
        range: DateRange,
    ) -> LedgerResult<Vec<ServiceRecord>> {
        authorize(principal, &Permission::REPORTS_DETAILED)?;

        let mut tx = self.store.begin().await?;
        let records = tx
            .list_service_records(&RecordFilter {
                created_since: range.start(Utc::now()),
                limit: Some(self.reporting.detailed_limit),
                ..RecordFilter::default()
            })
            .await?;
        tx.rollback().await?;
        Ok(records)
    }
}

async fn records_since<T: StoreTx>(
    tx: &mut T,
    range: DateRange,
    status: Option<ServiceStatus>,
) -> LedgerResult<Vec<ServiceRecord>> {
    Ok(tx
        .list_service_records(&RecordFilter {
            created_since: range.start(Utc::now()),
            status,
            ..RecordFilter::default()
        })
        .await?)
}

fn completed_revenue<'a>(records: impl Iterator<Item = &'a ServiceRecord>) -> DomainResult<Decimal> {
    sum_line_totals(
        records
            .filter(|r| r.status == ServiceStatus::Completed)
            .map(|r| &r.total_cost),
    )
}

fn checked_sum(a: Decimal, b: Decimal) -> DomainResult<Decimal> {
    a.checked_add(b)
        .ok_or_else(|| DomainError::invalid_input("amount overflow"))
}
