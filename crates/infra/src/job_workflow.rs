//! Job board orchestration: load ticket, decide, apply, write back with an
//! optimistic version check, all inside one storage transaction.

use tracing::{info, instrument};

use workshop_core::{Aggregate, DomainError, Event, ExpectedVersion, JobId};
use workshop_jobs::{
    ApproveJob, CompleteJob, JobCommand, JobEvent, JobTicket, NewJobTicket, RejectJob, StartJob,
    SubmitJob,
};
use workshop_service::ServiceRecordWithLines;

use crate::error::LedgerResult;
use crate::service_builder;
use crate::store::{StoreTx, WorkshopStore};
use crate::workshop::Workshop;

/// Result of completing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobCompletion {
    pub ticket: JobTicket,
    /// The COMPLETED service record, when the job is linked to a vehicle.
    pub record: Option<ServiceRecordWithLines>,
}

impl<S: WorkshopStore> Workshop<S> {
    /// Open a new PENDING ticket. Job numbers are unique.
    #[instrument(skip_all, fields(job_number = %submission.job_number), err)]
    pub async fn submit_job(&self, submission: SubmitJob) -> LedgerResult<JobTicket> {
        let new = NewJobTicket::new(submission)?;
        let mut tx = self.store.begin().await?;
        let ticket = tx.insert_job(new).await?;
        tx.commit().await?;

        info!(job_id = %ticket.id, job_number = %ticket.job_number, "job submitted");
        Ok(ticket)
    }

    #[instrument(skip(self, command), err)]
    pub async fn approve_job(&self, id: JobId, command: ApproveJob) -> LedgerResult<JobTicket> {
        self.transition(id, JobCommand::Approve(command)).await
    }

    #[instrument(skip(self, command), err)]
    pub async fn reject_job(&self, id: JobId, command: RejectJob) -> LedgerResult<JobTicket> {
        self.transition(id, JobCommand::Reject(command)).await
    }

    #[instrument(skip(self, command), err)]
    pub async fn start_job(&self, id: JobId, command: StartJob) -> LedgerResult<JobTicket> {
        self.transition(id, JobCommand::Start(command)).await
    }

    /// Complete an IN_PROGRESS job. When it is linked to a vehicle, a
    /// COMPLETED service record is persisted in the same transaction.
    #[instrument(skip(self, command), err)]
    pub async fn complete_job(
        &self,
        id: JobId,
        command: CompleteJob,
    ) -> LedgerResult<JobCompletion> {
        let completed_at = command.occurred_at;
        let mut tx = self.store.begin().await?;
        let ticket = execute(&mut tx, id, JobCommand::Complete(command)).await?;

        let record = match ticket.vehicle_id {
            Some(vehicle_id) => Some(
                service_builder::persist_completed_record(
                    &mut tx,
                    &ticket,
                    vehicle_id,
                    ticket.completion_cost(),
                    completed_at,
                )
                .await?,
            ),
            None => None,
        };
        tx.commit().await?;

        if let Some(done) = &record {
            info!(job_id = %id, record_id = %done.record.id, total = %done.record.total_cost, "service record created for completed job");
        }
        Ok(JobCompletion { ticket, record })
    }

    /// Remove a ticket regardless of status. Nothing cascades.
    #[instrument(skip(self), err)]
    pub async fn delete_job(&self, id: JobId) -> LedgerResult<()> {
        let mut tx = self.store.begin().await?;
        if !tx.delete_job(id).await? {
            return Err(job_not_found(id).into());
        }
        tx.commit().await?;

        info!(job_id = %id, "job deleted");
        Ok(())
    }

    #[instrument(skip(self), err)]
    pub async fn get_job(&self, id: JobId) -> LedgerResult<JobTicket> {
        let mut tx = self.store.begin().await?;
        let ticket = tx.get_job(id).await?.ok_or_else(|| job_not_found(id))?;
        tx.rollback().await?;
        Ok(ticket)
    }

    /// All tickets, newest submission first.
    #[instrument(skip(self), err)]
    pub async fn list_jobs(&self) -> LedgerResult<Vec<JobTicket>> {
        let mut tx = self.store.begin().await?;
        let jobs = tx.list_jobs().await?;
        tx.rollback().await?;
        Ok(jobs)
    }

    async fn transition(&self, id: JobId, command: JobCommand) -> LedgerResult<JobTicket> {
        let mut tx = self.store.begin().await?;
        let ticket = execute(&mut tx, id, command).await?;
        tx.commit().await?;
        Ok(ticket)
    }
}

fn job_not_found(id: JobId) -> DomainError {
    DomainError::not_found(format!("job {id}"))
}

/// Load, handle, apply and write back one command.
async fn execute<T: StoreTx>(tx: &mut T, id: JobId, command: JobCommand) -> LedgerResult<JobTicket> {
    let mut ticket = tx.get_job(id).await?.ok_or_else(|| job_not_found(id))?;
    decide(tx, &mut ticket, &command).await?;
    Ok(ticket)
}

async fn decide<T: StoreTx>(
    tx: &mut T,
    ticket: &mut JobTicket,
    command: &JobCommand,
) -> LedgerResult<Vec<JobEvent>> {
    let expected = ExpectedVersion::Exact(ticket.version);
    let events = ticket.handle(command)?;
    for event in &events {
        ticket.apply(event);
    }
    if !events.is_empty() {
        tx.update_job(ticket, expected).await?;
    }
    for event in &events {
        info!(
            job_id = %ticket.id,
            event_type = event.event_type(),
            status = %ticket.status,
            "job transition"
        );
    }
    Ok(events)
}

/// Create a PENDING ticket, or overwrite the one with the same number while
/// it is still PENDING (`InvalidTransition` otherwise).
pub(crate) async fn upsert_pending<T: StoreTx>(
    tx: &mut T,
    submission: SubmitJob,
) -> LedgerResult<JobTicket> {
    match tx.find_job_by_number(&submission.job_number).await? {
        None => Ok(tx.insert_job(NewJobTicket::new(submission)?).await?),
        Some(mut ticket) => {
            decide(tx, &mut ticket, &JobCommand::Resubmit(submission)).await?;
            Ok(ticket)
        }
    }
}
