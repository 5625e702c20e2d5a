use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use workshop_core::{
    Aggregate, AggregateRoot, CustomerId, DomainError, DomainResult, Event, JobId, MechanicId,
    VehicleId,
};

/// Job ticket lifecycle. `Rejected` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    InProgress,
    Completed,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Approved,
        JobStatus::Rejected,
        JobStatus::InProgress,
        JobStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Approved => "APPROVED",
            JobStatus::Rejected => "REJECTED",
            JobStatus::InProgress => "IN_PROGRESS",
            JobStatus::Completed => "COMPLETED",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        JobStatus::ALL
            .into_iter()
            .find(|s| s.as_str() == raw)
            .ok_or_else(|| DomainError::invalid_input(format!("unknown job status: {raw}")))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Rejected | JobStatus::Completed)
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
            Priority::Urgent => "URGENT",
        }
    }

    pub fn parse(raw: &str) -> DomainResult<Self> {
        match raw {
            "LOW" => Ok(Priority::Low),
            "MEDIUM" => Ok(Priority::Medium),
            "HIGH" => Ok(Priority::High),
            "URGENT" => Ok(Priority::Urgent),
            other => Err(DomainError::invalid_input(format!(
                "unknown priority: {other}"
            ))),
        }
    }
}

/// Aggregate root: JobTicket.
///
/// Fields are public for storage mapping; state changes go through
/// [`Aggregate::handle`] / [`Aggregate::apply`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTicket {
    pub id: JobId,
    pub job_number: String,
    pub customer_id: Option<CustomerId>,
    pub vehicle_id: Option<VehicleId>,
    pub mechanic_id: Option<MechanicId>,
    pub repair_type: String,
    pub description: String,
    pub priority: Priority,
    pub status: JobStatus,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    pub assigned_approver: Option<String>,
    pub approved_by: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_cost: Option<Decimal>,
    pub final_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub version: u64,
}

impl JobTicket {
    /// Cost carried onto the service record when the job completes.
    pub fn completion_cost(&self) -> Decimal {
        self.final_cost
            .or(self.estimated_cost)
            .unwrap_or(Decimal::ZERO)
    }

    fn ensure_status(&self, expected: JobStatus, action: &'static str) -> DomainResult<()> {
        if self.status != expected {
            return Err(DomainError::invalid_transition(
                "job",
                self.status,
                action,
            ));
        }
        Ok(())
    }

    fn handle_resubmit(&self, cmd: &SubmitJob) -> DomainResult<Vec<JobEvent>> {
        self.ensure_status(JobStatus::Pending, "resubmit")?;
        cmd.validate()?;
        if cmd.job_number != self.job_number {
            return Err(DomainError::invalid_input("job number cannot change"));
        }
        Ok(vec![JobEvent::Resubmitted(JobResubmitted {
            job_id: self.id,
            submission: cmd.clone(),
        })])
    }

    fn handle_approve(&self, cmd: &ApproveJob) -> DomainResult<Vec<JobEvent>> {
        self.ensure_status(JobStatus::Pending, "approve")?;
        if cmd.approved_by.trim().is_empty() {
            return Err(DomainError::invalid_input("approver is required"));
        }
        ensure_cost("estimated_cost", cmd.estimated_cost)?;
        Ok(vec![JobEvent::Approved(JobApproved {
            job_id: self.id,
            approved_by: cmd.approved_by.trim().to_string(),
            mechanic_id: cmd.mechanic_id,
            estimated_cost: cmd.estimated_cost,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reject(&self, cmd: &RejectJob) -> DomainResult<Vec<JobEvent>> {
        self.ensure_status(JobStatus::Pending, "reject")?;
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::invalid_input("rejection reason is required"));
        }
        let rejected_by = match cmd.rejected_by.trim() {
            "" => DEFAULT_REVIEWER.to_string(),
            name => name.to_string(),
        };
        Ok(vec![JobEvent::Rejected(JobRejected {
            job_id: self.id,
            rejected_by,
            reason: cmd.reason.trim().to_string(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_start(&self, cmd: &StartJob) -> DomainResult<Vec<JobEvent>> {
        self.ensure_status(JobStatus::Approved, "start")?;
        Ok(vec![JobEvent::Started(JobStarted {
            job_id: self.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_complete(&self, cmd: &CompleteJob) -> DomainResult<Vec<JobEvent>> {
        self.ensure_status(JobStatus::InProgress, "complete")?;
        ensure_cost("final_cost", cmd.final_cost)?;
        Ok(vec![JobEvent::Completed(JobCompleted {
            job_id: self.id,
            final_cost: cmd.final_cost,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

impl AggregateRoot for JobTicket {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

const DEFAULT_REVIEWER: &str = "Manager";

fn ensure_cost(field: &str, cost: Option<Decimal>) -> DomainResult<()> {
    if matches!(cost, Some(c) if c < Decimal::ZERO) {
        return Err(DomainError::invalid_input(format!(
            "{field} cannot be negative"
        )));
    }
    Ok(())
}

/// Command: SubmitJob.
///
/// Opens a new PENDING ticket, or overwrites one that is still PENDING.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitJob {
    pub job_number: String,
    pub customer_id: Option<CustomerId>,
    pub vehicle_id: Option<VehicleId>,
    pub mechanic_id: Option<MechanicId>,
    pub repair_type: String,
    pub description: String,
    pub priority: Priority,
    pub submitted_by: String,
    pub assigned_approver: Option<String>,
    pub estimated_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl SubmitJob {
    pub fn validate(&self) -> DomainResult<()> {
        if self.job_number.trim().is_empty() {
            return Err(DomainError::invalid_input("job number is required"));
        }
        if self.repair_type.trim().is_empty() {
            return Err(DomainError::invalid_input("repair type is required"));
        }
        if self.description.trim().is_empty() {
            return Err(DomainError::invalid_input("description is required"));
        }
        ensure_cost("estimated_cost", self.estimated_cost)
    }
}

/// A ticket about to be inserted; the store assigns its id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewJobTicket {
    pub submission: SubmitJob,
}

impl NewJobTicket {
    pub fn new(submission: SubmitJob) -> DomainResult<Self> {
        submission.validate()?;
        Ok(Self { submission })
    }

    /// Materialize the stored ticket once the store has assigned an id.
    pub fn into_ticket(self, id: JobId) -> JobTicket {
        let s = self.submission;
        JobTicket {
            id,
            job_number: s.job_number,
            customer_id: s.customer_id,
            vehicle_id: s.vehicle_id,
            mechanic_id: s.mechanic_id,
            repair_type: s.repair_type,
            description: s.description,
            priority: s.priority,
            status: JobStatus::Pending,
            submitted_by: s.submitted_by,
            submitted_at: s.occurred_at,
            assigned_approver: s.assigned_approver,
            approved_by: None,
            approved_at: None,
            rejected_by: None,
            rejected_at: None,
            rejection_reason: None,
            started_at: None,
            completed_at: None,
            estimated_cost: s.estimated_cost,
            final_cost: None,
            notes: s.notes,
            version: 0,
        }
    }
}

/// Command: ApproveJob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApproveJob {
    pub approved_by: String,
    pub mechanic_id: Option<MechanicId>,
    pub estimated_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RejectJob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectJob {
    /// Blank falls back to `Manager`.
    pub rejected_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: StartJob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartJob {
    pub occurred_at: DateTime<Utc>,
}

/// Command: CompleteJob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteJob {
    pub final_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobCommand {
    Resubmit(SubmitJob),
    Approve(ApproveJob),
    Reject(RejectJob),
    Start(StartJob),
    Complete(CompleteJob),
}

/// Event: JobResubmitted (PENDING ticket overwritten by a new submission).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResubmitted {
    pub job_id: JobId,
    pub submission: SubmitJob,
}

/// Event: JobApproved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApproved {
    pub job_id: JobId,
    pub approved_by: String,
    pub mechanic_id: Option<MechanicId>,
    pub estimated_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRejected {
    pub job_id: JobId,
    pub rejected_by: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobStarted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStarted {
    pub job_id: JobId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobCompleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCompleted {
    pub job_id: JobId,
    pub final_cost: Option<Decimal>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobEvent {
    Resubmitted(JobResubmitted),
    Approved(JobApproved),
    Rejected(JobRejected),
    Started(JobStarted),
    Completed(JobCompleted),
}

impl Event for JobEvent {
    fn event_type(&self) -> &'static str {
        match self {
            JobEvent::Resubmitted(_) => "jobs.ticket.resubmitted",
            JobEvent::Approved(_) => "jobs.ticket.approved",
            JobEvent::Rejected(_) => "jobs.ticket.rejected",
            JobEvent::Started(_) => "jobs.ticket.started",
            JobEvent::Completed(_) => "jobs.ticket.completed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            JobEvent::Resubmitted(e) => e.submission.occurred_at,
            JobEvent::Approved(e) => e.occurred_at,
            JobEvent::Rejected(e) => e.occurred_at,
            JobEvent::Started(e) => e.occurred_at,
            JobEvent::Completed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for JobTicket {
    type Command = JobCommand;
    type Event = JobEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            JobEvent::Resubmitted(e) => {
                let s = &e.submission;
                self.customer_id = s.customer_id;
                self.vehicle_id = s.vehicle_id;
                self.mechanic_id = s.mechanic_id;
                self.repair_type = s.repair_type.clone();
                self.description = s.description.clone();
                self.priority = s.priority;
                self.status = JobStatus::Pending;
                self.submitted_by = s.submitted_by.clone();
                self.submitted_at = s.occurred_at;
                self.assigned_approver = s.assigned_approver.clone();
                self.estimated_cost = s.estimated_cost;
                self.notes = s.notes.clone();
            }
            JobEvent::Approved(e) => {
                self.status = JobStatus::Approved;
                self.approved_by = Some(e.approved_by.clone());
                self.approved_at = Some(e.occurred_at);
                if e.mechanic_id.is_some() {
                    self.mechanic_id = e.mechanic_id;
                }
                if e.estimated_cost.is_some() {
                    self.estimated_cost = e.estimated_cost;
                }
                if e.notes.is_some() {
                    self.notes = e.notes.clone();
                }
            }
            JobEvent::Rejected(e) => {
                self.status = JobStatus::Rejected;
                self.rejected_by = Some(e.rejected_by.clone());
                self.rejected_at = Some(e.occurred_at);
                self.rejection_reason = Some(e.reason.clone());
            }
            JobEvent::Started(e) => {
                self.status = JobStatus::InProgress;
                self.started_at = Some(e.occurred_at);
            }
            JobEvent::Completed(e) => {
                self.status = JobStatus::Completed;
                self.completed_at = Some(e.occurred_at);
                if e.final_cost.is_some() {
                    self.final_cost = e.final_cost;
                }
                if e.notes.is_some() {
                    self.notes = e.notes.clone();
                }
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            JobCommand::Resubmit(cmd) => self.handle_resubmit(cmd),
            JobCommand::Approve(cmd) => self.handle_approve(cmd),
            JobCommand::Reject(cmd) => self.handle_reject(cmd),
            JobCommand::Start(cmd) => self.handle_start(cmd),
            JobCommand::Complete(cmd) => self.handle_complete(cmd),
        }
    }
}
