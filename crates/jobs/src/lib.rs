//! Job board domain module (approval workflow for repair jobs).
//!
//! A ticket moves `PENDING -> APPROVED -> IN_PROGRESS -> COMPLETED`, or
//! `PENDING -> REJECTED`. Decisions are pure: `handle` validates a command
//! against the current state and returns events, `apply` evolves state.

pub mod ticket;

pub use ticket::{
    ApproveJob, CompleteJob, JobApproved, JobCommand, JobCompleted, JobEvent, JobRejected,
    JobResubmitted, JobStarted, JobStatus, JobTicket, NewJobTicket, Priority, RejectJob, StartJob,
    SubmitJob,
};
