//! Service visit domain module: vehicles, service records and their priced
//! line items.
//!
//! Inputs are validated and priced here before any storage transaction opens;
//! persistence and stock effects are orchestrated by the infrastructure layer.

pub mod input;
pub mod record;
pub mod vehicle;

pub use input::{
    CreateServiceRecord, JobSubmission, LineItemInput, PreparedLine, PreparedServiceRecord,
    UpdateServiceRecord,
};
pub use record::{
    ItemType, NewLineItem, NewServiceRecord, ServiceLineItem, ServiceRecord,
    ServiceRecordWithLines, ServiceStatus, VisitDetails, job_number_for,
};
pub use vehicle::{NewVehicle, Vehicle, VehicleDetails, VehicleType, normalize_registration};
