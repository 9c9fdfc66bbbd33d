//! Job applications sent to SIAE and their hiring workflow.

pub mod csv_export;
pub mod domain;
pub mod notifications;
pub mod repository;
pub mod router;
pub mod service;
pub mod workflow;

#[cfg(test)]
pub(crate) mod tests;

pub use domain::{
    AcceptRequest, ApprovalDeliveryMode, JobApplication, JobApplicationId,
    JobApplicationState, JobApplicationTransitionLog, JobApplicationView, NewJobApplication,
    PostponeRequest, ProcessRequest, RefusalReason, RefuseRequest,
};
pub use notifications::{EmailMessage, Mailer, NotificationError};
pub use repository::{JobApplicationRepository, WorkflowChangeset};
pub use router::job_application_router;
pub use service::{AcceptError, JobApplicationService, WorkflowError};
pub use workflow::{available_transitions, Transition, TransitionError};
