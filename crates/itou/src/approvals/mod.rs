//! PASS IAE approvals: Itou and Pôle emploi approvals, numbering, suspensions,
//! prolongations and the merged per-job-seeker view.

pub mod domain;
pub mod numbering;
pub mod prolongation;
pub mod repository;
pub mod service;
pub mod suspension;
pub mod wrapper;

pub use domain::{
    format_number_with_spaces, Approval, ApprovalError, ApprovalPeriod, PoleEmploiApproval,
    DEFAULT_APPROVAL_YEARS, WAITING_PERIOD_YEARS,
};
pub use numbering::NumberAllocator;
pub use prolongation::{Prolongation, ProlongationReason, ProlongationStatus};
pub use repository::ApprovalRepository;
pub use service::{ApprovalService, ProlongationRequest, SuspensionRequest};
pub use suspension::{next_min_start_at, Suspension, SuspensionReason};
pub use wrapper::{AnyApproval, ApprovalStatus, ApprovalsWrapper};
