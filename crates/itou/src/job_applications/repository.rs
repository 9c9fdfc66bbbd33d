use super::domain::{JobApplication, JobApplicationId, JobApplicationTransitionLog};
use crate::approvals::Approval;
use crate::repository::RepositoryError;
use crate::users::UserId;

/// Every stored change produced by one workflow call.
///
/// Each log's `from_state` is the state the application had when it was read, so
/// a store can refuse a changeset built from a stale snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkflowChangeset {
    pub applications: Vec<JobApplication>,
    pub logs: Vec<JobApplicationTransitionLog>,
    pub approvals_to_insert: Vec<Approval>,
    pub approvals_to_delete: Vec<String>,
}

impl WorkflowChangeset {
    pub fn is_empty(&self) -> bool {
        self.applications.is_empty()
            && self.logs.is_empty()
            && self.approvals_to_insert.is_empty()
            && self.approvals_to_delete.is_empty()
    }
}

pub trait JobApplicationRepository: Send + Sync {
    fn insert(&self, application: JobApplication) -> Result<JobApplication, RepositoryError>;
    fn fetch(&self, id: JobApplicationId) -> Result<Option<JobApplication>, RepositoryError>;
    fn for_job_seeker(&self, job_seeker_id: UserId) -> Result<Vec<JobApplication>, RepositoryError>;
    fn for_siae(&self, siae_id: u64) -> Result<Vec<JobApplication>, RepositoryError>;
    fn all(&self) -> Result<Vec<JobApplication>, RepositoryError>;
    fn referencing_approval(&self, number: &str) -> Result<Vec<JobApplication>, RepositoryError>;
    fn logs(&self, id: JobApplicationId) -> Result<Vec<JobApplicationTransitionLog>, RepositoryError>;

    /// Apply every part of the changeset or none of it.
    fn commit(&self, changeset: WorkflowChangeset) -> Result<(), RepositoryError>;
}
