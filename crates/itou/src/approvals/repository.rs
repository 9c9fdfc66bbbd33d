use chrono::NaiveDate;

use super::domain::{Approval, PoleEmploiApproval};
use super::prolongation::Prolongation;
use super::suspension::Suspension;
use crate::repository::RepositoryError;
use crate::users::UserId;

/// Storage of approvals and the periods attached to them.
///
/// Implementations keep `Approval::end_at` in step with suspensions and validated
/// prolongations, and refuse overlapping periods on one approval.
pub trait ApprovalRepository: Send + Sync {
    fn approval(&self, number: &str) -> Result<Option<Approval>, RepositoryError>;
    fn approvals_for(&self, job_seeker_id: UserId) -> Result<Vec<Approval>, RepositoryError>;
    fn all_approvals(&self) -> Result<Vec<Approval>, RepositoryError>;

    /// Pôle emploi approvals matching a `pole_emploi_id` and birthdate, latest start first.
    fn pole_emploi_approvals_for(
        &self,
        pole_emploi_id: &str,
        birthdate: NaiveDate,
    ) -> Result<Vec<PoleEmploiApproval>, RepositoryError>;
    fn insert_pole_emploi_approval(&self, approval: PoleEmploiApproval) -> Result<(), RepositoryError>;

    fn suspensions(&self, approval_number: &str) -> Result<Vec<Suspension>, RepositoryError>;
    /// Insert when `id` is 0, update otherwise. Returns the stored suspension.
    fn save_suspension(&self, suspension: Suspension) -> Result<Suspension, RepositoryError>;
    fn delete_suspension(&self, id: u64) -> Result<(), RepositoryError>;

    fn prolongations(&self, approval_number: &str) -> Result<Vec<Prolongation>, RepositoryError>;
    /// Insert when `id` is 0, update otherwise. Returns the stored prolongation.
    fn save_prolongation(&self, prolongation: Prolongation) -> Result<Prolongation, RepositoryError>;
    fn delete_prolongation(&self, id: u64) -> Result<(), RepositoryError>;
}
