use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::info;

use super::domain::{Approval, ApprovalError};
use super::prolongation::{Prolongation, ProlongationReason, ProlongationStatus};
use super::repository::ApprovalRepository;
use super::suspension::{Suspension, SuspensionReason};
use super::wrapper::ApprovalsWrapper;
use crate::repository::RepositoryError;
use crate::siaes::Siae;
use crate::users::{JobSeeker, UserId};

#[derive(Debug, Clone, Deserialize)]
pub struct SuspensionRequest {
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub reason: SuspensionReason,
    #[serde(default)]
    pub reason_explanation: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProlongationRequest {
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub reason: ProlongationReason,
    #[serde(default)]
    pub reason_explanation: String,
}

/// Approval lookups plus the suspension and prolongation lifecycle.
pub struct ApprovalService<R> {
    repository: Arc<R>,
}

impl<R> ApprovalService<R>
where
    R: ApprovalRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    /// Merged approvals of a job seeker. Pôle emploi approvals are matched on
    /// `pole_emploi_id` and birthdate, both required.
    pub fn wrapper_for(
        &self,
        job_seeker: &JobSeeker,
        today: NaiveDate,
    ) -> Result<ApprovalsWrapper, ApprovalError> {
        approvals_wrapper(self.repository.as_ref(), job_seeker, today)
    }

    pub fn suspend(
        &self,
        approval_number: &str,
        siae: &Siae,
        request: SuspensionRequest,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Suspension, ApprovalError> {
        let approval = self.fetch(approval_number)?;
        let suspension = Suspension {
            id: 0,
            approval_number: approval.number.clone(),
            start_at: request.start_at,
            end_at: request.end_at,
            siae_id: Some(siae.id),
            reason: request.reason,
            reason_explanation: request.reason_explanation,
            created_at: now,
            created_by: Some(actor),
        };
        let existing = self.repository.suspensions(&approval.number)?;
        suspension.validate(&approval, &existing, now.date_naive())?;

        let stored = self.repository.save_suspension(suspension)?;
        info!(
            approval = %approval.number,
            suspension_id = stored.id,
            days = stored.duration_days(),
            "approval suspended"
        );
        Ok(stored)
    }

    pub fn lift_suspension(&self, suspension_id: u64) -> Result<(), ApprovalError> {
        self.repository.delete_suspension(suspension_id)?;
        info!(suspension_id, "suspension removed");
        Ok(())
    }

    pub fn request_prolongation(
        &self,
        approval_number: &str,
        siae: &Siae,
        request: ProlongationRequest,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Prolongation, ApprovalError> {
        let approval = self.fetch(approval_number)?;
        let prolongation = Prolongation {
            id: 0,
            approval_number: approval.number.clone(),
            start_at: request.start_at,
            end_at: request.end_at,
            siae_id: siae.id,
            siae_kind: siae.kind,
            reason: request.reason,
            reason_explanation: request.reason_explanation,
            status: ProlongationStatus::NotSet,
            status_updated_at: None,
            status_updated_by: None,
            created_at: now,
            created_by: Some(actor),
        };
        let existing = self.repository.prolongations(&approval.number)?;
        prolongation.validate(&existing)?;

        let stored = self.repository.save_prolongation(prolongation)?;
        info!(approval = %approval.number, prolongation_id = stored.id, "prolongation requested");
        Ok(stored)
    }

    /// Validate or refuse a pending prolongation.
    pub fn decide_prolongation(
        &self,
        approval_number: &str,
        prolongation_id: u64,
        status: ProlongationStatus,
        actor: UserId,
        now: DateTime<Utc>,
    ) -> Result<Prolongation, ApprovalError> {
        let mut prolongation = self
            .repository
            .prolongations(approval_number)?
            .into_iter()
            .find(|p| p.id == prolongation_id)
            .ok_or_else(|| RepositoryError::NotFound(format!("prolongation {prolongation_id}")))?;

        prolongation.status = status;
        prolongation.status_updated_at = Some(now);
        prolongation.status_updated_by = Some(actor);

        let stored = self.repository.save_prolongation(prolongation)?;
        info!(
            approval = approval_number,
            prolongation_id,
            status = stored.status.label(),
            "prolongation status updated"
        );
        Ok(stored)
    }

    pub fn approval(&self, approval_number: &str) -> Result<Approval, ApprovalError> {
        self.fetch(approval_number)
    }

    fn fetch(&self, approval_number: &str) -> Result<Approval, ApprovalError> {
        let approval = self
            .repository
            .approval(approval_number)?
            .ok_or_else(|| RepositoryError::NotFound(format!("approval {approval_number}")))?;
        Ok(approval)
    }
}

pub(crate) fn approvals_wrapper<R>(
    repository: &R,
    job_seeker: &JobSeeker,
    today: NaiveDate,
) -> Result<ApprovalsWrapper, ApprovalError>
where
    R: ApprovalRepository + ?Sized,
{
    let itou = repository.approvals_for(job_seeker.id)?;
    let pole_emploi = match job_seeker.birthdate {
        Some(birthdate) if !job_seeker.pole_emploi_id.trim().is_empty() => {
            repository.pole_emploi_approvals_for(job_seeker.pole_emploi_id.trim(), birthdate)?
        }
        _ => Vec::new(),
    };
    Ok(ApprovalsWrapper::new(itou, pole_emploi, today))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::*;
    use crate::approvals::{ApprovalPeriod, PoleEmploiApproval};
    use crate::approvals::wrapper::ApprovalStatus;
    use crate::job_applications::tests::common::{date, job_seeker, now, siae};
    use crate::store::{MemoryStore, StoreSnapshot};

    const NUMBER: &str = "999992100001";

    fn service() -> (ApprovalService<MemoryStore>, Arc<MemoryStore>) {
        let snapshot = StoreSnapshot {
            approvals: vec![Approval {
                number: NUMBER.to_string(),
                job_seeker_id: UserId(7),
                start_at: date(2021, 5, 17),
                end_at: date(2023, 5, 16),
                created_at: now(),
                created_by: None,
            }],
            ..StoreSnapshot::default()
        };
        let store = Arc::new(MemoryStore::from_snapshot(snapshot));
        (ApprovalService::new(store.clone()), store)
    }

    fn sickness(start_at: NaiveDate, end_at: NaiveDate) -> SuspensionRequest {
        SuspensionRequest {
            start_at,
            end_at,
            reason: SuspensionReason::Sickness,
            reason_explanation: String::new(),
        }
    }

    #[test]
    fn suspension_pushes_back_the_end_until_lifted() {
        let (service, _) = service();
        let today = now() + Duration::days(60);

        let suspension = service
            .suspend(
                NUMBER,
                &siae(3),
                sickness(date(2021, 6, 1), date(2021, 6, 30)),
                UserId(900),
                today,
            )
            .expect("suspended");
        assert_eq!(suspension.siae_id, Some(3));
        assert_eq!(
            service.approval(NUMBER).expect("approval").end_at,
            date(2023, 5, 16) + Duration::days(29)
        );

        service.lift_suspension(suspension.id).expect("lifted");
        assert_eq!(
            service.approval(NUMBER).expect("approval").end_at,
            date(2023, 5, 16)
        );
    }

    #[test]
    fn overlapping_suspensions_are_refused() {
        let (service, _) = service();
        let today = now() + Duration::days(60);
        service
            .suspend(
                NUMBER,
                &siae(3),
                sickness(date(2021, 6, 1), date(2021, 6, 30)),
                UserId(900),
                today,
            )
            .expect("first suspension");

        let error = service
            .suspend(
                NUMBER,
                &siae(3),
                sickness(date(2021, 6, 15), date(2021, 7, 1)),
                UserId(900),
                today,
            )
            .expect_err("overlap");

        assert!(matches!(error, ApprovalError::Overlap { .. }));
    }

    #[test]
    fn force_majeure_requires_an_explanation() {
        let (service, _) = service();
        let mut request = sickness(date(2021, 6, 1), date(2021, 6, 30));
        request.reason = SuspensionReason::ForceMajeure;

        let error = service
            .suspend(NUMBER, &siae(3), request, UserId(900), now() + Duration::days(60))
            .expect_err("explanation missing");

        assert!(matches!(error, ApprovalError::ExplanationRequired));
    }

    #[test]
    fn unknown_approval_is_not_found() {
        let (service, _) = service();

        let error = service.approval("999990000000").expect_err("unknown");

        assert!(matches!(
            error,
            ApprovalError::Repository(RepositoryError::NotFound(_))
        ));
    }

    #[test]
    fn only_validated_prolongations_extend_the_approval() {
        let (service, _) = service();
        let request = ProlongationRequest {
            start_at: date(2023, 5, 17),
            end_at: date(2023, 8, 16),
            reason: ProlongationReason::CompleteTraining,
            reason_explanation: String::new(),
        };

        let pending = service
            .request_prolongation(NUMBER, &siae(3), request, UserId(900), now())
            .expect("requested");
        assert_eq!(pending.status, ProlongationStatus::NotSet);
        assert_eq!(
            service.approval(NUMBER).expect("approval").end_at,
            date(2023, 5, 16)
        );

        let validated = service
            .decide_prolongation(
                NUMBER,
                pending.id,
                ProlongationStatus::Validated,
                UserId(42),
                now(),
            )
            .expect("validated");
        assert_eq!(validated.status_updated_by, Some(UserId(42)));
        assert_eq!(
            service.approval(NUMBER).expect("approval").end_at,
            date(2023, 5, 16) + Duration::days(validated.duration_days())
        );
    }

    #[test]
    fn particular_difficulties_are_reserved_to_ai_and_aci() {
        let (service, _) = service();
        let request = ProlongationRequest {
            start_at: date(2023, 5, 17),
            end_at: date(2024, 5, 16),
            reason: ProlongationReason::ParticularDifficulties,
            reason_explanation: String::new(),
        };

        let error = service
            .request_prolongation(NUMBER, &siae(3), request, UserId(900), now())
            .expect_err("EI cannot ask");

        assert!(matches!(error, ApprovalError::ReasonReservedToAiAci(_)));
    }

    #[test]
    fn wrapper_matches_pole_emploi_approvals_on_id_and_birthdate() {
        let (service, store) = service();
        store
            .insert_pole_emploi_approval(PoleEmploiApproval {
                number: "592291910447".to_string(),
                pole_emploi_id: "1234567A".to_string(),
                first_name: "JEANNE".to_string(),
                last_name: "DUPONT".to_string(),
                birth_name: String::new(),
                birthdate: date(1990, 2, 14),
                start_at: date(2020, 1, 1),
                end_at: date(2021, 1, 1),
                pe_structure_code: String::new(),
            })
            .expect("inserted");

        let mut seeker = job_seeker(8);
        let today = now().date_naive();
        let wrapper = service.wrapper_for(&seeker, today).expect("wrapper");
        assert_eq!(wrapper.status(), ApprovalStatus::NoneFound);

        seeker.pole_emploi_id = "1234567A".to_string();
        let wrapper = service.wrapper_for(&seeker, today).expect("wrapper");
        assert_eq!(wrapper.status(), ApprovalStatus::InWaitingPeriod);
        assert_eq!(
            wrapper.latest_approval().map(|approval| approval.number().to_string()),
            Some("592291910447".to_string())
        );
    }
}
