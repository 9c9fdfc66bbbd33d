use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, warn};

use super::domain::{
    AcceptRequest, ApprovalDeliveryMode, JobApplication, JobApplicationId, JobApplicationState,
    JobApplicationTransitionLog, NewJobApplication, PostponeRequest, ProcessRequest,
    RefuseRequest,
};
use super::notifications::{self, EmailMessage, Mailer, NotificationError};
use super::repository::{JobApplicationRepository, WorkflowChangeset};
use super::workflow::{self, Transition, TransitionError};
use crate::approvals::domain::add_months;
use crate::approvals::service::approvals_wrapper;
use crate::approvals::{
    AnyApproval, Approval, ApprovalError, ApprovalPeriod, ApprovalRepository, ApprovalsWrapper,
    NumberAllocator,
};
use crate::config::WorkflowConfig;
use crate::repository::RepositoryError;
use crate::users::Actor;

/// Longest contract accepted when hiring, in months.
const MAX_HIRING_MONTHS: u32 = 24;

/// Drives job applications through their workflow and its PASS IAE side effects.
pub struct JobApplicationService<R, M> {
    repository: Arc<R>,
    mailer: Arc<M>,
    workflow: WorkflowConfig,
    numbering: NumberAllocator,
}

impl<R, M> JobApplicationService<R, M>
where
    R: JobApplicationRepository + ApprovalRepository + 'static,
    M: Mailer + 'static,
{
    pub fn new(
        repository: Arc<R>,
        mailer: Arc<M>,
        workflow: WorkflowConfig,
        itou_prefix: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            mailer,
            workflow,
            numbering: NumberAllocator::new(itou_prefix),
        }
    }

    pub fn submit(
        &self,
        submission: NewJobApplication,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, WorkflowError> {
        if submission.job_seeker.email.trim().is_empty() {
            return Err(WorkflowError::Submission(
                "le candidat doit avoir une adresse e-mail".to_string(),
            ));
        }
        if !submission.to_siae.has_valid_siret() {
            return Err(WorkflowError::Submission(format!(
                "SIRET invalide pour la structure {}",
                submission.to_siae.id
            )));
        }
        if self.has_suspended_approval(&submission, now.date_naive())? {
            return Err(WorkflowError::Submission(
                "le PASS IAE du candidat est suspendu, seul l'employeur actuel peut l'embaucher"
                    .to_string(),
            ));
        }

        let application = JobApplication {
            id: JobApplicationId::new(),
            job_seeker: submission.job_seeker,
            sender: submission.sender,
            to_siae: submission.to_siae,
            state: JobApplicationState::New,
            selected_jobs: submission.selected_jobs,
            message: submission.message,
            answer: String::new(),
            refusal_reason: None,
            eligibility_diagnosis: submission.eligibility_diagnosis,
            hiring_start_at: None,
            hiring_end_at: None,
            hiring_without_approval: false,
            approval_number: None,
            approval_delivery_mode: None,
            approval_number_sent_by_email: false,
            approval_number_sent_at: None,
            created_at: now,
            updated_at: now,
        };

        let stored = JobApplicationRepository::insert(self.repository.as_ref(), application)?;
        info!(
            job_application_id = %stored.id,
            siae_id = stored.to_siae.id,
            sent_by_proxy = stored.is_sent_by_proxy(),
            "job application submitted"
        );

        if !stored.to_siae.member_emails.is_empty() {
            self.notify(vec![notifications::new_for_siae(&stored)])?;
        }
        Ok(stored)
    }

    pub fn process(
        &self,
        id: JobApplicationId,
        actor: &Actor,
        request: ProcessRequest,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, WorkflowError> {
        let mut application = self.fetch(id)?;
        let log = workflow::apply(&mut application, Transition::Process, Some(actor.user_id), now)?;
        if let Some(diagnosis) = request.eligibility_diagnosis {
            application.eligibility_diagnosis = Some(diagnosis);
        }
        self.commit_single(application, log)
    }

    pub fn postpone(
        &self,
        id: JobApplicationId,
        actor: &Actor,
        request: PostponeRequest,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, WorkflowError> {
        let mut application = self.fetch(id)?;
        let log = workflow::apply(&mut application, Transition::Postpone, Some(actor.user_id), now)?;
        application.answer = request.answer;
        self.commit_single(application, log)
    }

    /// Hire the job seeker. Other pending applications of the same job seeker become
    /// obsolete and a PASS IAE is attached when the SIAE is subject to eligibility rules.
    pub fn accept(
        &self,
        id: JobApplicationId,
        actor: &Actor,
        request: AcceptRequest,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, WorkflowError> {
        let today = now.date_naive();
        validate_hiring_dates(&request, today)?;

        let mut application = self.fetch(id)?;
        let log = workflow::apply(&mut application, Transition::Accept, Some(actor.user_id), now)?;
        application.hiring_start_at = Some(request.hiring_start_at);
        application.hiring_end_at = request.hiring_end_at;
        application.answer = request.answer;
        application.hiring_without_approval = request.hiring_without_approval;

        let mut changeset = WorkflowChangeset::default();
        changeset.logs.push(log);

        let siblings = self
            .repository
            .for_job_seeker(application.job_seeker.id)?
            .into_iter()
            .filter(|other| other.id != application.id && other.state.is_pending());
        for mut sibling in siblings {
            let log = workflow::apply(
                &mut sibling,
                Transition::RenderObsolete,
                Some(actor.user_id),
                now,
            )?;
            changeset.logs.push(log);
            changeset.applications.push(sibling);
        }

        let mut emails = vec![notifications::accept(&application)];

        if application.to_siae.is_subject_to_eligibility_rules()
            && !application.hiring_without_approval
        {
            let wrapper = approvals_wrapper(self.repository.as_ref(), &application.job_seeker, today)?;
            if wrapper.has_in_waiting_period() && !application.sender.is_authorized_prescriber() {
                return Err(AcceptError::WaitingPeriod.into());
            }

            match self.approval_for_hiring(&application, &wrapper, actor, now)? {
                Some((approval, is_new)) => {
                    application.approval_number = Some(approval.number.clone());
                    application.approval_delivery_mode = Some(ApprovalDeliveryMode::Automatic);
                    application.approval_number_sent_by_email = true;
                    application.approval_number_sent_at = Some(now);
                    emails.push(notifications::approval_delivered(&application, &approval, actor));
                    if is_new {
                        changeset.approvals_to_insert.push(approval);
                    }
                }
                None => {
                    application.approval_delivery_mode = Some(ApprovalDeliveryMode::Manual);
                    emails.push(notifications::manual_approval_request(
                        &application,
                        actor,
                        &self.workflow.contact_email,
                    ));
                }
            }
        }

        changeset.applications.insert(0, application.clone());
        let obsolete = changeset.applications.len() - 1;
        self.repository.commit(changeset)?;
        info!(
            job_application_id = %application.id,
            approval = application.approval_number.as_deref().unwrap_or("-"),
            delivery = ?application.approval_delivery_mode,
            obsolete,
            "job application accepted"
        );

        self.notify(emails)?;
        Ok(application)
    }

    pub fn refuse(
        &self,
        id: JobApplicationId,
        actor: &Actor,
        request: RefuseRequest,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, WorkflowError> {
        let mut application = self.fetch(id)?;
        let log = workflow::apply(&mut application, Transition::Refuse, Some(actor.user_id), now)?;
        application.refusal_reason = Some(request.refusal_reason);
        application.answer = request.answer;
        let stored = self.commit_single(application, log)?;
        self.notify(vec![notifications::refuse(&stored)])?;
        Ok(stored)
    }

    /// Cancel a hiring within `cancellation_days` of its start. The PASS IAE is
    /// deleted when no other application uses it.
    pub fn cancel(
        &self,
        id: JobApplicationId,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, WorkflowError> {
        let mut application = self.fetch(id)?;
        if application.state == JobApplicationState::Accepted {
            if let Some(deadline) = self.cancellation_deadline(&application) {
                if now.date_naive() > deadline {
                    return Err(TransitionError::CancellationWindowClosed { deadline }.into());
                }
            }
        }
        let log = workflow::apply(&mut application, Transition::Cancel, Some(actor.user_id), now)?;

        let mut changeset = WorkflowChangeset::default();
        if let Some(number) = application.approval_number.clone() {
            let shared = self
                .repository
                .referencing_approval(&number)?
                .iter()
                .any(|other| other.id != application.id);
            if !shared {
                changeset.approvals_to_delete.push(number);
                application.approval_number = None;
            }
        }
        changeset.logs.push(log);
        changeset.applications.push(application.clone());
        self.repository.commit(changeset)?;
        info!(job_application_id = %application.id, "hiring cancelled");

        self.notify(vec![notifications::cancel(&application, actor)])?;
        Ok(application)
    }

    pub fn render_obsolete(
        &self,
        id: JobApplicationId,
        actor: Option<&Actor>,
        now: DateTime<Utc>,
    ) -> Result<JobApplication, WorkflowError> {
        let mut application = self.fetch(id)?;
        let log = workflow::apply(
            &mut application,
            Transition::RenderObsolete,
            actor.map(|a| a.user_id),
            now,
        )?;
        self.commit_single(application, log)
    }

    pub fn get(&self, id: JobApplicationId) -> Result<JobApplication, WorkflowError> {
        self.fetch(id)
    }

    pub fn logs(
        &self,
        id: JobApplicationId,
    ) -> Result<Vec<JobApplicationTransitionLog>, WorkflowError> {
        self.fetch(id)?;
        Ok(self.repository.logs(id)?)
    }

    /// Applications received by an SIAE, most recent first.
    pub fn list_for_siae(&self, siae_id: u64) -> Result<Vec<JobApplication>, WorkflowError> {
        let mut applications = self.repository.for_siae(siae_id)?;
        applications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(applications)
    }

    /// Last day on which an accepted hiring can still be cancelled.
    pub fn cancellation_deadline(&self, application: &JobApplication) -> Option<NaiveDate> {
        application
            .hiring_start_at
            .map(|start| start + Duration::days(self.workflow.cancellation_days))
    }

    fn fetch(&self, id: JobApplicationId) -> Result<JobApplication, WorkflowError> {
        let application = self
            .repository
            .fetch(id)?
            .ok_or_else(|| RepositoryError::NotFound(format!("job application {id}")))?;
        Ok(application)
    }

    fn commit_single(
        &self,
        application: JobApplication,
        log: JobApplicationTransitionLog,
    ) -> Result<JobApplication, WorkflowError> {
        let changeset = WorkflowChangeset {
            applications: vec![application.clone()],
            logs: vec![log.clone()],
            ..WorkflowChangeset::default()
        };
        self.repository.commit(changeset)?;
        info!(
            job_application_id = %application.id,
            transition = %log.transition,
            from = %log.from_state,
            to = %log.to_state,
            "job application transition"
        );
        Ok(application)
    }

    /// Returns the approval to attach and whether it has to be stored.
    /// `None` means the PASS IAE must be delivered manually.
    fn approval_for_hiring(
        &self,
        application: &JobApplication,
        wrapper: &ApprovalsWrapper,
        actor: &Actor,
        now: DateTime<Utc>,
    ) -> Result<Option<(Approval, bool)>, WorkflowError> {
        if wrapper.has_valid() {
            return match wrapper.latest_approval() {
                Some(AnyApproval::Itou(approval)) => Ok(Some((approval.clone(), false))),
                Some(AnyApproval::PoleEmploi(pole_emploi)) => {
                    let mut approval = pole_emploi.to_approval(application.job_seeker.id, now);
                    approval.created_by = Some(actor.user_id);
                    approval.apply_lockdown_extension(self.numbering.prefix());
                    if let Some(existing) = self.repository.approval(&approval.number)? {
                        return Ok(Some((existing, false)));
                    }
                    approval.validate()?;
                    Ok(Some((approval, true)))
                }
                None => Err(ApprovalError::NoValidApproval.into()),
            };
        }

        if !application.job_seeker.has_usable_national_id() {
            return Ok(None);
        }

        let Some(hiring_start_at) = application.hiring_start_at else {
            return Ok(None);
        };
        let existing = self.repository.all_approvals()?;
        let approval = Approval {
            number: self.numbering.allocate(hiring_start_at, &existing),
            job_seeker_id: application.job_seeker.id,
            start_at: hiring_start_at,
            end_at: Approval::default_end_date(hiring_start_at),
            created_at: now,
            created_by: Some(actor.user_id),
        };
        approval.validate()?;
        Ok(Some((approval, true)))
    }

    fn has_suspended_approval(
        &self,
        submission: &NewJobApplication,
        today: NaiveDate,
    ) -> Result<bool, WorkflowError> {
        let current = self
            .repository
            .approvals_for(submission.job_seeker.id)?
            .into_iter()
            .filter(|approval| approval.is_in_progress(today));
        for approval in current {
            let suspended = self
                .repository
                .suspensions(&approval.number)?
                .iter()
                .any(|suspension| suspension.is_in_progress(today));
            let hired_by_same_siae = submission.sender.siae_id == Some(submission.to_siae.id);
            if suspended && !hired_by_same_siae {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn notify(&self, messages: Vec<EmailMessage>) -> Result<(), WorkflowError> {
        let count = messages.len();
        self.mailer.send(messages).map_err(|error| {
            warn!(%error, count, "notification delivery failed after commit");
            WorkflowError::Notification(error)
        })
    }
}

fn validate_hiring_dates(request: &AcceptRequest, today: NaiveDate) -> Result<(), AcceptError> {
    if request.hiring_start_at < today {
        return Err(AcceptError::HiringStartInPast);
    }
    if let Some(end) = request.hiring_end_at {
        if end <= request.hiring_start_at {
            return Err(AcceptError::HiringEndBeforeStart);
        }
        let max = add_months(request.hiring_start_at, MAX_HIRING_MONTHS);
        if end > max {
            return Err(AcceptError::HiringEndTooFar { max });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AcceptError {
    #[error("la date de début du contrat ne doit pas être dans le passé")]
    HiringStartInPast,
    #[error("la date de fin du contrat doit être postérieure à la date de début")]
    HiringEndBeforeStart,
    #[error("la durée du contrat ne peut dépasser 24 mois (fin au plus tard le {max})")]
    HiringEndTooFar { max: NaiveDate },
    #[error("{}", ApprovalsWrapper::ERROR_CANNOT_OBTAIN_NEW_FOR_PROXY)]
    WaitingPeriod,
}

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Accept(#[from] AcceptError),
    #[error("candidature refusée : {0}")]
    Submission(String),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("state saved but notification failed: {0}")]
    Notification(#[from] NotificationError),
}
