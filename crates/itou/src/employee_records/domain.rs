use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::batch::{self, BatchError};
use crate::approvals::Approval;
use crate::job_applications::{JobApplication, JobApplicationId, JobApplicationState};
use crate::siaes::SiaeKind;
use crate::users::{JobSeeker, JobSeekerProfile, ProfileError, UserKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmployeeRecordStatus {
    #[default]
    New,
    Ready,
    Sent,
    Rejected,
    Processed,
}

impl EmployeeRecordStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "Nouvelle fiche salarié",
            Self::Ready => "Données complètes, prête à l'envoi ASP",
            Self::Sent => "Envoyée ASP",
            Self::Rejected => "Rejet ASP",
            Self::Processed => "Traitée ASP",
        }
    }
}

impl std::fmt::Display for EmployeeRecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// "Fiche salarié": the hiring data sent to ASP for an accepted application.
///
/// The job seeker is a snapshot taken at creation and refreshed by `update_as_ready`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: u64,
    pub status: EmployeeRecordStatus,
    pub job_application_id: JobApplicationId,
    pub approval_number: String,
    pub siret: String,
    pub siae_kind: SiaeKind,
    /// ASP measure code, `EI_DC`, `ACI_DC`…
    pub asp_measure: String,
    #[serde(default)]
    pub financial_annex: Option<String>,
    pub job_seeker: JobSeeker,
    pub sender_kind: UserKind,
    #[serde(default)]
    pub asp_batch_file: Option<String>,
    #[serde(default)]
    pub asp_batch_line_number: Option<u32>,
    #[serde(default)]
    pub asp_processing_code: Option<String>,
    #[serde(default)]
    pub asp_processing_label: Option<String>,
    /// Copy of the line accepted by ASP, kept as proof.
    #[serde(default)]
    pub archived_json: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EmployeeRecordError {
    #[error("la candidature doit être acceptée")]
    JobApplicationNotAccepted,
    #[error("la candidature peut encore être annulée (jusqu'au {deadline})")]
    JobApplicationTooRecent { deadline: NaiveDate },
    #[error("la candidature n'a pas de PASS IAE")]
    MissingApproval,
    #[error("le candidat n'a pas de profil salarié")]
    MissingJobSeekerProfile,
    #[error("profil du candidat incomplet : {0}")]
    IncompleteJobSeekerProfile(#[from] ProfileError),
    #[error("une fiche salarié existe déjà pour le SIRET {siret} et le PASS IAE {approval_number}")]
    Duplicate {
        siret: String,
        approval_number: String,
    },
    #[error("les structures de type {0:?} ne transmettent pas de fiche salarié")]
    UnsupportedSiaeKind(SiaeKind),
    #[error("action `{action}` impossible depuis le statut {status}")]
    InvalidStatus {
        action: &'static str,
        status: EmployeeRecordStatus,
    },
    #[error("cette fiche salarié est historisée et non modifiable")]
    NotUpdatable,
    #[error(transparent)]
    Batch(#[from] BatchError),
}

impl EmployeeRecord {
    /// Build a record for an accepted hiring that can no longer be cancelled.
    ///
    /// `existing` is searched for a record with the same SIRET and approval.
    pub fn from_job_application(
        application: &JobApplication,
        approval: Option<&Approval>,
        existing: &[EmployeeRecord],
        cancellation_days: i64,
        now: DateTime<Utc>,
    ) -> Result<Self, EmployeeRecordError> {
        if application.state != JobApplicationState::Accepted {
            return Err(EmployeeRecordError::JobApplicationNotAccepted);
        }
        if let Some(start) = application.hiring_start_at {
            let deadline = start + Duration::days(cancellation_days);
            if now.date_naive() <= deadline {
                return Err(EmployeeRecordError::JobApplicationTooRecent { deadline });
            }
        }

        let approval = approval
            .filter(|approval| application.approval_number.as_deref() == Some(&approval.number))
            .ok_or(EmployeeRecordError::MissingApproval)?;

        let profile = application
            .job_seeker
            .profile
            .as_ref()
            .ok_or(EmployeeRecordError::MissingJobSeekerProfile)?;
        profile.validate()?;

        let siret = application.to_siae.siret.clone();
        if existing
            .iter()
            .any(|record| record.siret == siret && record.approval_number == approval.number)
        {
            return Err(EmployeeRecordError::Duplicate {
                siret,
                approval_number: approval.number.clone(),
            });
        }

        let asp_measure = application
            .to_siae
            .kind
            .asp_measure()
            .ok_or(EmployeeRecordError::UnsupportedSiaeKind(application.to_siae.kind))?;

        Ok(Self {
            id: 0,
            status: EmployeeRecordStatus::New,
            job_application_id: application.id,
            approval_number: approval.number.clone(),
            siret,
            siae_kind: application.to_siae.kind,
            asp_measure: asp_measure.to_string(),
            financial_annex: None,
            job_seeker: application.job_seeker.clone(),
            sender_kind: application.sender.kind,
            asp_batch_file: None,
            asp_batch_line_number: None,
            asp_processing_code: None,
            asp_processing_label: None,
            archived_json: None,
            created_at: now,
            updated_at: None,
        })
    }

    /// Processed records with an archived copy are frozen.
    pub fn is_updatable(&self) -> bool {
        !(self.status == EmployeeRecordStatus::Processed && self.archived_json.is_some())
    }

    pub fn profile(&self) -> Option<&JobSeekerProfile> {
        self.job_seeker.profile.as_ref()
    }

    /// New or rejected record whose profile is complete.
    pub fn update_as_ready(&mut self, now: DateTime<Utc>) -> Result<(), EmployeeRecordError> {
        self.ensure("ready", &[EmployeeRecordStatus::New, EmployeeRecordStatus::Rejected])?;
        self.profile()
            .ok_or(EmployeeRecordError::MissingJobSeekerProfile)?
            .validate()?;
        self.status = EmployeeRecordStatus::Ready;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn update_as_sent(
        &mut self,
        batch_file: &str,
        line_number: u32,
        now: DateTime<Utc>,
    ) -> Result<(), EmployeeRecordError> {
        self.ensure("sent", &[EmployeeRecordStatus::Ready])?;
        batch::validate_batch_filename(batch_file)?;
        self.status = EmployeeRecordStatus::Sent;
        self.asp_batch_file = Some(batch_file.to_string());
        self.asp_batch_line_number = Some(line_number);
        self.asp_processing_code = None;
        self.asp_processing_label = None;
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn update_as_rejected(
        &mut self,
        code: &str,
        label: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EmployeeRecordError> {
        self.ensure("rejected", &[EmployeeRecordStatus::Sent])?;
        self.status = EmployeeRecordStatus::Rejected;
        self.asp_processing_code = Some(code.to_string());
        self.asp_processing_label = Some(label.to_string());
        self.updated_at = Some(now);
        Ok(())
    }

    pub fn update_as_accepted(
        &mut self,
        code: &str,
        label: &str,
        archive: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), EmployeeRecordError> {
        self.ensure("accepted", &[EmployeeRecordStatus::Sent])?;
        self.status = EmployeeRecordStatus::Processed;
        self.asp_processing_code = Some(code.to_string());
        self.asp_processing_label = Some(label.to_string());
        self.archived_json = Some(archive);
        self.updated_at = Some(now);
        Ok(())
    }

    fn ensure(
        &self,
        action: &'static str,
        allowed: &[EmployeeRecordStatus],
    ) -> Result<(), EmployeeRecordError> {
        if !self.is_updatable() {
            return Err(EmployeeRecordError::NotUpdatable);
        }
        if !allowed.contains(&self.status) {
            return Err(EmployeeRecordError::InvalidStatus {
                action,
                status: self.status,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_applications::JobApplicationState;
    use crate::siaes::Siae;
    use crate::users::tests::complete_profile;
    use crate::users::{Sender, UserId};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2021, 5, 10, 9, 0, 0).single().expect("valid time")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn approval() -> Approval {
        Approval {
            number: "999992100042".to_string(),
            job_seeker_id: UserId(7),
            start_at: date(2021, 4, 1),
            end_at: date(2023, 3, 31),
            created_at: now(),
            created_by: None,
        }
    }

    fn accepted_application() -> JobApplication {
        JobApplication {
            id: JobApplicationId::new(),
            job_seeker: JobSeeker {
                id: UserId(7),
                email: "jeanne@example.com".to_string(),
                first_name: "Jeanne".to_string(),
                last_name: "Dupont".to_string(),
                title: None,
                birthdate: Some(date(1990, 2, 14)),
                phone: String::new(),
                nir: "290021234567890".to_string(),
                pole_emploi_id: String::new(),
                city: "Lille".to_string(),
                department: "59".to_string(),
                profile: Some(complete_profile()),
            },
            sender: Sender {
                user_id: UserId(7),
                kind: UserKind::JobSeeker,
                email: "jeanne@example.com".to_string(),
                first_name: "Jeanne".to_string(),
                last_name: "Dupont".to_string(),
                prescriber_organization: None,
                siae_id: None,
            },
            to_siae: Siae {
                id: 3,
                siret: "12345678900011".to_string(),
                kind: SiaeKind::Ei,
                name: "Recyclerie".to_string(),
                brand: String::new(),
                department: "59".to_string(),
                member_emails: Vec::new(),
            },
            state: JobApplicationState::Accepted,
            selected_jobs: Vec::new(),
            message: String::new(),
            answer: String::new(),
            refusal_reason: None,
            eligibility_diagnosis: None,
            hiring_start_at: Some(date(2021, 4, 1)),
            hiring_end_at: None,
            hiring_without_approval: false,
            approval_number: Some("999992100042".to_string()),
            approval_delivery_mode: None,
            approval_number_sent_by_email: true,
            approval_number_sent_at: Some(now()),
            created_at: now(),
            updated_at: now(),
        }
    }

    fn ready_record() -> EmployeeRecord {
        let mut record =
            EmployeeRecord::from_job_application(&accepted_application(), Some(&approval()), &[], 4, now())
                .expect("record created");
        record.update_as_ready(now()).expect("ready");
        record
    }

    #[test]
    fn creation_requires_an_accepted_old_enough_hiring_with_approval() {
        let approval = approval();

        let mut application = accepted_application();
        application.state = JobApplicationState::New;
        assert_eq!(
            EmployeeRecord::from_job_application(&application, Some(&approval), &[], 4, now()),
            Err(EmployeeRecordError::JobApplicationNotAccepted)
        );

        let mut application = accepted_application();
        application.hiring_start_at = Some(date(2021, 5, 8));
        assert!(matches!(
            EmployeeRecord::from_job_application(&application, Some(&approval), &[], 4, now()),
            Err(EmployeeRecordError::JobApplicationTooRecent { .. })
        ));

        let application = accepted_application();
        assert_eq!(
            EmployeeRecord::from_job_application(&application, None, &[], 4, now()),
            Err(EmployeeRecordError::MissingApproval)
        );

        let mut application = accepted_application();
        application.job_seeker.profile = None;
        assert_eq!(
            EmployeeRecord::from_job_application(&application, Some(&approval), &[], 4, now()),
            Err(EmployeeRecordError::MissingJobSeekerProfile)
        );

        let mut application = accepted_application();
        if let Some(profile) = application.job_seeker.profile.as_mut() {
            profile.education_level = None;
        }
        assert_eq!(
            EmployeeRecord::from_job_application(&application, Some(&approval), &[], 4, now()),
            Err(EmployeeRecordError::IncompleteJobSeekerProfile(
                ProfileError::MissingEducationLevel
            ))
        );
    }

    #[test]
    fn same_siret_and_approval_is_a_duplicate() {
        let application = accepted_application();
        let first = EmployeeRecord::from_job_application(&application, Some(&approval()), &[], 4, now())
            .expect("first record");
        assert_eq!(first.asp_measure, "EI_DC");
        assert!(matches!(
            EmployeeRecord::from_job_application(&application, Some(&approval()), &[first], 4, now()),
            Err(EmployeeRecordError::Duplicate { .. })
        ));
    }

    #[test]
    fn lifecycle_sent_then_processed() {
        let mut record = ready_record();
        assert_eq!(record.status, EmployeeRecordStatus::Ready);

        record
            .update_as_sent("RIAE_FS_20210410130000.json", 1, now())
            .expect("sent");
        assert_eq!(record.asp_batch_file.as_deref(), Some("RIAE_FS_20210410130000.json"));
        assert_eq!(record.asp_batch_line_number, Some(1));

        record
            .update_as_accepted("0000", "La ligne a été enregistrée", serde_json::json!({"numLigne": 1}), now())
            .expect("processed");
        assert_eq!(record.status, EmployeeRecordStatus::Processed);
        assert_eq!(record.asp_processing_code.as_deref(), Some("0000"));
        assert!(!record.is_updatable());
        assert_eq!(
            record.update_as_rejected("12", "JSON Invalide", now()),
            Err(EmployeeRecordError::NotUpdatable)
        );
    }

    #[test]
    fn rejected_record_can_be_made_ready_again() {
        let mut record = ready_record();
        record
            .update_as_sent("RIAE_FS_20210410130001.json", 3, now())
            .expect("sent");
        record
            .update_as_rejected("12", "JSON Invalide", now())
            .expect("rejected");
        assert_eq!(record.status, EmployeeRecordStatus::Rejected);
        assert_eq!(record.asp_processing_label.as_deref(), Some("JSON Invalide"));

        record.update_as_ready(now()).expect("ready again");
        assert_eq!(record.status, EmployeeRecordStatus::Ready);
    }

    #[test]
    fn invalid_transitions_are_refused() {
        let mut record = ready_record();
        assert!(matches!(
            record.update_as_rejected("12", "JSON Invalide", now()),
            Err(EmployeeRecordError::InvalidStatus { action: "rejected", .. })
        ));
        assert!(matches!(
            record.update_as_sent("xyz", 1, now()),
            Err(EmployeeRecordError::Batch(_))
        ));
        assert_eq!(record.status, EmployeeRecordStatus::Ready);
    }
}
