use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::eligibility::EligibilityDiagnosis;
use crate::siaes::Siae;
use crate::users::{JobSeeker, Sender, UserId, UserKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobApplicationId(pub Uuid);

impl JobApplicationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobApplicationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobApplicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobApplicationId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobApplicationState {
    #[default]
    New,
    Processing,
    Postponed,
    Accepted,
    Refused,
    Obsolete,
    Cancelled,
}

impl JobApplicationState {
    pub const fn name(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Processing => "processing",
            Self::Postponed => "postponed",
            Self::Accepted => "accepted",
            Self::Refused => "refused",
            Self::Obsolete => "obsolete",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::New => "Nouvelle candidature",
            Self::Processing => "Candidature à l'étude",
            Self::Postponed => "Embauche pour plus tard",
            Self::Accepted => "Embauche acceptée",
            Self::Refused => "Embauche déclinée",
            Self::Obsolete => "Embauché ailleurs",
            Self::Cancelled => "Embauche annulée",
        }
    }

    /// Still awaiting a decision from the employer.
    pub const fn is_pending(self) -> bool {
        matches!(self, Self::New | Self::Processing | Self::Postponed)
    }
}

impl fmt::Display for JobApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefusalReason {
    DidNotCome,
    Unavailable,
    NonEligible,
    EligibilityDoubt,
    Incompatible,
    PreventObjectives,
    NoPosition,
    Other,
}

impl RefusalReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DidNotCome => "Candidat non venu ou non joignable",
            Self::Unavailable => "Candidat indisponible ou non intéressé par le poste",
            Self::NonEligible => "Candidat non éligible",
            Self::EligibilityDoubt => {
                "Doute sur l'éligibilité du candidat (penser à renvoyer la personne vers un prescripteur)"
            }
            Self::Incompatible => {
                "Un des freins à l'emploi du candidat est incompatible avec le poste proposé"
            }
            Self::PreventObjectives => {
                "L'embauche du candidat empêche la réalisation des objectifs du dialogue de gestion"
            }
            Self::NoPosition => "Pas de poste ouvert en ce moment",
            Self::Other => "Autre",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalDeliveryMode {
    Automatic,
    Manual,
}

/// A candidacy from a job seeker to an SIAE, possibly sent by a proxy.
///
/// The job seeker, sender and SIAE are snapshots taken when the application is submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobApplication {
    pub id: JobApplicationId,
    pub job_seeker: JobSeeker,
    pub sender: Sender,
    pub to_siae: Siae,
    pub state: JobApplicationState,
    #[serde(default)]
    pub selected_jobs: Vec<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub refusal_reason: Option<RefusalReason>,
    #[serde(default)]
    pub eligibility_diagnosis: Option<EligibilityDiagnosis>,
    #[serde(default)]
    pub hiring_start_at: Option<NaiveDate>,
    #[serde(default)]
    pub hiring_end_at: Option<NaiveDate>,
    #[serde(default)]
    pub hiring_without_approval: bool,
    #[serde(default)]
    pub approval_number: Option<String>,
    #[serde(default)]
    pub approval_delivery_mode: Option<ApprovalDeliveryMode>,
    #[serde(default)]
    pub approval_number_sent_by_email: bool,
    #[serde(default)]
    pub approval_number_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobApplication {
    pub fn is_sent_by_proxy(&self) -> bool {
        self.sender.user_id != self.job_seeker.id
    }

    pub fn is_spontaneous(&self) -> bool {
        self.selected_jobs.is_empty()
    }

    /// An SIAE subject to eligibility rules must run a diagnosis while processing.
    pub fn eligibility_diagnosis_by_siae_required(&self, now: DateTime<Utc>) -> bool {
        self.state == JobApplicationState::Processing
            && self.to_siae.is_subject_to_eligibility_rules()
            && !self
                .eligibility_diagnosis
                .as_ref()
                .is_some_and(|d| d.is_considered_valid_for(self.to_siae.id, now))
    }

    /// "Source de la candidature" as shown to employers.
    pub fn sender_kind_label(&self) -> &'static str {
        match self.sender.kind {
            UserKind::JobSeeker => "Candidat",
            UserKind::Prescriber if self.sender.is_authorized_prescriber() => {
                "Prescripteur habilité"
            }
            UserKind::Prescriber => "Orienteur",
            UserKind::SiaeStaff => "Employeur",
        }
    }

    pub fn view(&self) -> JobApplicationView {
        JobApplicationView {
            id: self.id,
            state: self.state,
            state_label: self.state.label(),
            job_seeker_id: self.job_seeker.id,
            to_siae_id: self.to_siae.id,
            hiring_start_at: self.hiring_start_at,
            hiring_end_at: self.hiring_end_at,
            refusal_reason: self.refusal_reason,
            approval_number: self.approval_number.clone(),
            approval_delivery_mode: self.approval_delivery_mode,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Sanitized representation returned by the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct JobApplicationView {
    pub id: JobApplicationId,
    pub state: JobApplicationState,
    pub state_label: &'static str,
    pub job_seeker_id: UserId,
    pub to_siae_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hiring_start_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hiring_end_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal_reason: Option<RefusalReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_delivery_mode: Option<ApprovalDeliveryMode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Append-only audit record of a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApplicationTransitionLog {
    pub job_application_id: JobApplicationId,
    pub transition: String,
    pub from_state: JobApplicationState,
    pub to_state: JobApplicationState,
    #[serde(default)]
    pub user: Option<UserId>,
    pub timestamp: DateTime<Utc>,
}

/// Payload used to submit a new application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJobApplication {
    pub job_seeker: JobSeeker,
    pub sender: Sender,
    pub to_siae: Siae,
    #[serde(default)]
    pub selected_jobs: Vec<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub eligibility_diagnosis: Option<EligibilityDiagnosis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessRequest {
    /// Diagnosis made by the SIAE while studying the application.
    #[serde(default)]
    pub eligibility_diagnosis: Option<EligibilityDiagnosis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostponeRequest {
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptRequest {
    pub hiring_start_at: NaiveDate,
    #[serde(default)]
    pub hiring_end_at: Option<NaiveDate>,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub hiring_without_approval: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefuseRequest {
    pub refusal_reason: RefusalReason,
    #[serde(default)]
    pub answer: String,
}
