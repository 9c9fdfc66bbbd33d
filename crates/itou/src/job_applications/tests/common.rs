use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::response::Response;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::config::WorkflowConfig;
use crate::job_applications::notifications::{EmailMessage, Mailer, NotificationError};
use crate::job_applications::{
    JobApplication, JobApplicationId, JobApplicationService, JobApplicationState,
    NewJobApplication,
};
use crate::siaes::{Siae, SiaeKind};
use crate::store::{MemoryStore, StoreSnapshot};
use crate::users::tests::complete_profile;
use crate::users::{Actor, JobSeeker, PrescriberOrganization, Sender, UserId, UserKind};

pub(crate) const ITOU_PREFIX: &str = "99999";

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 5, 10, 9, 0, 0)
        .single()
        .expect("valid time")
}

pub(crate) fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub(crate) fn job_seeker(id: u64) -> JobSeeker {
    JobSeeker {
        id: UserId(id),
        email: format!("candidat-{id}@example.com"),
        first_name: "Jeanne".to_string(),
        last_name: "Dupont".to_string(),
        title: None,
        birthdate: Some(date(1990, 2, 14)),
        phone: "0612345678".to_string(),
        nir: "290021234567890".to_string(),
        pole_emploi_id: String::new(),
        city: "Lille".to_string(),
        department: "59".to_string(),
        profile: Some(complete_profile()),
    }
}

pub(crate) fn siae(id: u64) -> Siae {
    Siae {
        id,
        siret: format!("123456789{id:05}"),
        kind: SiaeKind::Ei,
        name: format!("Recyclerie {id}"),
        brand: String::new(),
        department: "59".to_string(),
        member_emails: vec![format!("employeur-{id}@example.com")],
    }
}

pub(crate) fn prescriber(authorized: bool) -> Sender {
    Sender {
        user_id: UserId(500),
        kind: UserKind::Prescriber,
        email: "conseiller@pole-emploi.fr".to_string(),
        first_name: "Léa".to_string(),
        last_name: "Martin".to_string(),
        prescriber_organization: Some(PrescriberOrganization {
            id: 40,
            name: "Pôle emploi Lille".to_string(),
            is_authorized: authorized,
        }),
        siae_id: None,
    }
}

pub(crate) fn self_sender(job_seeker: &JobSeeker) -> Sender {
    Sender {
        user_id: job_seeker.id,
        kind: UserKind::JobSeeker,
        email: job_seeker.email.clone(),
        first_name: job_seeker.first_name.clone(),
        last_name: job_seeker.last_name.clone(),
        prescriber_organization: None,
        siae_id: None,
    }
}

pub(crate) fn employer() -> Actor {
    Actor {
        user_id: UserId(900),
        email: "employeur@example.com".to_string(),
        full_name: "Paul Durand".to_string(),
    }
}

pub(crate) fn submission() -> NewJobApplication {
    NewJobApplication {
        job_seeker: job_seeker(7),
        sender: prescriber(true),
        to_siae: siae(3),
        selected_jobs: vec!["Agent de tri".to_string()],
        message: "Candidate motivée".to_string(),
        eligibility_diagnosis: None,
    }
}

/// Stored application in any state, bypassing the workflow.
pub(crate) fn application_in(state: JobApplicationState) -> JobApplication {
    let submission = submission();
    JobApplication {
        id: JobApplicationId::new(),
        job_seeker: submission.job_seeker,
        sender: submission.sender,
        to_siae: submission.to_siae,
        state,
        selected_jobs: submission.selected_jobs,
        message: submission.message,
        answer: String::new(),
        refusal_reason: None,
        eligibility_diagnosis: None,
        hiring_start_at: None,
        hiring_end_at: None,
        hiring_without_approval: false,
        approval_number: None,
        approval_delivery_mode: None,
        approval_number_sent_by_email: false,
        approval_number_sent_at: None,
        created_at: now(),
        updated_at: now(),
    }
}

pub(crate) type TestService = JobApplicationService<MemoryStore, RecordingMailer>;

pub(crate) fn build_service() -> (TestService, Arc<MemoryStore>, Arc<RecordingMailer>) {
    build_service_with(StoreSnapshot::default())
}

pub(crate) fn build_service_with(
    snapshot: StoreSnapshot,
) -> (TestService, Arc<MemoryStore>, Arc<RecordingMailer>) {
    let store = Arc::new(MemoryStore::from_snapshot(snapshot));
    let mailer = Arc::new(RecordingMailer::default());
    let service = JobApplicationService::new(
        store.clone(),
        mailer.clone(),
        WorkflowConfig::default(),
        ITOU_PREFIX,
    );
    (service, store, mailer)
}

#[derive(Default)]
pub(crate) struct RecordingMailer {
    messages: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub(crate) fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().expect("mailer mutex poisoned").clone()
    }

    pub(crate) fn subjects(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|message| message.subject)
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.messages.lock().expect("mailer mutex poisoned").clear();
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, messages: Vec<EmailMessage>) -> Result<(), NotificationError> {
        self.messages
            .lock()
            .expect("mailer mutex poisoned")
            .extend(messages);
        Ok(())
    }
}

pub(crate) struct FailingMailer;

impl Mailer for FailingMailer {
    fn send(&self, _messages: Vec<EmailMessage>) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay down".to_string()))
    }
}

pub(crate) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("body bytes");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(crate) fn json_request(method: &str, uri: &str, body: &Value) -> axum::http::Request<Body> {
    axum::http::Request::builder()
        .method(method)
        .uri(uri)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serializable")))
        .expect("request")
}
