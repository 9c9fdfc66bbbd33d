use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use itou::approvals::ApprovalRepository;
use itou::config::WorkflowConfig;
use itou::job_applications::csv_export::write_job_applications;
use itou::job_applications::domain::{AcceptRequest, NewJobApplication, ProcessRequest};
use itou::job_applications::{
    EmailMessage, JobApplicationRepository, JobApplicationService, JobApplicationState, Mailer,
    NotificationError,
};
use itou::metabase::{populate_metabase, PopulateOptions, ReportingSettings, SqlScriptStore};
use itou::siaes::{Siae, SiaeKind};
use itou::store::MemoryStore;
use itou::users::{Actor, JobSeeker, PrescriberOrganization, Sender, UserId, UserKind};

const PREFIX: &str = "99999";

#[derive(Default)]
struct Outbox(Mutex<Vec<EmailMessage>>);

impl Mailer for Outbox {
    fn send(&self, messages: Vec<EmailMessage>) -> Result<(), NotificationError> {
        self.0
            .lock()
            .expect("outbox lock")
            .extend(messages);
        Ok(())
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2021, 5, 10, 9, 0, 0)
        .single()
        .expect("valid time")
}

fn submission(siae_id: u64) -> NewJobApplication {
    NewJobApplication {
        job_seeker: JobSeeker {
            id: UserId(7),
            email: "candidat@example.com".to_string(),
            first_name: "Jeanne".to_string(),
            last_name: "Dupont".to_string(),
            title: None,
            birthdate: NaiveDate::from_ymd_opt(1990, 2, 14),
            phone: String::new(),
            nir: "290021234567890".to_string(),
            pole_emploi_id: String::new(),
            city: "Lille".to_string(),
            department: "59".to_string(),
            profile: None,
        },
        sender: Sender {
            user_id: UserId(500),
            kind: UserKind::Prescriber,
            email: "conseiller@pole-emploi.fr".to_string(),
            first_name: "Léa".to_string(),
            last_name: "Martin".to_string(),
            prescriber_organization: Some(PrescriberOrganization {
                id: 40,
                name: "Pôle emploi Lille".to_string(),
                is_authorized: true,
            }),
            siae_id: None,
        },
        to_siae: Siae {
            id: siae_id,
            siret: format!("123456789{siae_id:05}"),
            kind: SiaeKind::Ei,
            name: format!("Recyclerie {siae_id}"),
            brand: String::new(),
            department: "59".to_string(),
            member_emails: vec!["employeur@example.com".to_string()],
        },
        selected_jobs: vec!["Agent de tri".to_string()],
        message: String::new(),
        eligibility_diagnosis: None,
    }
}

fn employer() -> Actor {
    Actor {
        user_id: UserId(900),
        email: "employeur@example.com".to_string(),
        full_name: "Paul Durand".to_string(),
    }
}

#[test]
fn hiring_survives_a_restart_and_feeds_the_exports() {
    let dir = tempfile::tempdir().expect("temp dir");
    let data_path = dir.path().join("itou.json");

    let application_id = {
        let store = Arc::new(MemoryStore::open(&data_path).expect("empty store"));
        let outbox = Arc::new(Outbox::default());
        let service = JobApplicationService::new(
            store.clone(),
            outbox.clone(),
            WorkflowConfig::default(),
            PREFIX,
        );

        let application = service.submit(submission(3), now()).expect("submitted");
        let sibling = service.submit(submission(4), now()).expect("submitted");
        service
            .process(application.id, &employer(), ProcessRequest::default(), now())
            .expect("processed");
        let accepted = service
            .accept(
                application.id,
                &employer(),
                AcceptRequest {
                    hiring_start_at: now().date_naive() + Duration::days(7),
                    hiring_end_at: None,
                    answer: String::new(),
                    hiring_without_approval: false,
                },
                now(),
            )
            .expect("accepted");
        assert_eq!(accepted.approval_number.as_deref(), Some("999992100001"));
        assert_eq!(
            service.get(sibling.id).expect("sibling").state,
            JobApplicationState::Obsolete
        );
        assert!(!outbox.0.lock().expect("outbox lock").is_empty());

        store.persist().expect("persisted");
        application.id
    };

    let store = MemoryStore::open(&data_path).expect("reopened");
    let reloaded = store
        .fetch(application_id)
        .expect("fetch")
        .expect("still there");
    assert_eq!(reloaded.state, JobApplicationState::Accepted);
    let approvals = store.all_approvals().expect("approvals");
    assert_eq!(approvals.len(), 1);
    assert_eq!(approvals[0].job_seeker_id, UserId(7));

    let mut csv = Vec::new();
    let rows = write_job_applications(
        &mut csv,
        &store.for_siae(3).expect("applications"),
        &approvals,
        now(),
    )
    .expect("exported");
    assert_eq!(rows, 1);
    assert!(String::from_utf8(csv).expect("utf8").contains("999992100001"));

    let snapshot = store.snapshot().expect("snapshot");
    let mut script = SqlScriptStore::new(Vec::new());
    let summaries = populate_metabase(
        &mut script,
        &snapshot,
        &ReportingSettings {
            itou_prefix: PREFIX.to_string(),
            anonymization_salt: "integration".to_string(),
        },
        &PopulateOptions::default(),
        now(),
    )
    .expect("scripted");
    let script = String::from_utf8(script.finish().expect("finished")).expect("utf8");

    assert_eq!(summaries.len(), 5);
    assert!(script.contains("ALTER TABLE \"pass_agréments_new\" RENAME TO \"pass_agréments\";"));
    assert!(script.contains("'PASS IAE (99999)'"));
    assert!(!script.contains("candidat@example.com"));
    assert!(!script.contains("Dupont"));
}
