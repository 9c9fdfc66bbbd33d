use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::domain::JobApplication;
use crate::approvals::Approval;

pub const HEADERS: [&str; 21] = [
    "Nom candidat",
    "Prénom candidat",
    "Email candidat",
    "Téléphone candidat",
    "Date de naissance candidat",
    "Ville candidat",
    "Département candidat",
    "Nom structure employeur",
    "Type employeur",
    "Métiers",
    "Source de la candidature",
    "Nom prescripteur",
    "Date de la candidature",
    "Statut de la candidature",
    "Dates de début d’embauche",
    "Dates de fin d’embauche",
    "Motifs de refus",
    "Éligibilité IAE validée",
    "Numéro Pass IAE",
    "Début Pass IAE",
    "Fin Pass IAE",
];

const DATE_FORMAT: &str = "%d/%m/%Y";

/// One exported line, fields in `HEADERS` order.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    last_name: &'a str,
    first_name: &'a str,
    email: &'a str,
    phone: &'a str,
    birthdate: String,
    city: &'a str,
    department: &'a str,
    siae_name: &'a str,
    siae_kind: &'static str,
    jobs: String,
    sender_kind: &'static str,
    sender_name: String,
    created_at: String,
    state: &'static str,
    hiring_start_at: String,
    hiring_end_at: String,
    refusal_reason: &'static str,
    eligibility: &'static str,
    approval_number: String,
    approval_start_at: String,
    approval_end_at: String,
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

fn row<'a>(
    application: &'a JobApplication,
    approval: Option<&Approval>,
    now: DateTime<Utc>,
) -> ExportRow<'a> {
    let job_seeker = &application.job_seeker;
    let eligible = application
        .eligibility_diagnosis
        .as_ref()
        .is_some_and(|diagnosis| diagnosis.is_considered_valid_for(application.to_siae.id, now));

    ExportRow {
        last_name: &job_seeker.last_name,
        first_name: &job_seeker.first_name,
        email: &job_seeker.email,
        phone: &job_seeker.phone,
        birthdate: format_date(job_seeker.birthdate),
        city: &job_seeker.city,
        department: &job_seeker.department,
        siae_name: application.to_siae.display_name(),
        siae_kind: application.to_siae.kind.code(),
        jobs: if application.is_spontaneous() {
            "Candidature spontanée".to_string()
        } else {
            application.selected_jobs.join(" ")
        },
        sender_kind: application.sender_kind_label(),
        sender_name: application.sender.full_name(),
        created_at: application.created_at.format(DATE_FORMAT).to_string(),
        state: application.state.label(),
        hiring_start_at: format_date(application.hiring_start_at),
        hiring_end_at: format_date(application.hiring_end_at),
        refusal_reason: application
            .refusal_reason
            .map(|reason| reason.label())
            .unwrap_or_default(),
        eligibility: if eligible { "oui" } else { "non" },
        approval_number: approval.map(|a| a.number.clone()).unwrap_or_default(),
        approval_start_at: format_date(approval.map(|a| a.start_at)),
        approval_end_at: format_date(approval.map(|a| a.end_at)),
    }
}

/// Writes the employer export, every field quoted. Returns the number of rows written.
///
/// `approvals` is searched for the approval attached to each application.
pub fn write_job_applications<W: Write>(
    writer: W,
    applications: &[JobApplication],
    approvals: &[Approval],
    now: DateTime<Utc>,
) -> Result<usize, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Always)
        .from_writer(writer);
    writer.write_record(HEADERS)?;

    for application in applications {
        let approval = application
            .approval_number
            .as_deref()
            .and_then(|number| approvals.iter().find(|approval| approval.number == number));
        writer.serialize(row(application, approval, now))?;
    }
    writer.flush()?;
    Ok(applications.len())
}
