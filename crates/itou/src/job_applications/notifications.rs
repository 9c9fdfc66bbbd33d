use serde::{Deserialize, Serialize};

use super::domain::JobApplication;
use crate::approvals::{format_number_with_spaces, Approval};
use crate::users::Actor;

/// Outbound e-mail, rendered as plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Outbound e-mail hook (SMTP relay, transactional API, log sink in development).
pub trait Mailer: Send + Sync {
    fn send(&self, messages: Vec<EmailMessage>) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotificationError {
    #[error("mail transport unavailable: {0}")]
    Transport(String),
}

fn job_seeker_and_proxy(application: &JobApplication) -> Vec<String> {
    let mut to = vec![application.job_seeker.email.clone()];
    if application.is_sent_by_proxy() && !application.sender.email.is_empty() {
        to.push(application.sender.email.clone());
    }
    to
}

fn date_or_dash(date: Option<chrono::NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

pub fn new_for_siae(application: &JobApplication) -> EmailMessage {
    let jobs = if application.is_spontaneous() {
        "Candidature spontanée".to_string()
    } else {
        application.selected_jobs.join(", ")
    };
    EmailMessage {
        to: application.to_siae.member_emails.clone(),
        bcc: Vec::new(),
        subject: format!(
            "Nouvelle candidature de {}",
            application.job_seeker.full_name()
        ),
        body: format!(
            "{} a postulé chez {}.\nMétiers : {}\nEnvoyée par : {} ({})\n\n{}",
            application.job_seeker.full_name(),
            application.to_siae.display_name(),
            jobs,
            application.sender.full_name(),
            application.sender_kind_label(),
            application.message,
        ),
    }
}

pub fn accept(application: &JobApplication) -> EmailMessage {
    EmailMessage {
        to: job_seeker_and_proxy(application),
        bcc: Vec::new(),
        subject: "Candidature acceptée".to_string(),
        body: format!(
            "La candidature de {} chez {} a été acceptée.\nDébut du contrat : {}\nFin du contrat : {}\n\n{}",
            application.job_seeker.full_name(),
            application.to_siae.display_name(),
            date_or_dash(application.hiring_start_at),
            date_or_dash(application.hiring_end_at),
            application.answer,
        ),
    }
}

pub fn refuse(application: &JobApplication) -> EmailMessage {
    let reason = application
        .refusal_reason
        .map(|reason| reason.label())
        .unwrap_or_default();
    EmailMessage {
        to: job_seeker_and_proxy(application),
        bcc: Vec::new(),
        subject: "Candidature déclinée".to_string(),
        body: format!(
            "La candidature de {} chez {} a été déclinée.\nMotif : {}\n\n{}",
            application.job_seeker.full_name(),
            application.to_siae.display_name(),
            reason,
            application.answer,
        ),
    }
}

/// Sent to the employer who cancelled, the proxy sender gets a blind copy.
pub fn cancel(application: &JobApplication, actor: &Actor) -> EmailMessage {
    let bcc = if application.is_sent_by_proxy() && !application.sender.email.is_empty() {
        vec![application.sender.email.clone()]
    } else {
        Vec::new()
    };
    EmailMessage {
        to: vec![actor.email.clone()],
        bcc,
        subject: "Embauche annulée".to_string(),
        body: format!(
            "L'embauche de {} chez {} a été annulée.",
            application.job_seeker.full_name(),
            application.to_siae.display_name(),
        ),
    }
}

/// PASS IAE delivered automatically to the accepting employer.
pub fn approval_delivered(
    application: &JobApplication,
    approval: &Approval,
    actor: &Actor,
) -> EmailMessage {
    EmailMessage {
        to: vec![actor.email.clone()],
        bcc: Vec::new(),
        subject: format!(
            "PASS IAE pour {} et avis sur les emplois de l'inclusion",
            application.job_seeker.full_name()
        ),
        body: format!(
            "Numéro de PASS IAE : {}\nDate de début : {}\nDate de fin prévisionnelle : {}",
            format_number_with_spaces(&approval.number),
            approval.start_at.format("%d/%m/%Y"),
            approval.end_at.format("%d/%m/%Y"),
        ),
    }
}

/// Asks the support team to deliver a PASS IAE by hand.
pub fn manual_approval_request(
    application: &JobApplication,
    actor: &Actor,
    contact_email: &str,
) -> EmailMessage {
    let job_seeker = &application.job_seeker;
    EmailMessage {
        to: vec![contact_email.to_string()],
        bcc: Vec::new(),
        subject: "PASS IAE requis sur Itou".to_string(),
        body: format!(
            "Candidature : {}\nDemandeur : {} <{}>\nCandidat : {}\nDate de naissance : {}\nIdentifiant Pôle emploi : {}\nStructure : {} ({})\nDate de début : {}",
            application.id,
            actor.full_name,
            actor.email,
            job_seeker.full_name(),
            date_or_dash(job_seeker.birthdate),
            if job_seeker.pole_emploi_id.is_empty() { "-" } else { &job_seeker.pole_emploi_id },
            application.to_siae.display_name(),
            application.to_siae.siret,
            date_or_dash(application.hiring_start_at),
        ),
    }
}
