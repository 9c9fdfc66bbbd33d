//! Row builders and column layouts of the nightly reporting tables.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use sha2::{Digest, Sha256};

use super::columns::{CellValue, ColumnKind, ColumnSpec};
use super::populate::{populate_table, PopulateOptions, TableSummary};
use super::store::ReportingStore;
use super::ReportingError;
use crate::approvals::{AnyApproval, ApprovalPeriod};
use crate::eligibility::{CriteriaLevel, EligibilityDiagnosis};
use crate::job_applications::{JobApplication, JobApplicationState};
use crate::siaes::{Siae, SiaeKind};
use crate::store::StoreSnapshot;
use crate::users::{JobSeeker, UserId, UserKind};

/// Pôle emploi approvals older than this are not reported.
pub fn pole_emploi_approval_minimum_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub const ORG_WITHOUT_ORG_ID: i64 = -1;
pub const ORG_WITHOUT_ORG_NAME: &str = "Regroupement des prescripteurs sans organisation";

/// Salted SHA-256 of a sensitive identifier, namespaced by what it identifies.
pub fn anonymize(salt: &str, namespace: &str, value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(namespace.as_bytes());
    hasher.update(b":");
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone)]
pub struct ReportingSettings {
    pub itou_prefix: String,
    pub anonymization_salt: String,
}

/// Builds and swaps every reporting table from one store snapshot.
pub fn populate_metabase<S: ReportingStore + ?Sized>(
    store: &mut S,
    snapshot: &StoreSnapshot,
    settings: &ReportingSettings,
    options: &PopulateOptions,
    now: DateTime<Utc>,
) -> Result<Vec<TableSummary>, ReportingError> {
    let today = now.date_naive();
    let salt = settings.anonymization_salt.as_str();

    Ok(vec![
        populate_table(
            store,
            "structures",
            structure_columns(),
            &structure_rows(snapshot),
            options,
            now,
        )?,
        populate_table(
            store,
            "organisations",
            organisation_columns(),
            &organisation_rows(snapshot),
            options,
            now,
        )?,
        populate_table(
            store,
            "candidats",
            job_seeker_columns(salt, today),
            &job_seeker_rows(snapshot),
            options,
            now,
        )?,
        populate_table(
            store,
            "candidatures",
            job_application_columns(salt),
            &snapshot.job_applications,
            options,
            now,
        )?,
        populate_table(
            store,
            "pass_agréments",
            approval_columns(&settings.itou_prefix),
            &approval_rows(snapshot),
            options,
            now,
        )?,
    ])
}

#[derive(Debug, Clone, Default)]
struct ApplicationStats {
    total: usize,
    hirings: usize,
    last_created_at: Option<DateTime<Utc>>,
}

impl ApplicationStats {
    fn record(&mut self, application: &JobApplication) {
        self.total += 1;
        if application.state == JobApplicationState::Accepted {
            self.hirings += 1;
        }
        if self
            .last_created_at
            .map_or(true, |last| application.created_at > last)
        {
            self.last_created_at = Some(application.created_at);
        }
    }
}

#[derive(Debug, Clone)]
pub struct StructureRow {
    siae: Siae,
    stats: ApplicationStats,
}

/// One row per structure that received at least one application.
pub fn structure_rows(snapshot: &StoreSnapshot) -> Vec<StructureRow> {
    let mut rows: BTreeMap<u64, StructureRow> = BTreeMap::new();
    for application in &snapshot.job_applications {
        rows.entry(application.to_siae.id)
            .or_insert_with(|| StructureRow {
                siae: application.to_siae.clone(),
                stats: ApplicationStats::default(),
            })
            .stats
            .record(application);
    }
    rows.into_values().collect()
}

pub fn structure_columns() -> Vec<ColumnSpec<StructureRow>> {
    vec![
        ColumnSpec::new("id", ColumnKind::Integer, "ID de la structure", |row: &StructureRow| {
            CellValue::Integer(row.siae.id as i64)
        }),
        ColumnSpec::new("nom", ColumnKind::Varchar, "Nom de la structure", |row: &StructureRow| {
            CellValue::text(row.siae.name.clone())
        }),
        ColumnSpec::new(
            "nom_complet",
            ColumnKind::Varchar,
            "Nom complet de la structure avec type et ID",
            |row: &StructureRow| {
                CellValue::Text(format!(
                    "{} - ID {} - {}",
                    row.siae.kind.code(),
                    row.siae.id,
                    row.siae.display_name()
                ))
            },
        ),
        ColumnSpec::new("type", ColumnKind::Varchar, "Type de structure (EI, ETTI, ACI, GEIQ etc..)", |row: &StructureRow| {
            CellValue::text(row.siae.kind.code())
        }),
        ColumnSpec::new("siret", ColumnKind::Varchar, "SIRET de la structure", |row: &StructureRow| {
            CellValue::text(row.siae.siret.clone())
        }),
        ColumnSpec::new(
            "département",
            ColumnKind::Varchar,
            "Département de la structure",
            |row: &StructureRow| CellValue::text(row.siae.department.clone()),
        ),
        ColumnSpec::new(
            "total_membres",
            ColumnKind::Integer,
            "Nombre de comptes employeur rattachés à la structure",
            |row: &StructureRow| CellValue::count(row.siae.member_emails.len()),
        ),
        ColumnSpec::new(
            "total_candidatures",
            ColumnKind::Integer,
            "Nombre de candidatures reçues",
            |row: &StructureRow| CellValue::count(row.stats.total),
        ),
        ColumnSpec::new(
            "total_embauches",
            ColumnKind::Integer,
            "Nombre de candidatures acceptées",
            |row: &StructureRow| CellValue::count(row.stats.hirings),
        ),
        ColumnSpec::new(
            "date_dernière_candidature",
            ColumnKind::Timestamp,
            "Date de la dernière candidature reçue",
            |row: &StructureRow| CellValue::optional_timestamp(row.stats.last_created_at),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct OrganisationRow {
    id: i64,
    name: String,
    authorized: bool,
    stats: ApplicationStats,
}

/// Prescriber organisations seen as senders, preceded by the pseudo
/// organisation gathering prescribers without one.
pub fn organisation_rows(snapshot: &StoreSnapshot) -> Vec<OrganisationRow> {
    let mut without_org = OrganisationRow {
        id: ORG_WITHOUT_ORG_ID,
        name: ORG_WITHOUT_ORG_NAME.to_string(),
        authorized: false,
        stats: ApplicationStats::default(),
    };
    let mut organisations: BTreeMap<u64, OrganisationRow> = BTreeMap::new();

    for application in &snapshot.job_applications {
        if application.sender.kind != UserKind::Prescriber {
            continue;
        }
        match &application.sender.prescriber_organization {
            Some(organisation) => organisations
                .entry(organisation.id)
                .or_insert_with(|| OrganisationRow {
                    id: organisation.id as i64,
                    name: organisation.name.clone(),
                    authorized: organisation.is_authorized,
                    stats: ApplicationStats::default(),
                })
                .stats
                .record(application),
            None => without_org.stats.record(application),
        }
    }

    // The last application date makes no sense for the pseudo organisation.
    without_org.stats.last_created_at = None;
    std::iter::once(without_org)
        .chain(organisations.into_values())
        .collect()
}

pub fn organisation_columns() -> Vec<ColumnSpec<OrganisationRow>> {
    vec![
        ColumnSpec::new("id", ColumnKind::Integer, "ID organisation", |row: &OrganisationRow| {
            CellValue::Integer(row.id)
        }),
        ColumnSpec::new("nom", ColumnKind::Varchar, "Nom organisation", |row: &OrganisationRow| {
            CellValue::text(row.name.clone())
        }),
        ColumnSpec::new(
            "habilitée",
            ColumnKind::Boolean,
            "Organisation habilitée par le Préfet",
            |row: &OrganisationRow| CellValue::Boolean(row.authorized),
        ),
        ColumnSpec::new(
            "total_candidatures",
            ColumnKind::Integer,
            "Nombre de candidatures émises par cette organisation",
            |row: &OrganisationRow| CellValue::count(row.stats.total),
        ),
        ColumnSpec::new(
            "total_embauches",
            ColumnKind::Integer,
            "Nombre de candidatures en état accepté émises par cette organisation",
            |row: &OrganisationRow| CellValue::count(row.stats.hirings),
        ),
        ColumnSpec::new(
            "date_dernière_candidature",
            ColumnKind::Timestamp,
            "Date de la dernière création de candidature",
            |row: &OrganisationRow| CellValue::optional_timestamp(row.stats.last_created_at),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct JobSeekerRow {
    job_seeker: JobSeeker,
    stats: ApplicationStats,
    latest_diagnosis: Option<EligibilityDiagnosis>,
    last_hiring_siae_kind: Option<SiaeKind>,
    last_hiring_at: Option<DateTime<Utc>>,
}

/// One row per job seeker, using the most recent snapshot of their profile.
pub fn job_seeker_rows(snapshot: &StoreSnapshot) -> Vec<JobSeekerRow> {
    let mut rows: BTreeMap<UserId, JobSeekerRow> = BTreeMap::new();
    let mut profile_seen_at: BTreeMap<UserId, DateTime<Utc>> = BTreeMap::new();

    for application in &snapshot.job_applications {
        let seeker_id = application.job_seeker.id;
        let row = rows.entry(seeker_id).or_insert_with(|| JobSeekerRow {
            job_seeker: application.job_seeker.clone(),
            stats: ApplicationStats::default(),
            latest_diagnosis: None,
            last_hiring_siae_kind: None,
            last_hiring_at: None,
        });
        row.stats.record(application);

        let seen_at = profile_seen_at.entry(seeker_id).or_insert(application.updated_at);
        if application.updated_at > *seen_at {
            *seen_at = application.updated_at;
            row.job_seeker = application.job_seeker.clone();
        }

        if let Some(diagnosis) = &application.eligibility_diagnosis {
            let newer = row
                .latest_diagnosis
                .as_ref()
                .map_or(true, |latest| diagnosis.created_at > latest.created_at);
            if newer {
                row.latest_diagnosis = Some(diagnosis.clone());
            }
        }

        if application.state == JobApplicationState::Accepted
            && row
                .last_hiring_at
                .map_or(true, |last| application.created_at > last)
        {
            row.last_hiring_at = Some(application.created_at);
            row.last_hiring_siae_kind = Some(application.to_siae.kind);
        }
    }
    rows.into_values().collect()
}

fn criteria_count(row: &JobSeekerRow, level: CriteriaLevel) -> CellValue {
    match &row.latest_diagnosis {
        Some(diagnosis) => CellValue::count(
            diagnosis
                .administrative_criteria
                .iter()
                .filter(|criteria| criteria.level == level)
                .count(),
        ),
        None => CellValue::Null,
    }
}

fn diagnosis_author_kind(kind: UserKind) -> Option<&'static str> {
    match kind {
        UserKind::Prescriber => Some("Prescripteur"),
        UserKind::SiaeStaff => Some("Employeur"),
        UserKind::JobSeeker => None,
    }
}

pub fn job_seeker_columns(salt: &str, today: NaiveDate) -> Vec<ColumnSpec<JobSeekerRow>> {
    let salt = salt.to_string();
    vec![
        ColumnSpec::new(
            "id_anonymisé",
            ColumnKind::Varchar,
            "ID anonymisé du candidat",
            move |row: &JobSeekerRow| {
                CellValue::Text(anonymize(&salt, "job_seeker.id", &row.job_seeker.id.0.to_string()))
            },
        ),
        ColumnSpec::new(
            "age",
            ColumnKind::Integer,
            "Age du candidat en années",
            move |row: &JobSeekerRow| {
                row.job_seeker
                    .birthdate
                    .map_or(CellValue::Null, |birthdate| {
                        CellValue::Integer(i64::from(today.year() - birthdate.year()))
                    })
            },
        ),
        ColumnSpec::new(
            "département",
            ColumnKind::Varchar,
            "Département du candidat",
            |row: &JobSeekerRow| {
                CellValue::optional_text(
                    Some(row.job_seeker.department.clone()).filter(|value| !value.is_empty()),
                )
            },
        ),
        ColumnSpec::new(
            "total_candidatures",
            ColumnKind::Integer,
            "Nombre de candidatures",
            |row: &JobSeekerRow| CellValue::count(row.stats.total),
        ),
        ColumnSpec::new(
            "total_embauches",
            ColumnKind::Integer,
            "Nombre de candidatures de type accepté",
            |row: &JobSeekerRow| CellValue::count(row.stats.hirings),
        ),
        ColumnSpec::new(
            "a_un_diagnostic",
            ColumnKind::Boolean,
            "Le candidat a un diagnostic d'éligibilité",
            |row: &JobSeekerRow| CellValue::Boolean(row.latest_diagnosis.is_some()),
        ),
        ColumnSpec::new(
            "date_diagnostic",
            ColumnKind::Date,
            "Date du dernier diagnostic",
            |row: &JobSeekerRow| {
                CellValue::optional_date(
                    row.latest_diagnosis
                        .as_ref()
                        .map(|diagnosis| diagnosis.created_at.date_naive()),
                )
            },
        ),
        ColumnSpec::new(
            "type_auteur_diagnostic",
            ColumnKind::Varchar,
            "Type auteur du dernier diagnostic",
            |row: &JobSeekerRow| {
                CellValue::optional_text(
                    row.latest_diagnosis
                        .as_ref()
                        .and_then(|diagnosis| diagnosis_author_kind(diagnosis.author_kind)),
                )
            },
        ),
        ColumnSpec::new(
            "type_structure_dernière_embauche",
            ColumnKind::Varchar,
            "Type de la structure destinataire de la dernière embauche du candidat",
            |row: &JobSeekerRow| CellValue::optional_text(row.last_hiring_siae_kind.map(SiaeKind::code)),
        ),
        ColumnSpec::new(
            "total_critères_niveau_1",
            ColumnKind::Integer,
            "Total critères de niveau 1 du dernier diagnostic",
            |row: &JobSeekerRow| criteria_count(row, CriteriaLevel::Level1),
        ),
        ColumnSpec::new(
            "total_critères_niveau_2",
            ColumnKind::Integer,
            "Total critères de niveau 2 du dernier diagnostic",
            |row: &JobSeekerRow| criteria_count(row, CriteriaLevel::Level2),
        ),
    ]
}

pub fn job_application_columns(salt: &str) -> Vec<ColumnSpec<JobApplication>> {
    let application_salt = salt.to_string();
    let seeker_salt = salt.to_string();
    vec![
        ColumnSpec::new(
            "id_anonymisé",
            ColumnKind::Varchar,
            "ID anonymisé de la candidature",
            move |application: &JobApplication| {
                CellValue::Text(anonymize(
                    &application_salt,
                    "job_application.id",
                    &application.id.to_string(),
                ))
            },
        ),
        ColumnSpec::new(
            "candidat_id_anonymisé",
            ColumnKind::Varchar,
            "ID anonymisé du candidat",
            move |application: &JobApplication| {
                CellValue::Text(anonymize(
                    &seeker_salt,
                    "job_seeker.id",
                    &application.job_seeker.id.0.to_string(),
                ))
            },
        ),
        ColumnSpec::new(
            "date_candidature",
            ColumnKind::Date,
            "Date de la candidature",
            |application: &JobApplication| CellValue::Date(application.created_at.date_naive()),
        ),
        ColumnSpec::new(
            "état",
            ColumnKind::Varchar,
            "Etat de la candidature",
            |application: &JobApplication| CellValue::text(application.state.label()),
        ),
        ColumnSpec::new(
            "origine",
            ColumnKind::Varchar,
            "Origine de la candidature (candidat, prescripteur, employeur...)",
            |application: &JobApplication| CellValue::text(application.sender_kind_label()),
        ),
        ColumnSpec::new(
            "motif_de_refus",
            ColumnKind::Varchar,
            "Motif de refus de la candidature",
            |application: &JobApplication| {
                CellValue::optional_text(application.refusal_reason.map(|reason| reason.label()))
            },
        ),
        ColumnSpec::new(
            "id_structure",
            ColumnKind::Integer,
            "ID de la structure destinaire de la candidature",
            |application: &JobApplication| CellValue::Integer(application.to_siae.id as i64),
        ),
        ColumnSpec::new(
            "type_structure",
            ColumnKind::Varchar,
            "Type de la structure destinaire de la candidature",
            |application: &JobApplication| CellValue::text(application.to_siae.kind.code()),
        ),
        ColumnSpec::new(
            "nom_structure",
            ColumnKind::Varchar,
            "Nom de la structure destinaire de la candidature",
            |application: &JobApplication| CellValue::text(application.to_siae.display_name()),
        ),
        ColumnSpec::new(
            "département_structure",
            ColumnKind::Varchar,
            "Département de la structure destinaire de la candidature",
            |application: &JobApplication| CellValue::text(application.to_siae.department.clone()),
        ),
        ColumnSpec::new(
            "id_org_prescripteur",
            ColumnKind::Integer,
            "ID de l'organisation prescriptrice émettrice de la candidature",
            |application: &JobApplication| {
                application
                    .sender
                    .prescriber_organization
                    .as_ref()
                    .map_or(CellValue::Null, |organisation| {
                        CellValue::Integer(organisation.id as i64)
                    })
            },
        ),
        ColumnSpec::new(
            "date_embauche",
            ColumnKind::Date,
            "Date de début de contrat si la candidature est acceptée",
            |application: &JobApplication| CellValue::optional_date(application.hiring_start_at),
        ),
        ColumnSpec::new(
            "embauche_sans_pass",
            ColumnKind::Boolean,
            "Embauche sans demande de PASS IAE",
            |application: &JobApplication| CellValue::Boolean(application.hiring_without_approval),
        ),
    ]
}

#[derive(Debug, Clone)]
pub struct ApprovalRow {
    approval: AnyApproval,
    hiring_siae: Option<Siae>,
}

impl ApprovalRow {
    /// Human readable category of the approval.
    pub fn type_label(&self, itou_prefix: &str) -> String {
        match &self.approval {
            AnyApproval::Itou(approval) if approval.originates_from_itou(itou_prefix) => {
                format!("PASS IAE ({itou_prefix})")
            }
            AnyApproval::Itou(_) => format!("Agrément PE via ITOU (non {itou_prefix})"),
            AnyApproval::PoleEmploi(approval) => match approval.number.chars().nth(12) {
                Some('P') => "Prolongation PE".to_string(),
                Some('E') => "Extension PE".to_string(),
                Some('A') => "Interruption PE".to_string(),
                Some('S') => "Suspension PE".to_string(),
                _ => "Agrément PE".to_string(),
            },
        }
    }
}

/// Itou approvals linked to their latest hiring structure, then recent Pôle
/// emploi approvals.
pub fn approval_rows(snapshot: &StoreSnapshot) -> Vec<ApprovalRow> {
    let mut hiring_siae: BTreeMap<UserId, (DateTime<Utc>, &Siae)> = BTreeMap::new();
    for application in &snapshot.job_applications {
        if application.state != JobApplicationState::Accepted {
            continue;
        }
        let entry = hiring_siae
            .entry(application.job_seeker.id)
            .or_insert((application.created_at, &application.to_siae));
        if application.created_at > entry.0 {
            *entry = (application.created_at, &application.to_siae);
        }
    }

    let itou = snapshot.approvals.iter().map(|approval| ApprovalRow {
        approval: AnyApproval::Itou(approval.clone()),
        hiring_siae: hiring_siae
            .get(&approval.job_seeker_id)
            .map(|(_, siae)| (*siae).clone()),
    });
    let minimum_start = pole_emploi_approval_minimum_start_date();
    let pole_emploi = snapshot
        .pole_emploi_approvals
        .iter()
        .filter(|approval| approval.start_at >= minimum_start)
        .map(|approval| ApprovalRow {
            approval: AnyApproval::PoleEmploi(approval.clone()),
            hiring_siae: None,
        });
    itou.chain(pole_emploi).collect()
}

pub fn approval_columns(itou_prefix: &str) -> Vec<ColumnSpec<ApprovalRow>> {
    let itou_prefix = itou_prefix.to_string();
    vec![
        ColumnSpec::new(
            "type",
            ColumnKind::Varchar,
            "Type d'agrément (PASS IAE ou agrément Pôle emploi)",
            move |row: &ApprovalRow| CellValue::Text(row.type_label(&itou_prefix)),
        ),
        ColumnSpec::new("date_début", ColumnKind::Date, "Date de début", |row: &ApprovalRow| {
            CellValue::Date(row.approval.start_at())
        }),
        ColumnSpec::new("date_fin", ColumnKind::Date, "Date de fin", |row: &ApprovalRow| {
            CellValue::Date(row.approval.end_at())
        }),
        ColumnSpec::new("durée", ColumnKind::Interval, "Durée", |row: &ApprovalRow| {
            CellValue::Interval(row.approval.duration_days())
        }),
        ColumnSpec::new(
            "id_structure",
            ColumnKind::Integer,
            "ID structure qui a embauché si PASS IAE",
            |row: &ApprovalRow| {
                row.hiring_siae
                    .as_ref()
                    .map_or(CellValue::Null, |siae| CellValue::Integer(siae.id as i64))
            },
        ),
        ColumnSpec::new(
            "type_structure",
            ColumnKind::Varchar,
            "Type de la structure qui a embauché si PASS IAE",
            |row: &ApprovalRow| {
                CellValue::optional_text(row.hiring_siae.as_ref().map(|siae| siae.kind.code()))
            },
        ),
        ColumnSpec::new(
            "siret_structure",
            ColumnKind::Varchar,
            "SIRET de la structure qui a embauché si PASS IAE",
            |row: &ApprovalRow| {
                CellValue::optional_text(row.hiring_siae.as_ref().map(|siae| siae.siret.clone()))
            },
        ),
        ColumnSpec::new(
            "nom_structure",
            ColumnKind::Varchar,
            "Nom de la structure qui a embauché si PASS IAE",
            |row: &ApprovalRow| {
                CellValue::optional_text(
                    row.hiring_siae
                        .as_ref()
                        .map(|siae| siae.display_name().to_string()),
                )
            },
        ),
        ColumnSpec::new(
            "département_structure",
            ColumnKind::Varchar,
            "Département de la structure qui a embauché si PASS IAE",
            |row: &ApprovalRow| {
                CellValue::optional_text(
                    row.hiring_siae
                        .as_ref()
                        .map(|siae| siae.department.clone()),
                )
            },
        ),
    ]
}
