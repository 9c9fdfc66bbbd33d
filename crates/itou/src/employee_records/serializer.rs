//! ASP JSON layout of an employee record line.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::domain::{EmployeeRecord, EmployeeRecordError};
use crate::users::UserKind;

/// Creation movement, the only one supported by the exchange.
pub const MOVEMENT_CREATION: &str = "C";

/// Length of the pseudonymous job seeker id.
const ID_ITOU_LENGTH: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecordLine {
    pub num_ligne: u32,
    pub type_mouvement: String,
    pub siret: String,
    pub mesure: String,
    pub pass_iae: String,
    pub numero_annexe: Option<String>,
    pub personne_physique: PersonnePhysique,
    pub adresse: Adresse,
    pub situation_salarie: SituationSalarie,
    pub code_traitement: Option<String>,
    pub libelle_traitement: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonnePhysique {
    pub pass_iae: String,
    pub id_itou: String,
    pub civilite: Option<String>,
    pub nom_usage: String,
    pub prenom: String,
    pub date_naissance: Option<String>,
    pub code_com_insee: Option<CodeComInsee>,
    pub code_insee_pays: Option<String>,
    pub code_groupe_pays: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeComInsee {
    pub code_com_insee: String,
    pub code_dpt: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Adresse {
    #[serde(rename = "adrTelephone")]
    pub telephone: Option<String>,
    #[serde(rename = "adrMail")]
    pub mail: Option<String>,
    #[serde(rename = "adrNumeroVoie")]
    pub numero_voie: Option<String>,
    #[serde(rename = "codeextensionvoie")]
    pub extension_voie: Option<String>,
    #[serde(rename = "codetypevoie")]
    pub type_voie: String,
    #[serde(rename = "adrLibelleVoie")]
    pub libelle_voie: String,
    #[serde(rename = "codeinseecom")]
    pub insee_commune: String,
    #[serde(rename = "codepostalcedex")]
    pub code_postal: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SituationSalarie {
    pub orienteur: String,
    #[serde(rename = "niveauFormation")]
    pub niveau_formation: String,
    #[serde(rename = "salarieEnEmploi")]
    pub en_emploi: bool,
    #[serde(rename = "salarieSansRessource")]
    pub sans_ressource: bool,
    #[serde(rename = "inscritPoleEmploi")]
    pub inscrit_pole_emploi: bool,
    #[serde(rename = "inscritPoleEmploiDepuis")]
    pub inscrit_pole_emploi_depuis: Option<String>,
    #[serde(rename = "numeroIDE")]
    pub numero_ide: Option<String>,
    #[serde(rename = "salarieRQTH")]
    pub rqth: bool,
    #[serde(rename = "salarieOETH")]
    pub oeth: bool,
    #[serde(rename = "salarieAideSociale")]
    pub aide_sociale: bool,
    #[serde(rename = "salarieBenefRSA")]
    pub benef_rsa: String,
    #[serde(rename = "salarieBenefASS")]
    pub benef_ass: bool,
    #[serde(rename = "salarieBenefAAH")]
    pub benef_aah: bool,
    #[serde(rename = "salarieBenefATA")]
    pub benef_ata: bool,
}

/// Salted, truncated SHA-256 of the job seeker id.
pub fn pseudonymous_id(salt: &str, job_seeker_id: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(job_seeker_id.to_string().as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(ID_ITOU_LENGTH);
    digest
}

/// ASP `ref_orienteur` code of the sender.
fn orienteur_code(kind: UserKind) -> &'static str {
    match kind {
        UserKind::Prescriber => "01",
        UserKind::SiaeStaff => "02",
        UserKind::JobSeeker => "03",
    }
}

/// ASP 3-digit department of an INSEE commune code: overseas communes
/// (`97x..`) keep three digits, the others are zero-padded.
fn department_code(insee_code: &str) -> String {
    let digits = if insee_code.starts_with("97") { 3 } else { 2 };
    let department: String = insee_code.chars().take(digits).collect();
    format!("{department:0>3}")
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl EmployeeRecordLine {
    pub fn from_record(
        record: &EmployeeRecord,
        line_number: u32,
        id_salt: &str,
    ) -> Result<Self, EmployeeRecordError> {
        let job_seeker = &record.job_seeker;
        let profile = record
            .profile()
            .ok_or(EmployeeRecordError::MissingJobSeekerProfile)?;

        let code_com_insee = profile
            .birth_place
            .as_deref()
            .and_then(non_empty)
            .map(|code| CodeComInsee {
                code_dpt: department_code(&code),
                code_com_insee: code,
            });

        let personne_physique = PersonnePhysique {
            pass_iae: record.approval_number.clone(),
            id_itou: pseudonymous_id(id_salt, job_seeker.id.0),
            civilite: job_seeker.title.map(|title| title.code().to_string()),
            nom_usage: job_seeker.last_name.to_uppercase(),
            prenom: job_seeker.first_name.to_uppercase(),
            date_naissance: job_seeker
                .birthdate
                .map(|date| date.format("%d/%m/%Y").to_string()),
            code_com_insee,
            code_insee_pays: profile.birth_country.as_ref().map(|c| c.code.clone()),
            code_groupe_pays: profile
                .birth_country
                .as_ref()
                .map(|c| c.group.code().to_string()),
        };

        let adresse = Adresse {
            telephone: non_empty(&job_seeker.phone),
            mail: non_empty(&job_seeker.email),
            numero_voie: non_empty(&profile.hexa_lane_number),
            extension_voie: profile.hexa_std_extension.map(|ext| ext.code().to_string()),
            type_voie: profile
                .hexa_lane_type
                .map(|lane| lane.code().to_string())
                .unwrap_or_default(),
            libelle_voie: profile.hexa_lane_name.clone(),
            insee_commune: profile.hexa_commune.clone().unwrap_or_default(),
            code_postal: profile.hexa_post_code.clone(),
        };

        let pole_emploi_id = non_empty(&job_seeker.pole_emploi_id);
        let situation_salarie = SituationSalarie {
            orienteur: orienteur_code(record.sender_kind).to_string(),
            niveau_formation: profile.education_level.clone().unwrap_or_default(),
            en_emploi: false,
            sans_ressource: profile.resourceless,
            inscrit_pole_emploi: pole_emploi_id.is_some(),
            inscrit_pole_emploi_depuis: profile.pole_emploi_since.asp_code().map(str::to_string),
            numero_ide: pole_emploi_id,
            rqth: profile.rqth_employee,
            oeth: profile.oeth_employee,
            aide_sociale: profile.has_social_allowance,
            benef_rsa: if profile.rsa_allocation { "OUI-NM" } else { "NON" }.to_string(),
            benef_ass: profile.ass_allocation,
            benef_aah: profile.aah_allocation,
            benef_ata: profile.ata_allocation,
        };

        Ok(Self {
            num_ligne: line_number,
            type_mouvement: MOVEMENT_CREATION.to_string(),
            siret: record.siret.clone(),
            mesure: record.asp_measure.clone(),
            pass_iae: record.approval_number.clone(),
            numero_annexe: record.financial_annex.clone(),
            personne_physique,
            adresse,
            situation_salarie,
            code_traitement: None,
            libelle_traitement: None,
        })
    }
}
