use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::asp::{AllocationDuration, CountryGroup, LaneExtension, LaneType};

/// Identifier of a platform user (job seeker, prescriber or SIAE staff member).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserKind {
    JobSeeker,
    Prescriber,
    SiaeStaff,
}

impl UserKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::JobSeeker => "Demandeur d'emploi",
            Self::Prescriber => "Prescripteur",
            Self::SiaeStaff => "Employeur (SIAE)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Title {
    #[serde(rename = "M")]
    M,
    #[serde(rename = "MME")]
    Mme,
}

impl Title {
    pub const fn code(self) -> &'static str {
        match self {
            Self::M => "M",
            Self::Mme => "MME",
        }
    }
}

/// The person a job application is made for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSeeker {
    pub id: UserId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub title: Option<Title>,
    #[serde(default)]
    pub birthdate: Option<NaiveDate>,
    #[serde(default)]
    pub phone: String,
    /// Social security number.
    #[serde(default)]
    pub nir: String,
    #[serde(default)]
    pub pole_emploi_id: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub profile: Option<JobSeekerProfile>,
}

impl JobSeeker {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim().to_uppercase())
    }

    /// A PASS IAE can only be delivered automatically to someone identified nationally.
    pub fn has_usable_national_id(&self) -> bool {
        !self.pole_emploi_id.trim().is_empty() || !self.nir.trim().is_empty()
    }
}

/// Birth place and address details required by ASP, in the "hexa" address format.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct JobSeekerProfile {
    pub education_level: Option<String>,
    pub birth_place: Option<String>,
    pub birth_country: Option<BirthCountry>,
    pub hexa_lane_number: String,
    pub hexa_std_extension: Option<LaneExtension>,
    pub hexa_lane_type: Option<LaneType>,
    pub hexa_lane_name: String,
    pub hexa_post_code: String,
    pub hexa_commune: Option<String>,
    pub pole_emploi_since: AllocationDuration,
    pub resourceless: bool,
    pub rqth_employee: bool,
    pub oeth_employee: bool,
    pub has_social_allowance: bool,
    pub rsa_allocation: bool,
    pub ass_allocation: bool,
    pub aah_allocation: bool,
    pub ata_allocation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BirthCountry {
    pub code: String,
    pub group: CountryGroup,
}

/// First missing piece of a job seeker profile.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProfileError {
    #[error("le niveau de formation est obligatoire")]
    MissingEducationLevel,
    #[error("le pays de naissance est obligatoire")]
    MissingBirthCountry,
    #[error("la commune de naissance est obligatoire pour une personne née en France")]
    MissingBirthPlace,
    #[error("l'adresse au format ASP est incomplète ({0})")]
    IncompleteAddress(&'static str),
}

impl JobSeekerProfile {
    /// Check the profile carries every field ASP requires.
    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.education_level.as_deref().map_or(true, str::is_empty) {
            return Err(ProfileError::MissingEducationLevel);
        }
        let country = self
            .birth_country
            .as_ref()
            .ok_or(ProfileError::MissingBirthCountry)?;
        if country.group == CountryGroup::France
            && self.birth_place.as_deref().map_or(true, str::is_empty)
        {
            return Err(ProfileError::MissingBirthPlace);
        }
        if self.hexa_lane_type.is_none() {
            return Err(ProfileError::IncompleteAddress("type de voie"));
        }
        if self.hexa_lane_name.trim().is_empty() {
            return Err(ProfileError::IncompleteAddress("libellé de voie"));
        }
        if self.hexa_post_code.trim().is_empty() {
            return Err(ProfileError::IncompleteAddress("code postal"));
        }
        if self.hexa_commune.as_deref().map_or(true, str::is_empty) {
            return Err(ProfileError::IncompleteAddress("commune"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriberOrganization {
    pub id: u64,
    pub name: String,
    /// Authorized prescribers may bypass the approval waiting period.
    pub is_authorized: bool,
}

/// Who sent a job application: the job seeker, a prescriber or an SIAE staff member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
    pub user_id: UserId,
    pub kind: UserKind,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub prescriber_organization: Option<PrescriberOrganization>,
    #[serde(default)]
    pub siae_id: Option<u64>,
}

impl Sender {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim().to_uppercase())
    }

    pub fn is_authorized_prescriber(&self) -> bool {
        self.kind == UserKind::Prescriber
            && self
                .prescriber_organization
                .as_ref()
                .is_some_and(|organization| organization.is_authorized)
    }
}

/// The authenticated user performing an action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub email: String,
    #[serde(default)]
    pub full_name: String,
}
