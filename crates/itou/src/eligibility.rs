use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::users::{UserId, UserKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CriteriaLevel {
    #[serde(rename = "1")]
    Level1,
    #[serde(rename = "2")]
    Level2,
}

impl CriteriaLevel {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Level1 => "Niveau 1",
            Self::Level2 => "Niveau 2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdministrativeCriteria {
    pub id: u32,
    pub level: CriteriaLevel,
    pub name: String,
    #[serde(default = "AdministrativeCriteria::max_ui_rank")]
    pub ui_rank: u16,
}

impl AdministrativeCriteria {
    pub const MAX_UI_RANK: u16 = 32767;

    fn max_ui_rank() -> u16 {
        Self::MAX_UI_RANK
    }
}

/// Eligibility evidence for a job seeker, authored by a prescriber or SIAE staff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityDiagnosis {
    pub job_seeker_id: UserId,
    pub author_id: UserId,
    pub author_kind: UserKind,
    #[serde(default)]
    pub author_siae_id: Option<u64>,
    #[serde(default)]
    pub author_prescriber_organization_id: Option<u64>,
    #[serde(default)]
    pub administrative_criteria: Vec<AdministrativeCriteria>,
    pub created_at: DateTime<Utc>,
}

impl EligibilityDiagnosis {
    pub const EXPIRATION_DELAY_MONTHS: u32 = 6;

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.created_at
            .checked_add_months(Months::new(Self::EXPIRATION_DELAY_MONTHS))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at()
    }

    /// Prescriber diagnoses count everywhere; SIAE diagnoses only for their own structure.
    pub fn is_considered_valid_for(&self, siae_id: u64, now: DateTime<Utc>) -> bool {
        if self.has_expired(now) {
            return false;
        }
        match self.author_kind {
            UserKind::Prescriber => true,
            UserKind::SiaeStaff => self.author_siae_id == Some(siae_id),
            UserKind::JobSeeker => false,
        }
    }

    /// Criteria sorted the way they are displayed: by level then rank.
    pub fn sorted_criteria(&self) -> Vec<&AdministrativeCriteria> {
        let mut criteria: Vec<_> = self.administrative_criteria.iter().collect();
        criteria.sort_by_key(|c| (c.level, c.ui_rank));
        criteria
    }
}

/// Most recent diagnosis that is still considered valid for the given structure.
pub fn last_considered_valid(
    diagnoses: &[EligibilityDiagnosis],
    job_seeker_id: UserId,
    siae_id: u64,
    now: DateTime<Utc>,
) -> Option<&EligibilityDiagnosis> {
    diagnoses
        .iter()
        .filter(|d| d.job_seeker_id == job_seeker_id && d.is_considered_valid_for(siae_id, now))
        .max_by_key(|d| d.created_at)
}
