use chrono::{DateTime, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::RepositoryError;
use crate::users::UserId;

/// Default duration of an approval.
pub const DEFAULT_APPROVAL_YEARS: u32 = 2;
/// "Période de carence": after expiry, only an authorized prescriber can get a new approval.
pub const WAITING_PERIOD_YEARS: u32 = 2;
pub const LOCKDOWN_EXTENSION_DELAY_MONTHS: u32 = 3;

pub fn lockdown_start_at() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 3, 17).unwrap_or(NaiveDate::MIN)
}

pub fn lockdown_end_at() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 6, 16).unwrap_or(NaiveDate::MIN)
}

/// Calendar month arithmetic clamping to the end of month (Feb 29 + 1 year = Feb 28).
pub fn add_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

pub fn sub_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_sub_months(Months::new(months))
        .unwrap_or(NaiveDate::MIN)
}

/// Date rules shared by Itou approvals and Pôle emploi approvals.
pub trait ApprovalPeriod {
    fn number(&self) -> &str;
    fn start_at(&self) -> NaiveDate;
    fn end_at(&self) -> NaiveDate;

    /// In progress, or starting in the future.
    fn is_valid(&self, today: NaiveDate) -> bool {
        (self.start_at() <= today && today <= self.end_at()) || self.start_at() >= today
    }

    fn is_in_progress(&self, today: NaiveDate) -> bool {
        self.start_at() <= today && today <= self.end_at()
    }

    fn waiting_period_end(&self) -> NaiveDate {
        add_months(self.end_at(), WAITING_PERIOD_YEARS * 12)
    }

    fn is_in_waiting_period(&self, today: NaiveDate) -> bool {
        self.end_at() < today && today <= self.waiting_period_end()
    }

    fn waiting_period_has_elapsed(&self, today: NaiveDate) -> bool {
        today > self.waiting_period_end()
    }

    fn originates_from_itou(&self, prefix: &str) -> bool {
        self.number().starts_with(prefix)
    }

    fn duration_days(&self) -> i64 {
        (self.end_at() - self.start_at()).num_days()
    }

    fn overlaps_covid_lockdown(&self) -> bool {
        let ends_before_lockdown = self.end_at() < lockdown_start_at();
        let starts_after_lockdown = self.start_at() > lockdown_end_at();
        !(ends_before_lockdown || starts_after_lockdown)
    }
}

/// A PASS IAE issued by Itou, or re-issued from a Pôle emploi approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    /// 12 alphanumeric characters, unique.
    pub number: String,
    pub job_seeker_id: UserId,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

impl ApprovalPeriod for Approval {
    fn number(&self) -> &str {
        &self.number
    }

    fn start_at(&self) -> NaiveDate {
        self.start_at
    }

    fn end_at(&self) -> NaiveDate {
        self.end_at
    }
}

impl Approval {
    pub const NUMBER_LENGTH: usize = 12;

    pub fn default_end_date(start_at: NaiveDate) -> NaiveDate {
        let end = add_months(start_at, DEFAULT_APPROVAL_YEARS * 12);
        end.pred_opt().unwrap_or(end)
    }

    pub fn number_with_spaces(&self) -> String {
        format_number_with_spaces(&self.number)
    }

    /// Checks a new approval before it is stored.
    pub fn validate(&self) -> Result<(), ApprovalError> {
        if self.number.len() != Self::NUMBER_LENGTH
            || !self.number.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ApprovalError::InvalidNumber(self.number.clone()));
        }
        if self.end_at <= self.start_at {
            return Err(ApprovalError::EndBeforeStart);
        }
        Ok(())
    }

    /// Pôle emploi approvals overlapping the 2020 lockdown were extended by 3 months.
    /// Itou-issued numbers were already extended upstream.
    pub fn apply_lockdown_extension(&mut self, itou_prefix: &str) {
        if !self.originates_from_itou(itou_prefix) && self.overlaps_covid_lockdown() {
            self.end_at = add_months(self.end_at, LOCKDOWN_EXTENSION_DELAY_MONTHS);
        }
    }

    /// Moves `end_at` when a suspension or a validated prolongation of `previous` days
    /// is replaced by one of `current` days.
    pub fn shift_end_at(&mut self, previous_days: i64, current_days: i64) {
        let delta = chrono::Duration::days(current_days - previous_days);
        self.end_at = self.end_at.checked_add_signed(delta).unwrap_or(self.end_at);
    }
}

/// Approval delivered by Pôle emploi, imported on a regular basis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoleEmploiApproval {
    /// 12 characters, or 15 when suffixed with an amendment code (`E01`, `P02`…).
    pub number: String,
    pub pole_emploi_id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub birth_name: String,
    pub birthdate: NaiveDate,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    #[serde(default)]
    pub pe_structure_code: String,
}

impl ApprovalPeriod for PoleEmploiApproval {
    fn number(&self) -> &str {
        &self.number
    }

    fn start_at(&self) -> NaiveDate {
        self.start_at
    }

    fn end_at(&self) -> NaiveDate {
        self.end_at
    }
}

impl PoleEmploiApproval {
    pub fn number_with_spaces(&self) -> String {
        format_number_with_spaces(&self.number)
    }

    /// Upper-case ASCII, the way names appear in the Pôle emploi export.
    pub fn format_name_as_pole_emploi(name: &str) -> String {
        name.trim()
            .chars()
            .map(|c| match c {
                'à' | 'â' | 'ä' | 'À' | 'Â' | 'Ä' => 'A',
                'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'E',
                'î' | 'ï' | 'Î' | 'Ï' => 'I',
                'ô' | 'ö' | 'Ô' | 'Ö' => 'O',
                'ù' | 'û' | 'ü' | 'Ù' | 'Û' | 'Ü' => 'U',
                'ç' | 'Ç' => 'C',
                other => other.to_ascii_uppercase(),
            })
            .collect()
    }

    /// Copy into an Itou approval. Only the first 12 characters of the number are kept.
    pub fn to_approval(&self, job_seeker_id: UserId, now: DateTime<Utc>) -> Approval {
        Approval {
            number: self.number.chars().take(Approval::NUMBER_LENGTH).collect(),
            job_seeker_id,
            start_at: self.start_at,
            end_at: self.end_at,
            created_at: now,
            created_by: None,
        }
    }
}

/// `XXXXX YY NNNNN`, or `XXXXX YY NNNNN SSS` for suffixed Pôle emploi numbers.
pub fn format_number_with_spaces(number: &str) -> String {
    let chars: Vec<char> = number.chars().collect();
    let part = |from: usize, to: usize| -> String {
        chars[from.min(chars.len())..to.min(chars.len())].iter().collect()
    };
    if chars.len() == 15 {
        format!("{} {} {} {}", part(0, 5), part(5, 7), part(7, 12), part(12, 15))
    } else {
        format!("{} {} {}", part(0, 5), part(5, 7), part(7, chars.len()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApprovalError {
    #[error("le numéro d'agrément '{0}' doit comporter 12 caractères alphanumériques")]
    InvalidNumber(String),
    #[error("la date de fin doit être postérieure à la date de début")]
    EndBeforeStart,
    #[error("un agrément dans le futur ou en cours de validité existe déjà pour ce candidat")]
    ValidApprovalExists,
    #[error("aucun agrément valide à réutiliser")]
    NoValidApproval,
    #[error("en cas de force majeure, veuillez préciser le motif")]
    ExplanationRequired,
    #[error("la suspension ne peut pas commencer dans le futur")]
    SuspensionInFuture,
    #[error("la suspension ne peut pas commencer en dehors des limites du PASS IAE {start} - {end}")]
    SuspensionOutsideApproval { start: String, end: String },
    #[error("la durée totale ne peut excéder {months} mois, date de fin maximum: {max_end}")]
    TooLong { months: u32, max_end: String },
    #[error("la période chevauche une période déjà existante pour ce PASS IAE {start} - {end}")]
    Overlap { start: String, end: String },
    #[error("le motif \"{0}\" est réservé aux AI et ACI")]
    ReasonReservedToAiAci(&'static str),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub(crate) fn french_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}
