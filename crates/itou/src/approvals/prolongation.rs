use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{add_months, french_date, ApprovalError};
use crate::siaes::SiaeKind;
use crate::users::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProlongationReason {
    CompleteTraining,
    Rqth,
    Senior,
    ParticularDifficulties,
}

impl ProlongationReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CompleteTraining => "Achever une formation (6 mois maximum)",
            Self::Rqth => "RQTH (12 mois maximum)",
            Self::Senior => "50 ans et plus (12 mois maximum)",
            Self::ParticularDifficulties => {
                "Difficultés particulières qui font obstacle à l'insertion durable dans l'emploi"
            }
        }
    }

    pub const fn max_duration_months(self) -> u32 {
        match self {
            Self::CompleteTraining => 6,
            _ => 12,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProlongationStatus {
    #[default]
    NotSet,
    Validated,
    Refused,
}

impl ProlongationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotSet => "À traiter",
            Self::Validated => "Validée",
            Self::Refused => "Refusée",
        }
    }
}

/// Prolongation requested by an SIAE and validated by a Pôle emploi agent.
/// Only validated prolongations push back the approval end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prolongation {
    pub id: u64,
    pub approval_number: String,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    pub siae_id: u64,
    pub siae_kind: SiaeKind,
    pub reason: ProlongationReason,
    #[serde(default)]
    pub reason_explanation: String,
    #[serde(default)]
    pub status: ProlongationStatus,
    #[serde(default)]
    pub status_updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status_updated_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

impl Prolongation {
    pub fn max_end_at(start_at: NaiveDate, reason: ProlongationReason) -> NaiveDate {
        let end = add_months(start_at, reason.max_duration_months());
        end.pred_opt().unwrap_or(end)
    }

    pub fn duration_days(&self) -> i64 {
        (self.end_at - self.start_at).num_days()
    }

    /// Days this prolongation adds to its approval.
    pub fn effective_days(&self) -> i64 {
        if self.status == ProlongationStatus::Validated {
            self.duration_days()
        } else {
            0
        }
    }

    pub fn is_in_progress(&self, today: NaiveDate) -> bool {
        self.start_at <= today && today <= self.end_at
    }

    pub fn validate(&self, others: &[Prolongation]) -> Result<(), ApprovalError> {
        if self.end_at < self.start_at {
            return Err(ApprovalError::EndBeforeStart);
        }
        let max_end_at = Self::max_end_at(self.start_at, self.reason);
        if self.end_at > max_end_at {
            return Err(ApprovalError::TooLong {
                months: self.reason.max_duration_months(),
                max_end: french_date(max_end_at),
            });
        }
        if self.reason == ProlongationReason::ParticularDifficulties
            && !self.siae_kind.allows_particular_difficulties_prolongation()
        {
            return Err(ApprovalError::ReasonReservedToAiAci(self.reason.label()));
        }
        if let Some(overlap) = others.iter().find(|other| {
            other.id != self.id
                && other.approval_number == self.approval_number
                && other.end_at >= self.start_at
                && other.start_at <= self.end_at
        }) {
            return Err(ApprovalError::Overlap {
                start: french_date(overlap.start_at),
                end: french_date(overlap.end_at),
            });
        }
        Ok(())
    }
}
