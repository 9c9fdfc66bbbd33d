use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{add_months, french_date, Approval, ApprovalError};
use crate::users::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspensionReason {
    Sickness,
    Maternity,
    Incarceration,
    TrialOutsideIae,
    Detoxification,
    ForceMajeure,
}

impl SuspensionReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Sickness => "Arrêt pour longue maladie",
            Self::Maternity => "Congé de maternité",
            Self::Incarceration => "Incarcération",
            Self::TrialOutsideIae => {
                "Période d'essai auprès d'un employeur ne relevant pas de l'insertion par l'activité économique"
            }
            Self::Detoxification => "Période de cure pour désintoxication",
            Self::ForceMajeure => "Raison de force majeure conduisant le salarié à quitter son emploi",
        }
    }
}

/// A PASS IAE suspended directly by an SIAE. Its duration pushes back the approval end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suspension {
    pub id: u64,
    pub approval_number: String,
    pub start_at: NaiveDate,
    pub end_at: NaiveDate,
    #[serde(default)]
    pub siae_id: Option<u64>,
    pub reason: SuspensionReason,
    #[serde(default)]
    pub reason_explanation: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub created_by: Option<UserId>,
}

impl Suspension {
    /// Any number of consecutive suspensions is allowed, each one at most 6 months long.
    pub const MAX_DURATION_MONTHS: u32 = 6;

    pub fn max_end_at(start_at: NaiveDate) -> NaiveDate {
        let end = add_months(start_at, Self::MAX_DURATION_MONTHS);
        end.pred_opt().unwrap_or(end)
    }

    pub fn duration_days(&self) -> i64 {
        (self.end_at - self.start_at).num_days()
    }

    pub fn is_in_progress(&self, today: NaiveDate) -> bool {
        self.start_at <= today && today <= self.end_at
    }

    pub fn overlaps(&self, start_at: NaiveDate, end_at: NaiveDate) -> bool {
        self.end_at >= start_at && self.start_at <= end_at
    }

    /// Check the suspension against its approval and the approval's other suspensions.
    pub fn validate(
        &self,
        approval: &Approval,
        others: &[Suspension],
        today: NaiveDate,
    ) -> Result<(), ApprovalError> {
        if self.reason == SuspensionReason::ForceMajeure && self.reason_explanation.trim().is_empty() {
            return Err(ApprovalError::ExplanationRequired);
        }
        // One-day suspensions are fine.
        if self.end_at < self.start_at {
            return Err(ApprovalError::EndBeforeStart);
        }
        if self.start_at > today {
            return Err(ApprovalError::SuspensionInFuture);
        }
        if !(approval.start_at <= self.start_at && self.start_at <= approval.end_at) {
            return Err(ApprovalError::SuspensionOutsideApproval {
                start: french_date(approval.start_at),
                end: french_date(approval.end_at),
            });
        }
        let max_end_at = Self::max_end_at(self.start_at);
        if self.end_at > max_end_at {
            return Err(ApprovalError::TooLong {
                months: Self::MAX_DURATION_MONTHS,
                max_end: french_date(max_end_at),
            });
        }
        if let Some(overlap) = others.iter().find(|other| {
            other.id != self.id
                && other.approval_number == self.approval_number
                && other.overlaps(self.start_at, self.end_at)
        }) {
            return Err(ApprovalError::Overlap {
                start: french_date(overlap.start_at),
                end: french_date(overlap.end_at),
            });
        }
        Ok(())
    }
}

/// Earliest day a new suspension may start: after the last finished one, else the hiring start.
pub fn next_min_start_at(
    suspensions: &[Suspension],
    hiring_start_at: NaiveDate,
    today: NaiveDate,
) -> NaiveDate {
    suspensions
        .iter()
        .filter(|suspension| suspension.end_at < today)
        .max_by_key(|suspension| suspension.start_at)
        .and_then(|suspension| suspension.end_at.succ_opt())
        .unwrap_or(hiring_start_at)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn approval() -> Approval {
        Approval {
            number: "999992100001".to_string(),
            job_seeker_id: UserId(1),
            start_at: date(2021, 1, 1),
            end_at: date(2022, 12, 31),
            created_at: Utc::now(),
            created_by: None,
        }
    }

    fn suspension(id: u64, start: NaiveDate, end: NaiveDate) -> Suspension {
        Suspension {
            id,
            approval_number: "999992100001".to_string(),
            start_at: start,
            end_at: end,
            siae_id: Some(1),
            reason: SuspensionReason::Sickness,
            reason_explanation: String::new(),
            created_at: Utc::now(),
            created_by: None,
        }
    }

    #[test]
    fn max_end_is_six_months_minus_one_day() {
        assert_eq!(Suspension::max_end_at(date(2021, 3, 1)), date(2021, 8, 31));
    }

    #[test]
    fn rejects_future_starts_and_starts_outside_the_approval() {
        let today = date(2021, 6, 1);
        let future = suspension(1, date(2021, 6, 2), date(2021, 7, 1));
        assert_eq!(
            future.validate(&approval(), &[], today),
            Err(ApprovalError::SuspensionInFuture)
        );

        let before = suspension(1, date(2020, 12, 31), date(2021, 1, 31));
        assert!(matches!(
            before.validate(&approval(), &[], today),
            Err(ApprovalError::SuspensionOutsideApproval { .. })
        ));
    }

    #[test]
    fn rejects_too_long_and_overlapping_suspensions() {
        let today = date(2021, 12, 1);
        let long = suspension(1, date(2021, 3, 1), date(2021, 9, 1));
        assert!(matches!(
            long.validate(&approval(), &[], today),
            Err(ApprovalError::TooLong { months: 6, .. })
        ));

        let existing = suspension(1, date(2021, 3, 1), date(2021, 4, 30));
        let overlapping = suspension(2, date(2021, 4, 30), date(2021, 5, 31));
        assert!(matches!(
            overlapping.validate(&approval(), &[existing.clone()], today),
            Err(ApprovalError::Overlap { .. })
        ));

        let consecutive = suspension(2, date(2021, 5, 1), date(2021, 5, 31));
        assert_eq!(consecutive.validate(&approval(), &[existing], today), Ok(()));
    }

    #[test]
    fn force_majeure_requires_an_explanation() {
        let mut s = suspension(1, date(2021, 3, 1), date(2021, 3, 1));
        s.reason = SuspensionReason::ForceMajeure;
        assert_eq!(
            s.validate(&approval(), &[], date(2021, 6, 1)),
            Err(ApprovalError::ExplanationRequired)
        );
        s.reason_explanation = "Déménagement contraint".to_string();
        assert_eq!(s.validate(&approval(), &[], date(2021, 6, 1)), Ok(()));
    }

    #[test]
    fn next_min_start_follows_the_last_finished_suspension() {
        let today = date(2021, 6, 1);
        let hiring = date(2021, 1, 1);
        assert_eq!(next_min_start_at(&[], hiring, today), hiring);
        let done = suspension(1, date(2021, 2, 1), date(2021, 2, 28));
        assert_eq!(next_min_start_at(&[done], hiring, today), date(2021, 3, 1));
    }
}
