use std::cmp::Reverse;

use chrono::NaiveDate;
use serde::Serialize;

use super::domain::{Approval, ApprovalPeriod, PoleEmploiApproval};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    NoneFound,
    Valid,
    InWaitingPeriod,
}

/// Either issuing system's approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnyApproval {
    Itou(Approval),
    PoleEmploi(PoleEmploiApproval),
}

impl ApprovalPeriod for AnyApproval {
    fn number(&self) -> &str {
        match self {
            Self::Itou(approval) => &approval.number,
            Self::PoleEmploi(approval) => &approval.number,
        }
    }

    fn start_at(&self) -> NaiveDate {
        match self {
            Self::Itou(approval) => approval.start_at,
            Self::PoleEmploi(approval) => approval.start_at,
        }
    }

    fn end_at(&self) -> NaiveDate {
        match self {
            Self::Itou(approval) => approval.end_at,
            Self::PoleEmploi(approval) => approval.end_at,
        }
    }
}

impl AnyApproval {
    pub fn is_pass_iae(&self) -> bool {
        matches!(self, Self::Itou(_))
    }
}

/// Merged view of a job seeker's Itou and Pôle emploi approvals.
///
/// Pôle emploi is the historical issuing authority and both systems still coexist,
/// so every approval decision goes through this wrapper.
#[derive(Debug, Clone)]
pub struct ApprovalsWrapper {
    status: ApprovalStatus,
    latest: Option<AnyApproval>,
    merged: Vec<AnyApproval>,
}

impl ApprovalsWrapper {
    pub const ERROR_CANNOT_OBTAIN_NEW_FOR_PROXY: &'static str =
        "Le candidat a terminé un parcours il y a moins de deux ans. Pour prétendre à nouveau \
         à un parcours en structure d'insertion par l'activité économique il doit rencontrer \
         un prescripteur habilité : Pôle emploi, Mission Locale, CAP Emploi, etc.";

    /// `pole_emploi` must already be restricted to the job seeker's
    /// `pole_emploi_id` and birthdate.
    pub fn new(itou: Vec<Approval>, pole_emploi: Vec<PoleEmploiApproval>, today: NaiveDate) -> Self {
        let merged = merge(itou, pole_emploi, today);

        let (status, latest) = match merged.first() {
            None => (ApprovalStatus::NoneFound, None),
            Some(latest) if latest.is_valid(today) => (ApprovalStatus::Valid, Some(latest.clone())),
            // The waiting period is over: a new approval can be issued.
            Some(latest) if latest.waiting_period_has_elapsed(today) => {
                (ApprovalStatus::NoneFound, None)
            }
            Some(latest) => (ApprovalStatus::InWaitingPeriod, Some(latest.clone())),
        };

        Self {
            status,
            latest,
            merged,
        }
    }

    pub fn status(&self) -> ApprovalStatus {
        self.status
    }

    pub fn has_valid(&self) -> bool {
        self.status == ApprovalStatus::Valid
    }

    pub fn has_in_waiting_period(&self) -> bool {
        self.status == ApprovalStatus::InWaitingPeriod
    }

    pub fn latest_approval(&self) -> Option<&AnyApproval> {
        self.latest.as_ref()
    }

    pub fn merged_approvals(&self) -> &[AnyApproval] {
        &self.merged
    }

    /// A valid Pôle emploi approval implies a diagnosis made outside Itou.
    pub fn has_valid_pole_emploi_eligibility_diagnosis(&self, itou_prefix: &str) -> bool {
        self.has_valid()
            && self
                .latest
                .as_ref()
                .is_some_and(|approval| !approval.originates_from_itou(itou_prefix))
    }
}

fn merge(
    mut itou: Vec<Approval>,
    pole_emploi: Vec<PoleEmploiApproval>,
    today: NaiveDate,
) -> Vec<AnyApproval> {
    itou.sort_by_key(|approval| Reverse(approval.start_at));

    // An ongoing PASS IAE wins even over a more recent Pôle emploi approval.
    if itou.iter().any(|approval| approval.is_valid(today)) {
        return itou.into_iter().map(AnyApproval::Itou).collect();
    }

    // A Pôle emploi approval may already have been copied into a PASS IAE.
    let copied: Vec<String> = itou.iter().map(|approval| approval.number.clone()).collect();
    let mut merged: Vec<AnyApproval> = itou.into_iter().map(AnyApproval::Itou).collect();
    merged.extend(
        pole_emploi
            .into_iter()
            .filter(|approval| {
                let short: String = approval.number.chars().take(Approval::NUMBER_LENGTH).collect();
                !copied.contains(&short)
            })
            .map(AnyApproval::PoleEmploi),
    );

    // Longest and most recent first: farthest end, then earliest start.
    merged.sort_by_key(|approval| (Reverse(approval.end_at()), approval.start_at()));
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserId;
    use chrono::Utc;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn itou(number: &str, start: NaiveDate, end: NaiveDate) -> Approval {
        Approval {
            number: number.to_string(),
            job_seeker_id: UserId(1),
            start_at: start,
            end_at: end,
            created_at: Utc::now(),
            created_by: None,
        }
    }

    fn pe(number: &str, start: NaiveDate, end: NaiveDate) -> PoleEmploiApproval {
        PoleEmploiApproval {
            number: number.to_string(),
            pole_emploi_id: "1234567A".to_string(),
            first_name: "JEANNE".to_string(),
            last_name: "DUPONT".to_string(),
            birth_name: String::new(),
            birthdate: date(1990, 1, 1),
            start_at: start,
            end_at: end,
            pe_structure_code: String::new(),
        }
    }

    #[test]
    fn nothing_found() {
        let wrapper = ApprovalsWrapper::new(Vec::new(), Vec::new(), date(2021, 3, 1));
        assert_eq!(wrapper.status(), ApprovalStatus::NoneFound);
        assert!(wrapper.latest_approval().is_none());
    }

    #[test]
    fn valid_itou_approval_wins_over_more_recent_pole_emploi_approval() {
        let today = date(2021, 3, 1);
        let wrapper = ApprovalsWrapper::new(
            vec![itou("999992000001", date(2020, 1, 1), date(2021, 12, 31))],
            vec![pe("625742100001", date(2021, 2, 1), date(2023, 1, 31))],
            today,
        );
        assert!(wrapper.has_valid());
        let latest = wrapper.latest_approval().expect("latest approval");
        assert!(latest.is_pass_iae());
        assert_eq!(wrapper.merged_approvals().len(), 1);
        assert!(!wrapper.has_valid_pole_emploi_eligibility_diagnosis("99999"));
    }

    #[test]
    fn latest_is_the_farthest_ending_approval() {
        let today = date(2021, 3, 1);
        let wrapper = ApprovalsWrapper::new(
            vec![itou("999991800001", date(2018, 1, 1), date(2019, 12, 31))],
            vec![
                pe("625741900001", date(2019, 6, 1), date(2021, 5, 31)),
                pe("625741900002", date(2019, 7, 1), date(2021, 5, 31)),
            ],
            today,
        );
        assert!(wrapper.has_valid());
        assert_eq!(
            wrapper.latest_approval().map(|a| a.number().to_string()),
            Some("625741900001".to_string())
        );
        assert!(wrapper.has_valid_pole_emploi_eligibility_diagnosis("99999"));
    }

    #[test]
    fn expired_approval_puts_job_seeker_in_waiting_period() {
        let wrapper = ApprovalsWrapper::new(
            vec![itou("999991900001", date(2019, 1, 1), date(2020, 12, 31))],
            Vec::new(),
            date(2021, 3, 1),
        );
        assert!(wrapper.has_in_waiting_period());
    }

    #[test]
    fn elapsed_waiting_period_means_none_found() {
        let wrapper = ApprovalsWrapper::new(
            Vec::new(),
            vec![pe("625741600001", date(2016, 1, 1), date(2017, 12, 31))],
            date(2021, 3, 1),
        );
        assert_eq!(wrapper.status(), ApprovalStatus::NoneFound);
        assert!(wrapper.latest_approval().is_none());
    }

    #[test]
    fn copied_pole_emploi_approvals_are_not_duplicated() {
        let today = date(2023, 3, 1);
        let wrapper = ApprovalsWrapper::new(
            vec![itou("625741900001", date(2019, 6, 1), date(2021, 5, 31))],
            vec![pe("625741900001E01", date(2019, 6, 1), date(2021, 5, 31))],
            today,
        );
        assert_eq!(wrapper.merged_approvals().len(), 1);
        assert!(wrapper.has_in_waiting_period());
    }
}
