use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use super::domain::EmployeeRecord;
use super::repository::EmployeeRecordRepository;
use crate::approvals::ApprovalRepository;
use crate::job_applications::{JobApplicationRepository, JobApplicationState};
use crate::repository::RepositoryError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreparationReport {
    pub created: usize,
    pub ready: usize,
    pub skipped: usize,
}

/// Creates the missing employee records of accepted hirings that can no longer
/// be cancelled, and marks them ready for the next upload.
///
/// Hirings that do not qualify yet are skipped and picked up by a later run.
pub fn prepare_employee_records<R>(
    repository: &R,
    cancellation_days: i64,
    dry_run: bool,
    now: DateTime<Utc>,
) -> Result<PreparationReport, RepositoryError>
where
    R: JobApplicationRepository + ApprovalRepository + EmployeeRecordRepository + ?Sized,
{
    let mut existing = repository.employee_records()?;
    let mut report = PreparationReport::default();

    let accepted = repository
        .all()?
        .into_iter()
        .filter(|application| application.state == JobApplicationState::Accepted);
    for application in accepted {
        if existing
            .iter()
            .any(|record| record.job_application_id == application.id)
        {
            continue;
        }
        let approval = match application.approval_number.as_deref() {
            Some(number) => repository.approval(number)?,
            None => None,
        };

        let mut record = match EmployeeRecord::from_job_application(
            &application,
            approval.as_ref(),
            &existing,
            cancellation_days,
            now,
        ) {
            Ok(record) => record,
            Err(error) => {
                debug!(job_application_id = %application.id, %error, "no employee record yet");
                report.skipped += 1;
                continue;
            }
        };
        match record.update_as_ready(now) {
            Ok(()) => report.ready += 1,
            Err(error) => debug!(job_application_id = %application.id, %error, "record left new"),
        }
        report.created += 1;

        if dry_run {
            existing.push(record);
        } else {
            existing.push(repository.save_employee_record(record)?);
        }
    }

    info!(
        created = report.created,
        ready = report.ready,
        skipped = report.skipped,
        dry_run,
        "employee records prepared"
    );
    Ok(report)
}
