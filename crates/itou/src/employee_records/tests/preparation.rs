use crate::approvals::Approval;
use crate::employee_records::{
    prepare_employee_records, EmployeeRecordRepository, EmployeeRecordStatus,
};
use crate::job_applications::tests::common::{application_in, date, now, siae};
use crate::job_applications::{JobApplication, JobApplicationState};
use crate::store::{MemoryStore, StoreSnapshot};
use crate::users::UserId;

use super::common::later;

fn hired(siae_id: u64, start: chrono::NaiveDate, approval_number: Option<&str>) -> JobApplication {
    let mut application = application_in(JobApplicationState::Accepted);
    application.to_siae = siae(siae_id);
    application.hiring_start_at = Some(start);
    application.approval_number = approval_number.map(str::to_string);
    application
}

fn approval(number: &str) -> Approval {
    Approval {
        number: number.to_string(),
        job_seeker_id: UserId(7),
        start_at: date(2021, 4, 1),
        end_at: date(2023, 3, 31),
        created_at: now(),
        created_by: None,
    }
}

/// One hiring old enough, one still cancellable, one without approval and
/// one application that was never accepted.
fn store() -> MemoryStore {
    MemoryStore::from_snapshot(StoreSnapshot {
        job_applications: vec![
            hired(3, date(2021, 4, 1), Some("999992100001")),
            hired(4, later().date_naive() - chrono::Duration::days(1), Some("999992100002")),
            hired(5, date(2021, 4, 1), None),
            application_in(JobApplicationState::Processing),
        ],
        approvals: vec![approval("999992100001"), approval("999992100002")],
        ..StoreSnapshot::default()
    })
}

#[test]
fn creates_ready_records_for_settled_hirings_only() {
    let store = store();

    let report = prepare_employee_records(&store, 4, false, later()).expect("prepared");

    assert_eq!(report.created, 1);
    assert_eq!(report.ready, 1);
    assert_eq!(report.skipped, 2);
    let records = store.employee_records().expect("records");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, EmployeeRecordStatus::Ready);
    assert_eq!(records[0].approval_number, "999992100001");
    assert_ne!(records[0].id, 0);
}

#[test]
fn second_run_does_not_duplicate_records() {
    let store = store();
    prepare_employee_records(&store, 4, false, later()).expect("first run");

    let report = prepare_employee_records(&store, 4, false, later()).expect("second run");

    assert_eq!(report.created, 0);
    assert_eq!(store.employee_records().expect("records").len(), 1);
}

#[test]
fn dry_run_saves_nothing() {
    let store = store();

    let report = prepare_employee_records(&store, 4, true, later()).expect("prepared");

    assert_eq!(report.created, 1);
    assert!(store.employee_records().expect("records").is_empty());
}
