use std::sync::Arc;

use serde_json::json;

use super::common::*;
use crate::employee_records::{
    EmployeeRecordRepository, EmployeeRecordStatus, RemoteDir, TransferError, TransferJob,
    TransferOptions, TransferReport,
};

fn upload_only() -> TransferOptions {
    TransferOptions {
        upload: true,
        ..TransferOptions::default()
    }
}

fn download_only() -> TransferOptions {
    TransferOptions {
        download: true,
        ..TransferOptions::default()
    }
}

#[test]
fn upload_splits_ready_records_into_batches_and_marks_them_sent() {
    let store = store_with_ready_records(3);
    let transport = Arc::new(MemoryTransport::default());

    let report = job(&store, &transport, 2)
        .run(upload_only(), later())
        .expect("uploaded");

    assert_eq!(report.uploaded_batches, 2);
    assert_eq!(report.sent, 3);

    let files = transport.names(RemoteDir::Upload);
    assert_eq!(files, vec![
        "RIAE_FS_20210609090000.json".to_string(),
        "RIAE_FS_20210609090001.json".to_string(),
    ]);
    let first = transport.content(RemoteDir::Upload, &files[0]);
    let lines = first["lignesTelechargement"].as_array().expect("lines");
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["numLigne"], 1);
    assert_eq!(lines[1]["numLigne"], 2);
    assert_eq!(lines[0]["typeMouvement"], "C");
    assert_eq!(lines[0]["mesure"], "EI_DC");

    let sent = store
        .employee_records_with_status(EmployeeRecordStatus::Sent)
        .expect("sent");
    assert_eq!(sent.len(), 3);
    let second_file = store
        .find_by_batch(&files[1], 1)
        .expect("lookup")
        .expect("record of the second batch");
    assert_eq!(second_file.status, EmployeeRecordStatus::Sent);
}

#[test]
fn dry_run_upload_leaves_records_and_server_untouched() {
    let store = store_with_ready_records(2);
    let transport = Arc::new(MemoryTransport::default());
    let options = TransferOptions {
        dry_run: true,
        ..upload_only()
    };

    let report = job(&store, &transport, 700).run(options, later()).expect("dry run");

    assert_eq!(report, TransferReport::default());
    assert!(transport.names(RemoteDir::Upload).is_empty());
    assert_eq!(
        store
            .employee_records_with_status(EmployeeRecordStatus::Ready)
            .expect("ready")
            .len(),
        2
    );
}

#[test]
fn failed_upload_keeps_records_ready() {
    let store = store_with_ready_records(2);
    let job = TransferJob::new(store.clone(), Arc::new(UnreachableTransport), 700, SALT);

    let report = job.run(upload_only(), later()).expect("failures are reported");

    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.sent, 0);
    assert!(matches!(
        report.ensure_complete(),
        Err(TransferError::Incomplete { failed_batches: 1, failed_feedback_files: 0 })
    ));
    assert_eq!(
        store
            .employee_records_with_status(EmployeeRecordStatus::Ready)
            .expect("ready")
            .len(),
        2
    );
}

#[test]
fn feedback_accepts_and_rejects_lines_then_removes_the_file() {
    let store = store_with_ready_records(2);
    let transport = Arc::new(MemoryTransport::default());
    let job = job(&store, &transport, 700);
    job.run(upload_only(), later()).expect("uploaded");

    let batch_file = "RIAE_FS_20210609090000.json";
    let feedback_file = "RIAE_FS_20210609090000_FichierRetour.json";
    transport.drop_file(
        RemoteDir::Download,
        feedback_file,
        &json!({
            "msgInformatif": null,
            "telId": null,
            "lignesTelechargement": [
                {"numLigne": 1, "codeTraitement": "0000", "libelleTraitement": "La ligne a été enregistrée"},
                {"numLigne": 2, "codeTraitement": "3436", "libelleTraitement": "Un PASS IAE doit être unique pour un même SIRET"},
                {"numLigne": 3, "codeTraitement": "0000", "libelleTraitement": "OK"},
                {"codeTraitement": "0000", "libelleTraitement": "OK"}
            ]
        }),
    );

    let report = job.run(download_only(), later()).expect("downloaded");

    assert_eq!(report.feedback_files, 1);
    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 1);
    assert_eq!(report.skipped, 2);
    assert!(transport.names(RemoteDir::Download).is_empty());

    let processed = store.find_by_batch(batch_file, 1).expect("lookup").expect("record");
    assert_eq!(processed.status, EmployeeRecordStatus::Processed);
    assert_eq!(processed.asp_processing_code.as_deref(), Some("0000"));
    assert_eq!(
        processed.archived_json.as_ref().map(|archive| archive["numLigne"].clone()),
        Some(json!(1))
    );

    let rejected = store.find_by_batch(batch_file, 2).expect("lookup").expect("record");
    assert_eq!(rejected.status, EmployeeRecordStatus::Rejected);
    assert_eq!(rejected.asp_processing_code.as_deref(), Some("3436"));
}

#[test]
fn replayed_feedback_is_skipped() {
    let store = store_with_ready_records(1);
    let transport = Arc::new(MemoryTransport::default());
    let job = job(&store, &transport, 700);
    job.run(upload_only(), later()).expect("uploaded");

    let feedback = json!({
        "lignesTelechargement": [
            {"numLigne": 1, "codeTraitement": "0000", "libelleTraitement": "OK"}
        ]
    });
    let feedback_file = "RIAE_FS_20210609090000_FichierRetour.json";
    transport.drop_file(RemoteDir::Download, feedback_file, &feedback);
    job.run(download_only(), later()).expect("first pass");

    transport.drop_file(RemoteDir::Download, feedback_file, &feedback);
    let report = job.run(download_only(), later()).expect("second pass");

    assert_eq!(report.accepted, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(
        store
            .employee_records_with_status(EmployeeRecordStatus::Processed)
            .expect("processed")
            .len(),
        1
    );
}

#[test]
fn dry_run_download_keeps_feedback_files_and_statuses() {
    let store = store_with_ready_records(1);
    let transport = Arc::new(MemoryTransport::default());
    let job = job(&store, &transport, 700);
    job.run(upload_only(), later()).expect("uploaded");
    transport.drop_file(
        RemoteDir::Download,
        "RIAE_FS_20210609090000_FichierRetour.json",
        &json!({"lignesTelechargement": [{"numLigne": 1, "codeTraitement": "0000"}]}),
    );

    let report = job
        .run(
            TransferOptions {
                dry_run: true,
                ..download_only()
            },
            later(),
        )
        .expect("dry run");

    assert_eq!(report.accepted, 1);
    assert_eq!(transport.names(RemoteDir::Download).len(), 1);
    assert_eq!(
        store
            .employee_records_with_status(EmployeeRecordStatus::Sent)
            .expect("sent")
            .len(),
        1
    );
}

#[test]
fn unexpected_files_in_the_download_folder_are_ignored() {
    let store = store_with_ready_records(0);
    let transport = Arc::new(MemoryTransport::default());
    transport.drop_file(RemoteDir::Download, "notes.json", &json!({}));

    let report = job(&store, &transport, 700)
        .run(download_only(), later())
        .expect("nothing to do");

    assert_eq!(report.feedback_files, 0);
    assert_eq!(transport.names(RemoteDir::Download), vec!["notes.json".to_string()]);
}

#[test]
fn both_directions_run_when_none_is_selected() {
    let store = store_with_ready_records(1);
    let transport = Arc::new(MemoryTransport::default());

    let report = job(&store, &transport, 700)
        .run(TransferOptions::default(), later())
        .expect("ran");

    assert_eq!(report.uploaded_batches, 1);
    assert_eq!(report.feedback_files, 0);
}

#[test]
fn a_failed_batch_does_not_stop_the_next_ones() {
    let store = store_with_ready_records(5);
    let transport = Arc::new(FlakyTransport::failing_put(2));
    let job = TransferJob::new(store.clone(), transport.clone(), 2, SALT);

    let report = job.run(upload_only(), later()).expect("ran");

    assert_eq!(report.uploaded_batches, 2);
    assert_eq!(report.failed_batches, 1);
    assert_eq!(report.sent, 3);
    assert_eq!(
        transport.inner.names(RemoteDir::Upload),
        vec![
            "RIAE_FS_20210609090000.json".to_string(),
            "RIAE_FS_20210609090002.json".to_string(),
        ]
    );
    let still_ready = store
        .employee_records_with_status(EmployeeRecordStatus::Ready)
        .expect("ready");
    assert_eq!(still_ready.len(), 2);
    assert!(still_ready.iter().all(|record| record.asp_batch_file.is_none()));

    let retry = job
        .run(upload_only(), later() + chrono::Duration::minutes(10))
        .expect("retried");
    assert_eq!(retry.sent, 2);
    assert_eq!(retry.failed_batches, 0);
}

#[test]
fn unreadable_feedback_file_stays_for_the_next_run() {
    let store = store_with_ready_records(2);
    let transport = Arc::new(FlakyTransport::failing_get(2));
    let job = TransferJob::new(store.clone(), transport.clone(), 1, SALT);
    job.run(upload_only(), later()).expect("uploaded");

    for batch in ["RIAE_FS_20210609090000", "RIAE_FS_20210609090001"] {
        transport.inner.drop_file(
            RemoteDir::Download,
            &format!("{batch}_FichierRetour.json"),
            &json!({"lignesTelechargement": [{"numLigne": 1, "codeTraitement": "0000"}]}),
        );
    }

    let report = job.run(download_only(), later()).expect("ran");

    assert_eq!(report.feedback_files, 1);
    assert_eq!(report.failed_feedback_files, 1);
    assert_eq!(report.accepted, 1);
    assert_eq!(
        transport.inner.names(RemoteDir::Download),
        vec!["RIAE_FS_20210609090001_FichierRetour.json".to_string()]
    );

    let retry = job.run(download_only(), later()).expect("retried");
    assert_eq!(retry.accepted, 1);
    assert!(retry.ensure_complete().is_ok());
    assert!(transport.inner.names(RemoteDir::Download).is_empty());
    assert_eq!(
        store
            .employee_records_with_status(EmployeeRecordStatus::Processed)
            .expect("processed")
            .len(),
        2
    );
}
