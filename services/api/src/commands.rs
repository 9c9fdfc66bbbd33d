use std::fs::File;
use std::io::{self, BufReader, Write};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use itou::approvals::ApprovalRepository;
use itou::asp::ReferenceImporter;
use itou::config::{AppConfig, AspConfig};
use itou::employee_records::{
    self, FileTransport, LocalDirectoryTransport, TransferJob, TransferOptions, TransferReport,
};
use itou::error::AppError;
use itou::job_applications::csv_export::write_job_applications;
use itou::job_applications::JobApplicationRepository;
use itou::metabase::{self, PopulateOptions, ReportingSettings, SqlScriptStore};
use itou::store::{MemoryStore, StoreError};
use itou::telemetry;
use serde::Serialize;
use tracing::info;

use crate::cli::{
    ExportJobApplicationsArgs, ImportAspRefsArgs, PopulateFluxiaeArgs, PopulateMetabaseArgs,
    PrepareArgs, TransferArgs,
};
use crate::infra::open_output;

fn setup() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;
    Ok(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value).map_err(io::Error::from)?;
    writeln!(stdout)?;
    Ok(())
}

pub(crate) fn prepare_employee_records(args: PrepareArgs) -> Result<(), AppError> {
    let config = setup()?;
    let store = MemoryStore::open(&config.data_path)?;
    let outcome = employee_records::prepare_employee_records(
        &store,
        config.workflow.cancellation_days,
        args.dry_run,
        Utc::now(),
    )
    .map_err(|error| AppError::from(StoreError::from(error)));
    let report = persist_then(&store, args.dry_run, outcome)?;
    print_json(&report)
}

pub(crate) fn transfer_employee_records(args: TransferArgs) -> Result<(), AppError> {
    let config = setup()?;
    let store = Arc::new(MemoryStore::open(&config.data_path)?);
    let transport = Arc::new(LocalDirectoryTransport::new(
        config.asp.upload_dir.clone(),
        config.asp.download_dir.clone(),
    ));
    let options = TransferOptions {
        upload: args.upload,
        download: args.download,
        dry_run: args.dry_run,
    };
    let report = run_transfer(store, transport, &config.asp, options, Utc::now())?;
    print_json(&report)?;
    report.ensure_complete()?;
    Ok(())
}

fn run_transfer<T: FileTransport + 'static>(
    store: Arc<MemoryStore>,
    transport: Arc<T>,
    asp: &AspConfig,
    options: TransferOptions,
    now: DateTime<Utc>,
) -> Result<TransferReport, AppError> {
    let job = TransferJob::new(
        store.clone(),
        transport,
        asp.max_records_per_batch,
        asp.id_salt.clone(),
    );
    let outcome = job.run(options, now).map_err(AppError::from);
    persist_then(&store, options.dry_run, outcome)
}

/// Changes made before a failure are written too, then the outcome is returned.
fn persist_then<T>(
    store: &MemoryStore,
    dry_run: bool,
    outcome: Result<T, AppError>,
) -> Result<T, AppError> {
    if !dry_run {
        store.persist()?;
    }
    outcome
}

pub(crate) fn populate_metabase(args: PopulateMetabaseArgs) -> Result<(), AppError> {
    let config = setup()?;
    let snapshot = MemoryStore::open(&config.data_path)?
        .snapshot()
        .map_err(StoreError::from)?;
    let settings = ReportingSettings {
        itou_prefix: config.asp.itou_prefix.clone(),
        anonymization_salt: config.metabase.anonymization_salt.clone(),
    };
    let options = PopulateOptions::from_config(&config.metabase, args.dry_run);

    let mut script = SqlScriptStore::new(open_output(args.output.as_deref())?);
    let summaries =
        metabase::populate_metabase(&mut script, &snapshot, &settings, &options, Utc::now())?;
    script.finish()?;

    for summary in &summaries {
        info!(table = %summary.table, rows = summary.rows, columns = summary.columns, "table scripted");
    }
    Ok(())
}

pub(crate) fn import_asp_refs(args: ImportAspRefsArgs) -> Result<(), AppError> {
    setup()?;
    let summary = ReferenceImporter::new(args.input, args.output, args.dry_run).run()?;
    print_json(&summary)
}

pub(crate) fn export_job_applications(args: ExportJobApplicationsArgs) -> Result<(), AppError> {
    let config = setup()?;
    let store = MemoryStore::open(&config.data_path)?;
    let applications = store.for_siae(args.siae).map_err(StoreError::from)?;
    let approvals = store.all_approvals().map_err(StoreError::from)?;

    let mut output = open_output(args.output.as_deref())?;
    let rows = write_job_applications(&mut output, &applications, &approvals, Utc::now())?;
    output.flush()?;

    info!(siae_id = args.siae, rows, "job applications exported");
    Ok(())
}

pub(crate) fn populate_fluxiae(args: PopulateFluxiaeArgs) -> Result<(), AppError> {
    let config = setup()?;
    let input = BufReader::new(File::open(&args.input)?);
    let options = PopulateOptions::from_config(&config.metabase, args.dry_run);

    let mut script = SqlScriptStore::new(open_output(args.output.as_deref())?);
    let summary = metabase::populate_fluxiae(&mut script, &args.table, input, &options, Utc::now())?;
    script.finish()?;

    info!(table = %summary.table, rows = summary.rows, "fluxIAE export scripted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use itou::approvals::PoleEmploiApproval;
    use itou::employee_records::{RemoteDir, TransferError};

    use super::*;

    /// Accepts uploads, but the download drop cannot be listed.
    struct UnlistableDrop;

    impl FileTransport for UnlistableDrop {
        fn put(&self, _dir: RemoteDir, _name: &str, _content: &[u8]) -> Result<(), TransferError> {
            Ok(())
        }

        fn list(&self, _dir: RemoteDir) -> Result<Vec<String>, TransferError> {
            Err(TransferError::Transport("connection reset".to_string()))
        }

        fn get(&self, _dir: RemoteDir, name: &str) -> Result<Vec<u8>, TransferError> {
            Err(TransferError::Transport(format!("no file '{name}'")))
        }

        fn remove(&self, _dir: RemoteDir, _name: &str) -> Result<(), TransferError> {
            Ok(())
        }
    }

    fn asp() -> AspConfig {
        AspConfig {
            itou_prefix: AspConfig::DEFAULT_PREFIX.to_string(),
            upload_dir: "unused".into(),
            download_dir: "unused".into(),
            max_records_per_batch: 700,
            id_salt: "salt".to_string(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn store_with_pending_change(path: &std::path::Path) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::open(path).expect("empty store"));
        store
            .insert_pole_emploi_approval(PoleEmploiApproval {
                number: "592291910000".to_string(),
                pole_emploi_id: "1234567A".to_string(),
                first_name: "JEANNE".to_string(),
                last_name: "DUPONT".to_string(),
                birth_name: String::new(),
                birthdate: date(1990, 2, 14),
                start_at: date(2021, 1, 1),
                end_at: date(2022, 12, 31),
                pe_structure_code: "75101".to_string(),
            })
            .expect("inserted");
        store
    }

    #[test]
    fn failed_transfer_still_writes_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("itou.json");
        let store = store_with_pending_change(&path);

        let result = run_transfer(
            store.clone(),
            Arc::new(UnlistableDrop),
            &asp(),
            TransferOptions::default(),
            Utc::now(),
        );

        assert!(matches!(result, Err(AppError::Transfer(_))));
        let reopened = MemoryStore::open(&path).expect("reopened");
        assert_eq!(
            reopened.snapshot().expect("snapshot"),
            store.snapshot().expect("snapshot")
        );
        assert_eq!(
            reopened.snapshot().expect("snapshot").pole_emploi_approvals.len(),
            1
        );
    }

    #[test]
    fn dry_run_transfer_leaves_the_store_file_alone() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("itou.json");
        let store = store_with_pending_change(&path);

        let options = TransferOptions {
            dry_run: true,
            ..TransferOptions::default()
        };
        let result = run_transfer(store, Arc::new(UnlistableDrop), &asp(), options, Utc::now());

        assert!(result.is_err());
        assert!(!path.exists());
    }
}
