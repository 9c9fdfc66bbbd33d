use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::batch::{self, BatchError, EmployeeRecordBatch, FeedbackBatch};
use super::domain::{EmployeeRecord, EmployeeRecordError, EmployeeRecordStatus};
use super::repository::EmployeeRecordRepository;
use super::serializer::EmployeeRecordLine;
use crate::repository::RepositoryError;

/// Remote folders of the ASP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteDir {
    /// "depot": batch files for ASP.
    Upload,
    /// "retrait": feedback files from ASP.
    Download,
}

/// File exchange with ASP (SFTP server in production).
pub trait FileTransport: Send + Sync {
    fn put(&self, dir: RemoteDir, name: &str, content: &[u8]) -> Result<(), TransferError>;
    fn list(&self, dir: RemoteDir) -> Result<Vec<String>, TransferError>;
    fn get(&self, dir: RemoteDir, name: &str) -> Result<Vec<u8>, TransferError>;
    fn remove(&self, dir: RemoteDir, name: &str) -> Result<(), TransferError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("transport failure on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("transport unavailable: {0}")]
    Transport(String),
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error(transparent)]
    Record(#[from] EmployeeRecordError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("{failed_batches} batch file(s) and {failed_feedback_files} feedback file(s) failed")]
    Incomplete {
        failed_batches: usize,
        failed_feedback_files: usize,
    },
}

/// ASP drop folders mounted on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalDirectoryTransport {
    upload_dir: PathBuf,
    download_dir: PathBuf,
}

impl LocalDirectoryTransport {
    pub fn new(upload_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            download_dir: download_dir.into(),
        }
    }

    fn dir(&self, dir: RemoteDir) -> &Path {
        match dir {
            RemoteDir::Upload => &self.upload_dir,
            RemoteDir::Download => &self.download_dir,
        }
    }

    fn path(&self, dir: RemoteDir, name: &str) -> Result<PathBuf, TransferError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(TransferError::Transport(format!("invalid remote file name '{name}'")));
        }
        Ok(self.dir(dir).join(name))
    }
}

fn io_error(path: &Path) -> impl FnOnce(io::Error) -> TransferError + '_ {
    move |source| TransferError::Io {
        path: path.to_path_buf(),
        source,
    }
}

impl FileTransport for LocalDirectoryTransport {
    fn put(&self, dir: RemoteDir, name: &str, content: &[u8]) -> Result<(), TransferError> {
        let base = self.dir(dir);
        fs::create_dir_all(base).map_err(io_error(base))?;
        let path = self.path(dir, name)?;
        let partial = path.with_extension("part");
        fs::write(&partial, content).map_err(io_error(&partial))?;
        fs::rename(&partial, &path).map_err(io_error(&path))
    }

    fn list(&self, dir: RemoteDir) -> Result<Vec<String>, TransferError> {
        let base = self.dir(dir);
        if !base.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(base).map_err(io_error(base))? {
            let entry = entry.map_err(io_error(base))?;
            if entry.path().is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn get(&self, dir: RemoteDir, name: &str) -> Result<Vec<u8>, TransferError> {
        let path = self.path(dir, name)?;
        fs::read(&path).map_err(io_error(&path))
    }

    fn remove(&self, dir: RemoteDir, name: &str) -> Result<(), TransferError> {
        let path = self.path(dir, name)?;
        fs::remove_file(&path).map_err(io_error(&path))
    }
}

/// Which halves of the exchange to run. Neither flag set means both.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransferOptions {
    pub upload: bool,
    pub download: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    pub uploaded_batches: usize,
    pub sent: usize,
    pub feedback_files: usize,
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub failed_batches: usize,
    pub failed_feedback_files: usize,
}

impl TransferReport {
    /// Turns failures that were logged and skipped into an error.
    pub fn ensure_complete(&self) -> Result<(), TransferError> {
        if self.failed_batches == 0 && self.failed_feedback_files == 0 {
            return Ok(());
        }
        Err(TransferError::Incomplete {
            failed_batches: self.failed_batches,
            failed_feedback_files: self.failed_feedback_files,
        })
    }
}

/// Scheduled exchange of employee records with ASP.
pub struct TransferJob<R, T> {
    repository: Arc<R>,
    transport: Arc<T>,
    max_records: usize,
    id_salt: String,
}

impl<R, T> TransferJob<R, T>
where
    R: EmployeeRecordRepository + 'static,
    T: FileTransport + 'static,
{
    pub fn new(
        repository: Arc<R>,
        transport: Arc<T>,
        max_records: usize,
        id_salt: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            transport,
            max_records: max_records.clamp(1, batch::MAX_EMPLOYEE_RECORDS),
            id_salt: id_salt.into(),
        }
    }

    pub fn run(
        &self,
        options: TransferOptions,
        now: DateTime<Utc>,
    ) -> Result<TransferReport, TransferError> {
        let both = !options.upload && !options.download;
        let mut report = TransferReport::default();
        if both || options.upload {
            self.upload(options.dry_run, now, &mut report)?;
        }
        if both || options.download {
            self.download(options.dry_run, now, &mut report)?;
        }
        info!(
            uploaded_batches = report.uploaded_batches,
            sent = report.sent,
            accepted = report.accepted,
            rejected = report.rejected,
            skipped = report.skipped,
            failed_batches = report.failed_batches,
            failed_feedback_files = report.failed_feedback_files,
            dry_run = options.dry_run,
            "employee records transfer done"
        );
        Ok(report)
    }

    /// Send ready records in batches. Records are marked sent only once their
    /// batch file is on the server; a failed batch leaves its records ready
    /// and the next batches are still attempted.
    pub fn upload(
        &self,
        dry_run: bool,
        now: DateTime<Utc>,
        report: &mut TransferReport,
    ) -> Result<(), TransferError> {
        let mut ready = self
            .repository
            .employee_records_with_status(EmployeeRecordStatus::Ready)?;
        ready.sort_by_key(|record| record.id);
        if ready.is_empty() {
            info!("no employee record ready for upload");
            return Ok(());
        }

        for (index, chunk) in ready.chunks(self.max_records).enumerate() {
            // One file name per batch, even when several are sent within the same second.
            let offset = i64::try_from(index).unwrap_or(i64::MAX);
            let batch_file = batch::batch_filename(now + Duration::seconds(offset));

            match self.upload_batch(&batch_file, chunk, dry_run, now) {
                Ok(0) => {}
                Ok(sent) => {
                    report.sent += sent;
                    report.uploaded_batches += 1;
                }
                Err(error) => {
                    error!(
                        batch_file = %batch_file,
                        records = chunk.len(),
                        %error,
                        "could not upload batch file"
                    );
                    report.failed_batches += 1;
                }
            }
        }
        Ok(())
    }

    /// Returns the number of records marked sent, 0 on dry-run.
    fn upload_batch(
        &self,
        batch_file: &str,
        chunk: &[EmployeeRecord],
        dry_run: bool,
        now: DateTime<Utc>,
    ) -> Result<usize, TransferError> {
        let lines = chunk
            .iter()
            .zip(1u32..)
            .map(|(record, line)| EmployeeRecordLine::from_record(record, line, &self.id_salt))
            .collect::<Result<Vec<_>, _>>()?;
        let content = EmployeeRecordBatch::new(lines, self.max_records)?.to_json()?;

        if dry_run {
            info!(
                batch_file,
                records = chunk.len(),
                bytes = content.len(),
                "dry-run: batch not sent"
            );
            debug!(content = %String::from_utf8_lossy(&content), "dry-run batch content");
            return Ok(0);
        }

        self.transport.put(RemoteDir::Upload, batch_file, &content)?;
        info!(batch_file, records = chunk.len(), "batch file uploaded");

        let mut sent = Vec::with_capacity(chunk.len());
        for (record, line) in chunk.iter().zip(1u32..) {
            let mut record = record.clone();
            record.update_as_sent(batch_file, line, now)?;
            sent.push(record);
        }
        let count = sent.len();
        self.repository.save_employee_records(sent)?;
        Ok(count)
    }

    /// Apply ASP feedback files to the records they reference, then remove them.
    /// A file that cannot be read, applied or removed stays on the server for
    /// the next run.
    pub fn download(
        &self,
        dry_run: bool,
        now: DateTime<Utc>,
        report: &mut TransferReport,
    ) -> Result<(), TransferError> {
        let files = self.transport.list(RemoteDir::Download)?;
        if files.is_empty() {
            info!("no feedback file found");
            return Ok(());
        }

        for feedback_file in files {
            let batch_file = match batch::batch_filename_from_feedback(&feedback_file) {
                Ok(name) => name,
                Err(error) => {
                    warn!(feedback_file = %feedback_file, %error, "ignoring unexpected file");
                    continue;
                }
            };
            let processed =
                self.process_feedback(&feedback_file, &batch_file, dry_run, now, report);
            if let Err(error) = processed {
                error!(feedback_file = %feedback_file, %error, "could not process feedback file");
                report.failed_feedback_files += 1;
            }
        }
        Ok(())
    }

    fn process_feedback(
        &self,
        feedback_file: &str,
        batch_file: &str,
        dry_run: bool,
        now: DateTime<Utc>,
        report: &mut TransferReport,
    ) -> Result<(), TransferError> {
        let content = self.transport.get(RemoteDir::Download, feedback_file)?;
        let feedback = FeedbackBatch::parse(&content)?;

        // Counters are only merged once the whole file went through.
        let mut counts = TransferReport::default();
        let updates = self.apply_feedback(batch_file, &feedback, dry_run, now, &mut counts)?;
        if dry_run {
            info!(feedback_file, "dry-run: feedback left in place");
        } else {
            self.repository.save_employee_records(updates)?;
            self.transport.remove(RemoteDir::Download, feedback_file)?;
            info!(feedback_file, "feedback file processed and removed");
        }

        report.feedback_files += 1;
        report.accepted += counts.accepted;
        report.rejected += counts.rejected;
        report.skipped += counts.skipped;
        Ok(())
    }

    fn apply_feedback(
        &self,
        batch_file: &str,
        feedback: &FeedbackBatch,
        dry_run: bool,
        now: DateTime<Utc>,
        report: &mut TransferReport,
    ) -> Result<Vec<EmployeeRecord>, TransferError> {
        let lines = feedback.lines();
        if lines.is_empty() {
            error!(batch_file, "feedback file holds no employee record");
        }

        let mut updates = Vec::new();
        for (index, line) in lines.into_iter().enumerate() {
            let Some(line_number) = line.line_number else {
                warn!(batch_file, index, "feedback line without line number");
                report.skipped += 1;
                continue;
            };
            let Some(mut record) = self.repository.find_by_batch(batch_file, line_number)? else {
                error!(batch_file, line_number, "no employee record for feedback line");
                report.skipped += 1;
                continue;
            };
            if record.status != EmployeeRecordStatus::Sent {
                debug!(
                    batch_file,
                    line_number,
                    status = %record.status,
                    "employee record already handled"
                );
                report.skipped += 1;
                continue;
            }

            debug!(batch_file, line_number, code = %line.code, label = %line.label, "processing code");
            if line.is_success() {
                report.accepted += 1;
                if !dry_run {
                    record.update_as_accepted(&line.code, &line.label, line.raw, now)?;
                    updates.push(record);
                }
            } else {
                report.rejected += 1;
                if !dry_run {
                    record.update_as_rejected(&line.code, &line.label, now)?;
                    updates.push(record);
                }
            }
        }
        Ok(updates)
    }
}
