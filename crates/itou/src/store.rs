//! In-process store implementing every repository, optionally backed by a JSON snapshot.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::approvals::{
    Approval, ApprovalRepository, PoleEmploiApproval, Prolongation, Suspension,
};
use crate::employee_records::{EmployeeRecord, EmployeeRecordRepository, EmployeeRecordStatus};
use crate::job_applications::{
    JobApplication, JobApplicationId, JobApplicationRepository, JobApplicationTransitionLog,
    WorkflowChangeset,
};
use crate::repository::RepositoryError;
use crate::users::UserId;

/// Everything the store holds, as written to disk.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub job_applications: Vec<JobApplication>,
    pub transition_logs: Vec<JobApplicationTransitionLog>,
    pub approvals: Vec<Approval>,
    pub pole_emploi_approvals: Vec<PoleEmploiApproval>,
    pub suspensions: Vec<Suspension>,
    pub prolongations: Vec<Prolongation>,
    pub employee_records: Vec<EmployeeRecord>,
    /// Last numeric id handed out to suspensions, prolongations and employee records.
    pub last_id: u64,
}

impl StoreSnapshot {
    fn next_id(&mut self) -> u64 {
        self.last_id += 1;
        self.last_id
    }

    fn approval_mut(&mut self, number: &str) -> Result<&mut Approval, RepositoryError> {
        self.approvals
            .iter_mut()
            .find(|approval| approval.number == number)
            .ok_or_else(|| RepositoryError::NotFound(format!("approval {number}")))
    }

    /// Every check runs before anything is written, so a failed changeset leaves
    /// the snapshot untouched.
    fn apply(&mut self, changeset: WorkflowChangeset) -> Result<(), RepositoryError> {
        for log in &changeset.logs {
            let stored = self
                .job_applications
                .iter()
                .find(|application| application.id == log.job_application_id)
                .ok_or_else(|| {
                    RepositoryError::NotFound(format!("job application {}", log.job_application_id))
                })?;
            if stored.state != log.from_state {
                return Err(RepositoryError::Conflict(format!(
                    "job application {} is {}, not {}",
                    stored.id, stored.state, log.from_state
                )));
            }
        }
        for application in &changeset.applications {
            if !self.job_applications.iter().any(|a| a.id == application.id) {
                return Err(RepositoryError::NotFound(format!(
                    "job application {}",
                    application.id
                )));
            }
        }
        for (index, approval) in changeset.approvals_to_insert.iter().enumerate() {
            let duplicate = self.approvals.iter().any(|a| a.number == approval.number)
                || changeset.approvals_to_insert[..index]
                    .iter()
                    .any(|a| a.number == approval.number);
            if duplicate {
                return Err(RepositoryError::Constraint(format!(
                    "approval number {} already used",
                    approval.number
                )));
            }
        }

        for number in &changeset.approvals_to_delete {
            self.approvals.retain(|approval| &approval.number != number);
            self.suspensions.retain(|s| &s.approval_number != number);
            self.prolongations.retain(|p| &p.approval_number != number);
        }
        self.approvals.extend(changeset.approvals_to_insert);
        for application in changeset.applications {
            if let Some(slot) = self
                .job_applications
                .iter_mut()
                .find(|stored| stored.id == application.id)
            {
                *slot = application;
            }
        }
        self.transition_logs.extend(changeset.logs);
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("store file '{path}' is not a valid snapshot: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// All repositories behind one mutex: a changeset is applied while holding it.
///
/// `persisting` serializes snapshot writers so that the file on disk always
/// ends with the latest state.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<StoreSnapshot>,
    persisting: Mutex<()>,
    path: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
            persisting: Mutex::new(()),
            path: None,
        }
    }

    /// Load the snapshot at `path`. A missing file opens an empty store that
    /// `persist` will create.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let snapshot = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no store snapshot yet, starting empty");
                StoreSnapshot::default()
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };
        Ok(Self {
            state: Mutex::new(snapshot),
            persisting: Mutex::new(()),
            path: Some(path),
        })
    }

    /// Write the snapshot next to its destination, then rename it into place.
    pub fn persist(&self) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _writer = self
            .persisting
            .lock()
            .map_err(|_| RepositoryError::Unavailable("persist mutex poisoned".to_string()))?;
        let bytes = {
            let state = self.lock()?;
            serde_json::to_vec_pretty(&*state).map_err(|source| StoreError::Json {
                path: path.clone(),
                source,
            })?
        };
        let io_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| StoreError::Io { path, source }
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let partial = path.with_extension("json.tmp");
        fs::write(&partial, &bytes).map_err(io_error(&partial))?;
        fs::rename(&partial, path).map_err(io_error(path))?;
        debug!(path = %path.display(), bytes = bytes.len(), "store snapshot written");
        Ok(())
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot, RepositoryError> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreSnapshot>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }
}

impl JobApplicationRepository for MemoryStore {
    fn insert(&self, application: JobApplication) -> Result<JobApplication, RepositoryError> {
        let mut state = self.lock()?;
        if state.job_applications.iter().any(|a| a.id == application.id) {
            return Err(RepositoryError::Conflict(format!(
                "job application {}",
                application.id
            )));
        }
        state.job_applications.push(application.clone());
        Ok(application)
    }

    fn fetch(&self, id: JobApplicationId) -> Result<Option<JobApplication>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.job_applications.iter().find(|a| a.id == id).cloned())
    }

    fn for_job_seeker(&self, job_seeker_id: UserId) -> Result<Vec<JobApplication>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .job_applications
            .iter()
            .filter(|a| a.job_seeker.id == job_seeker_id)
            .cloned()
            .collect())
    }

    fn for_siae(&self, siae_id: u64) -> Result<Vec<JobApplication>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .job_applications
            .iter()
            .filter(|a| a.to_siae.id == siae_id)
            .cloned()
            .collect())
    }

    fn all(&self) -> Result<Vec<JobApplication>, RepositoryError> {
        Ok(self.lock()?.job_applications.clone())
    }

    fn referencing_approval(&self, number: &str) -> Result<Vec<JobApplication>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .job_applications
            .iter()
            .filter(|a| a.approval_number.as_deref() == Some(number))
            .cloned()
            .collect())
    }

    fn logs(&self, id: JobApplicationId) -> Result<Vec<JobApplicationTransitionLog>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .transition_logs
            .iter()
            .filter(|log| log.job_application_id == id)
            .cloned()
            .collect())
    }

    fn commit(&self, changeset: WorkflowChangeset) -> Result<(), RepositoryError> {
        if changeset.is_empty() {
            return Ok(());
        }
        let mut state = self.lock()?;
        state.apply(changeset)
    }
}

impl ApprovalRepository for MemoryStore {
    fn approval(&self, number: &str) -> Result<Option<Approval>, RepositoryError> {
        let state = self.lock()?;
        Ok(state.approvals.iter().find(|a| a.number == number).cloned())
    }

    fn approvals_for(&self, job_seeker_id: UserId) -> Result<Vec<Approval>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .approvals
            .iter()
            .filter(|a| a.job_seeker_id == job_seeker_id)
            .cloned()
            .collect())
    }

    fn all_approvals(&self) -> Result<Vec<Approval>, RepositoryError> {
        Ok(self.lock()?.approvals.clone())
    }

    fn pole_emploi_approvals_for(
        &self,
        pole_emploi_id: &str,
        birthdate: NaiveDate,
    ) -> Result<Vec<PoleEmploiApproval>, RepositoryError> {
        let state = self.lock()?;
        let mut matching: Vec<_> = state
            .pole_emploi_approvals
            .iter()
            .filter(|a| a.pole_emploi_id == pole_emploi_id && a.birthdate == birthdate)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.start_at.cmp(&a.start_at));
        Ok(matching)
    }

    fn insert_pole_emploi_approval(&self, approval: PoleEmploiApproval) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state
            .pole_emploi_approvals
            .iter()
            .any(|a| a.number == approval.number && a.pole_emploi_id == approval.pole_emploi_id)
        {
            return Err(RepositoryError::Conflict(format!(
                "Pôle emploi approval {}",
                approval.number
            )));
        }
        state.pole_emploi_approvals.push(approval);
        Ok(())
    }

    fn suspensions(&self, approval_number: &str) -> Result<Vec<Suspension>, RepositoryError> {
        let state = self.lock()?;
        let mut suspensions: Vec<_> = state
            .suspensions
            .iter()
            .filter(|s| s.approval_number == approval_number)
            .cloned()
            .collect();
        suspensions.sort_by_key(|s| s.start_at);
        Ok(suspensions)
    }

    fn save_suspension(&self, mut suspension: Suspension) -> Result<Suspension, RepositoryError> {
        let mut state = self.lock()?;
        if let Some(other) = state.suspensions.iter().find(|other| {
            other.id != suspension.id
                && other.approval_number == suspension.approval_number
                && other.overlaps(suspension.start_at, suspension.end_at)
        }) {
            return Err(RepositoryError::Constraint(format!(
                "suspension {} overlaps suspension {}",
                suspension.id, other.id
            )));
        }

        let previous_days = if suspension.id == 0 {
            0
        } else {
            state
                .suspensions
                .iter()
                .find(|s| s.id == suspension.id)
                .map(Suspension::duration_days)
                .ok_or_else(|| RepositoryError::NotFound(format!("suspension {}", suspension.id)))?
        };
        state
            .approval_mut(&suspension.approval_number)?
            .shift_end_at(previous_days, suspension.duration_days());

        if suspension.id == 0 {
            suspension.id = state.next_id();
            state.suspensions.push(suspension.clone());
        } else if let Some(slot) = state.suspensions.iter_mut().find(|s| s.id == suspension.id) {
            *slot = suspension.clone();
        }
        Ok(suspension)
    }

    fn delete_suspension(&self, id: u64) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let index = state
            .suspensions
            .iter()
            .position(|s| s.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("suspension {id}")))?;
        let suspension = state.suspensions.remove(index);
        if let Ok(approval) = state.approval_mut(&suspension.approval_number) {
            approval.shift_end_at(suspension.duration_days(), 0);
        }
        Ok(())
    }

    fn prolongations(&self, approval_number: &str) -> Result<Vec<Prolongation>, RepositoryError> {
        let state = self.lock()?;
        let mut prolongations: Vec<_> = state
            .prolongations
            .iter()
            .filter(|p| p.approval_number == approval_number)
            .cloned()
            .collect();
        prolongations.sort_by_key(|p| p.start_at);
        Ok(prolongations)
    }

    fn save_prolongation(
        &self,
        mut prolongation: Prolongation,
    ) -> Result<Prolongation, RepositoryError> {
        let mut state = self.lock()?;
        if let Some(other) = state.prolongations.iter().find(|other| {
            other.id != prolongation.id
                && other.approval_number == prolongation.approval_number
                && other.end_at >= prolongation.start_at
                && other.start_at <= prolongation.end_at
        }) {
            return Err(RepositoryError::Constraint(format!(
                "prolongation {} overlaps prolongation {}",
                prolongation.id, other.id
            )));
        }

        let previous_days = if prolongation.id == 0 {
            0
        } else {
            state
                .prolongations
                .iter()
                .find(|p| p.id == prolongation.id)
                .map(Prolongation::effective_days)
                .ok_or_else(|| {
                    RepositoryError::NotFound(format!("prolongation {}", prolongation.id))
                })?
        };
        state
            .approval_mut(&prolongation.approval_number)?
            .shift_end_at(previous_days, prolongation.effective_days());

        if prolongation.id == 0 {
            prolongation.id = state.next_id();
            state.prolongations.push(prolongation.clone());
        } else if let Some(slot) = state
            .prolongations
            .iter_mut()
            .find(|p| p.id == prolongation.id)
        {
            *slot = prolongation.clone();
        }
        Ok(prolongation)
    }

    fn delete_prolongation(&self, id: u64) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        let index = state
            .prolongations
            .iter()
            .position(|p| p.id == id)
            .ok_or_else(|| RepositoryError::NotFound(format!("prolongation {id}")))?;
        let prolongation = state.prolongations.remove(index);
        if let Ok(approval) = state.approval_mut(&prolongation.approval_number) {
            approval.shift_end_at(prolongation.effective_days(), 0);
        }
        Ok(())
    }
}

fn check_employee_record_unique(
    records: &[EmployeeRecord],
    record: &EmployeeRecord,
) -> Result<(), RepositoryError> {
    let duplicate = records.iter().any(|other| {
        other.id != record.id
            && other.siret == record.siret
            && other.approval_number == record.approval_number
    });
    if duplicate {
        return Err(RepositoryError::Constraint(format!(
            "employee record for SIRET {} and approval {} already exists",
            record.siret, record.approval_number
        )));
    }
    Ok(())
}

impl EmployeeRecordRepository for MemoryStore {
    fn employee_records(&self) -> Result<Vec<EmployeeRecord>, RepositoryError> {
        Ok(self.lock()?.employee_records.clone())
    }

    fn employee_records_with_status(
        &self,
        status: EmployeeRecordStatus,
    ) -> Result<Vec<EmployeeRecord>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .employee_records
            .iter()
            .filter(|record| record.status == status)
            .cloned()
            .collect())
    }

    fn find_by_batch(
        &self,
        batch_file: &str,
        line_number: u32,
    ) -> Result<Option<EmployeeRecord>, RepositoryError> {
        let state = self.lock()?;
        Ok(state
            .employee_records
            .iter()
            .find(|record| {
                record.asp_batch_file.as_deref() == Some(batch_file)
                    && record.asp_batch_line_number == Some(line_number)
            })
            .cloned())
    }

    fn save_employee_record(
        &self,
        mut record: EmployeeRecord,
    ) -> Result<EmployeeRecord, RepositoryError> {
        let mut state = self.lock()?;
        check_employee_record_unique(&state.employee_records, &record)?;
        if record.id == 0 {
            record.id = state.next_id();
            state.employee_records.push(record.clone());
            return Ok(record);
        }
        let slot = state
            .employee_records
            .iter_mut()
            .find(|stored| stored.id == record.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("employee record {}", record.id)))?;
        *slot = record.clone();
        Ok(record)
    }

    fn save_employee_records(&self, records: Vec<EmployeeRecord>) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        for record in &records {
            if !state.employee_records.iter().any(|stored| stored.id == record.id) {
                return Err(RepositoryError::NotFound(format!("employee record {}", record.id)));
            }
            check_employee_record_unique(&state.employee_records, record)?;
        }
        for record in records {
            if let Some(slot) = state
                .employee_records
                .iter_mut()
                .find(|stored| stored.id == record.id)
            {
                *slot = record;
            }
        }
        Ok(())
    }
}
