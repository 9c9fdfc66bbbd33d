use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::approvals::Approval;
use crate::employee_records::{
    EmployeeRecord, EmployeeRecordRepository, FileTransport, RemoteDir, TransferError,
    TransferJob,
};
use crate::job_applications::tests::common::{application_in, date, now, siae};
use crate::job_applications::JobApplicationState;
use crate::store::MemoryStore;
use crate::users::UserId;

pub(super) const SALT: &str = "test-salt";

pub(super) fn later() -> DateTime<Utc> {
    now() + chrono::Duration::days(30)
}

/// Stores `count` ready records, each for its own SIAE.
pub(super) fn store_with_ready_records(count: u64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for index in 0..count {
        let number = format!("9999921{index:05}");
        let approval = Approval {
            number: number.clone(),
            job_seeker_id: UserId(7),
            start_at: date(2021, 4, 1),
            end_at: date(2023, 3, 31),
            created_at: now(),
            created_by: None,
        };
        let mut application = application_in(JobApplicationState::Accepted);
        application.to_siae = siae(10 + index);
        application.hiring_start_at = Some(date(2021, 4, 1));
        application.approval_number = Some(number);

        let mut record =
            EmployeeRecord::from_job_application(&application, Some(&approval), &[], 4, later())
                .expect("record");
        record.update_as_ready(later()).expect("ready");
        store.save_employee_record(record).expect("saved");
    }
    store
}

pub(super) fn job(
    store: &Arc<MemoryStore>,
    transport: &Arc<MemoryTransport>,
    max_records: usize,
) -> TransferJob<MemoryStore, MemoryTransport> {
    TransferJob::new(store.clone(), transport.clone(), max_records, SALT)
}

#[derive(Default)]
pub(super) struct MemoryTransport {
    files: Mutex<BTreeMap<(bool, String), Vec<u8>>>,
}

fn key(dir: RemoteDir, name: &str) -> (bool, String) {
    (dir == RemoteDir::Upload, name.to_string())
}

impl MemoryTransport {
    pub(super) fn names(&self, dir: RemoteDir) -> Vec<String> {
        self.list(dir).expect("list")
    }

    pub(super) fn content(&self, dir: RemoteDir, name: &str) -> serde_json::Value {
        let bytes = self.get(dir, name).expect("file");
        serde_json::from_slice(&bytes).expect("json file")
    }

    pub(super) fn drop_file(&self, dir: RemoteDir, name: &str, value: &serde_json::Value) {
        let bytes = serde_json::to_vec(value).expect("serializable");
        self.put(dir, name, &bytes).expect("put");
    }
}

impl FileTransport for MemoryTransport {
    fn put(&self, dir: RemoteDir, name: &str, content: &[u8]) -> Result<(), TransferError> {
        self.files
            .lock()
            .expect("transport mutex poisoned")
            .insert(key(dir, name), content.to_vec());
        Ok(())
    }

    fn list(&self, dir: RemoteDir) -> Result<Vec<String>, TransferError> {
        let upload = dir == RemoteDir::Upload;
        Ok(self
            .files
            .lock()
            .expect("transport mutex poisoned")
            .keys()
            .filter(|(is_upload, _)| *is_upload == upload)
            .map(|(_, name)| name.clone())
            .collect())
    }

    fn get(&self, dir: RemoteDir, name: &str) -> Result<Vec<u8>, TransferError> {
        self.files
            .lock()
            .expect("transport mutex poisoned")
            .get(&key(dir, name))
            .cloned()
            .ok_or_else(|| TransferError::Transport(format!("no such file {name}")))
    }

    fn remove(&self, dir: RemoteDir, name: &str) -> Result<(), TransferError> {
        self.files
            .lock()
            .expect("transport mutex poisoned")
            .remove(&key(dir, name));
        Ok(())
    }
}

/// Server refusing every operation.
pub(super) struct UnreachableTransport;

impl FileTransport for UnreachableTransport {
    fn put(&self, _dir: RemoteDir, _name: &str, _content: &[u8]) -> Result<(), TransferError> {
        Err(TransferError::Transport("connection refused".to_string()))
    }

    fn list(&self, _dir: RemoteDir) -> Result<Vec<String>, TransferError> {
        Err(TransferError::Transport("connection refused".to_string()))
    }

    fn get(&self, _dir: RemoteDir, _name: &str) -> Result<Vec<u8>, TransferError> {
        Err(TransferError::Transport("connection refused".to_string()))
    }

    fn remove(&self, _dir: RemoteDir, _name: &str) -> Result<(), TransferError> {
        Err(TransferError::Transport("connection refused".to_string()))
    }
}

/// In-memory server whose n-th `put` or n-th `get` fails (1-based, 0 never).
#[derive(Default)]
pub(super) struct FlakyTransport {
    pub(super) inner: MemoryTransport,
    pub(super) fail_put_at: usize,
    pub(super) fail_get_at: usize,
    puts: AtomicUsize,
    gets: AtomicUsize,
}

impl FlakyTransport {
    pub(super) fn failing_put(call: usize) -> Self {
        Self {
            fail_put_at: call,
            ..Self::default()
        }
    }

    pub(super) fn failing_get(call: usize) -> Self {
        Self {
            fail_get_at: call,
            ..Self::default()
        }
    }
}

impl FileTransport for FlakyTransport {
    fn put(&self, dir: RemoteDir, name: &str, content: &[u8]) -> Result<(), TransferError> {
        if self.puts.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_put_at {
            return Err(TransferError::Transport("connection reset".to_string()));
        }
        self.inner.put(dir, name, content)
    }

    fn list(&self, dir: RemoteDir) -> Result<Vec<String>, TransferError> {
        self.inner.list(dir)
    }

    fn get(&self, dir: RemoteDir, name: &str) -> Result<Vec<u8>, TransferError> {
        if self.gets.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_get_at {
            return Err(TransferError::Transport("connection reset".to_string()));
        }
        self.inner.get(dir, name)
    }

    fn remove(&self, dir: RemoteDir, name: &str) -> Result<(), TransferError> {
        self.inner.remove(dir, name)
    }
}
