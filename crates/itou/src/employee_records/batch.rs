use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::serializer::EmployeeRecordLine;

pub const BATCH_FILE_PREFIX: &str = "RIAE_FS_";
pub const FEEDBACK_FILE_SUFFIX: &str = "_FichierRetour";
/// ASP refuses batch files holding more lines than this.
pub const MAX_EMPLOYEE_RECORDS: usize = 700;
/// Processing code of an accepted line.
pub const SUCCESS_CODE: &str = "0000";

const TIMESTAMP_LENGTH: usize = 14;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BatchError {
    #[error("invalid ASP batch file name: '{0}'")]
    InvalidFileName(String),
    #[error("invalid ASP feedback file name: '{0}'")]
    InvalidFeedbackFileName(String),
    #[error("a batch holds at most {max} employee records (got {count})")]
    TooManyRecords { count: usize, max: usize },
    #[error("malformed batch JSON: {0}")]
    Json(String),
}

/// `RIAE_FS_<YYYYMMDDHHMMSS>.json`
pub fn batch_filename(now: DateTime<Utc>) -> String {
    format!("{BATCH_FILE_PREFIX}{}.json", now.format("%Y%m%d%H%M%S"))
}

pub fn validate_batch_filename(name: &str) -> Result<(), BatchError> {
    let timestamp = name
        .strip_prefix(BATCH_FILE_PREFIX)
        .and_then(|rest| rest.strip_suffix(".json"))
        .ok_or_else(|| BatchError::InvalidFileName(name.to_string()))?;
    if timestamp.len() != TIMESTAMP_LENGTH || !timestamp.chars().all(|c| c.is_ascii_digit()) {
        return Err(BatchError::InvalidFileName(name.to_string()));
    }
    Ok(())
}

/// `RIAE_FS_20210410130000.json` → `RIAE_FS_20210410130000_FichierRetour.json`
pub fn feedback_filename(batch_file: &str) -> Result<String, BatchError> {
    validate_batch_filename(batch_file)?;
    let stem = batch_file.trim_end_matches(".json");
    Ok(format!("{stem}{FEEDBACK_FILE_SUFFIX}.json"))
}

pub fn batch_filename_from_feedback(feedback_file: &str) -> Result<String, BatchError> {
    let invalid = || BatchError::InvalidFeedbackFileName(feedback_file.to_string());
    let stem = feedback_file
        .strip_suffix(".json")
        .and_then(|rest| rest.strip_suffix(FEEDBACK_FILE_SUFFIX))
        .ok_or_else(invalid)?;
    let batch_file = format!("{stem}.json");
    validate_batch_filename(&batch_file).map_err(|_| invalid())?;
    Ok(batch_file)
}

/// Uploaded file: line numbers are 1-based positions in the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeRecordBatch {
    pub msg_informatif: Option<String>,
    pub tel_id: Option<String>,
    pub lignes_telechargement: Vec<EmployeeRecordLine>,
}

impl EmployeeRecordBatch {
    pub fn new(lines: Vec<EmployeeRecordLine>, max_records: usize) -> Result<Self, BatchError> {
        if lines.len() > max_records {
            return Err(BatchError::TooManyRecords {
                count: lines.len(),
                max: max_records,
            });
        }
        let lignes_telechargement = lines
            .into_iter()
            .zip(1u32..)
            .map(|(mut line, number)| {
                line.num_ligne = number;
                line
            })
            .collect();
        Ok(Self {
            msg_informatif: None,
            tel_id: None,
            lignes_telechargement,
        })
    }

    pub fn to_json(&self) -> Result<Vec<u8>, BatchError> {
        serde_json::to_vec(self).map_err(|error| BatchError::Json(error.to_string()))
    }
}

/// Feedback file returned by ASP. Lines are kept loose: ASP echoes the uploaded line
/// with `codeTraitement` and `libelleTraitement` filled in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackBatch {
    #[serde(default)]
    pub msg_informatif: Option<String>,
    #[serde(default)]
    pub lignes_telechargement: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackLine {
    pub line_number: Option<u32>,
    pub code: String,
    pub label: String,
    pub raw: serde_json::Value,
}

impl FeedbackLine {
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE
    }
}

impl FeedbackBatch {
    pub fn parse(bytes: &[u8]) -> Result<Self, BatchError> {
        serde_json::from_slice(bytes).map_err(|error| BatchError::Json(error.to_string()))
    }

    pub fn lines(&self) -> Vec<FeedbackLine> {
        self.lignes_telechargement
            .iter()
            .map(|raw| {
                let text = |field: &str| {
                    raw.get(field)
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                FeedbackLine {
                    line_number: raw
                        .get("numLigne")
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|n| u32::try_from(n).ok())
                        .filter(|n| *n > 0),
                    code: text("codeTraitement"),
                    label: text("libelleTraitement"),
                    raw: raw.clone(),
                }
            })
            .collect()
    }
}
