//! "Fiches salarié": employee records sent to ASP in JSON batch files, and the
//! feedback files that close them.

pub mod batch;
pub mod domain;
pub mod preparation;
pub mod repository;
pub mod serializer;
pub mod transfer;

#[cfg(test)]
mod tests;

pub use batch::{
    batch_filename, batch_filename_from_feedback, feedback_filename, BatchError,
    EmployeeRecordBatch, FeedbackBatch, FeedbackLine, MAX_EMPLOYEE_RECORDS,
};
pub use domain::{EmployeeRecord, EmployeeRecordError, EmployeeRecordStatus};
pub use preparation::{prepare_employee_records, PreparationReport};
pub use repository::EmployeeRecordRepository;
pub use serializer::EmployeeRecordLine;
pub use transfer::{
    FileTransport, LocalDirectoryTransport, RemoteDir, TransferError, TransferJob,
    TransferOptions, TransferReport,
};
