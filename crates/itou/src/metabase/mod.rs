//! Nightly reporting build: denormalized, anonymized tables for Metabase,
//! plus the fluxIAE exports received from the ASP.

pub mod columns;
pub mod fluxiae;
pub mod populate;
pub mod store;
pub mod tables;


use thiserror::Error;

pub use columns::{CellValue, ColumnDefinition, ColumnKind, ColumnSpec};
pub use fluxiae::{populate_fluxiae, FluxIaeExport};
pub use populate::{populate_table, PopulateOptions, TableSummary, UPDATE_DATE_COLUMN};
pub use store::{MemoryReportingStore, MemoryTable, ReportingStore, SqlScriptStore, Statement};
pub use tables::{anonymize, populate_metabase, ReportingSettings};

#[derive(Debug, Error)]
pub enum ReportingError {
    #[error("table {0} does not exist")]
    UnknownTable(String),
    #[error("table {0} already exists")]
    TableExists(String),
    #[error("column {column} does not exist in table {table}")]
    UnknownColumn { table: String, column: String },
    #[error("inserted rows do not match the columns of table {0}")]
    ColumnMismatch(String),
    #[error("column name '{column}' is empty or declared twice in table {table}")]
    DuplicateColumn { table: String, column: String },
    #[error("invalid fluxIAE export at line {line}: {message}")]
    Fluxiae { line: u64, message: String },
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
