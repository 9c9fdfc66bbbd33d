use super::domain::{EmployeeRecord, EmployeeRecordStatus};
use crate::repository::RepositoryError;

/// Implementations refuse two records sharing a SIRET and an approval number.
pub trait EmployeeRecordRepository: Send + Sync {
    fn employee_records(&self) -> Result<Vec<EmployeeRecord>, RepositoryError>;
    fn employee_records_with_status(
        &self,
        status: EmployeeRecordStatus,
    ) -> Result<Vec<EmployeeRecord>, RepositoryError>;
    fn find_by_batch(
        &self,
        batch_file: &str,
        line_number: u32,
    ) -> Result<Option<EmployeeRecord>, RepositoryError>;

    /// Insert when `id` is 0, update otherwise.
    fn save_employee_record(&self, record: EmployeeRecord) -> Result<EmployeeRecord, RepositoryError>;

    /// Update several records at once, all or nothing.
    fn save_employee_records(&self, records: Vec<EmployeeRecord>) -> Result<(), RepositoryError>;
}
