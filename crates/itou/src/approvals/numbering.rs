use chrono::{Datelike, NaiveDate};

use super::domain::{Approval, ApprovalPeriod};

/// Allocates PASS IAE numbers: `<prefix><yy><5-digit counter>`.
///
/// The year is the start year of the hiring. The counter follows the most recently
/// created Itou approval starting that year.
#[derive(Debug, Clone)]
pub struct NumberAllocator {
    prefix: String,
}

impl NumberAllocator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Next number after the last Itou approval of the hiring year.
    pub fn next_number<'a, I>(&self, hiring_start_at: NaiveDate, approvals: I) -> String
    where
        I: IntoIterator<Item = &'a Approval>,
    {
        let last = approvals
            .into_iter()
            .filter(|approval| {
                approval.originates_from_itou(&self.prefix)
                    && approval.start_at.year() == hiring_start_at.year()
            })
            .max_by_key(|approval| approval.created_at);

        match last.and_then(|approval| self.increment(&approval.number)) {
            Some(number) => number,
            None => format!("{}{}00001", self.prefix, hiring_start_at.format("%y")),
        }
    }

    /// Like [`next_number`](Self::next_number), skipping numbers already taken.
    pub fn allocate(&self, hiring_start_at: NaiveDate, approvals: &[Approval]) -> String {
        let mut number = self.next_number(hiring_start_at, approvals);
        while approvals.iter().any(|approval| approval.number == number) {
            match self.increment(&number) {
                Some(next) => number = next,
                None => break,
            }
        }
        number
    }

    fn increment(&self, number: &str) -> Option<String> {
        let numeric = number.strip_prefix(&self.prefix)?;
        let width = numeric.len();
        let value: u64 = numeric.parse().ok()?;
        Some(format!("{}{:0width$}", self.prefix, value + 1, width = width))
    }
}
