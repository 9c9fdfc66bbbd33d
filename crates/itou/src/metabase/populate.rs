use std::collections::HashSet;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::{debug, info};

use super::columns::{CellValue, ColumnKind, ColumnSpec};
use super::store::{ReportingStore, Statement};
use super::ReportingError;
use crate::config::MetabaseConfig;

pub const UPDATE_DATE_COLUMN: &str = "date_mise_à_jour_metabase";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulateOptions {
    pub insert_batch_size: usize,
    pub dry_run: bool,
    /// Row cap per table in dry-run mode.
    pub dry_run_rows: usize,
}

impl PopulateOptions {
    pub fn from_config(config: &MetabaseConfig, dry_run: bool) -> Self {
        Self {
            insert_batch_size: config.insert_batch_size,
            dry_run,
            dry_run_rows: config.dry_run_rows_per_table,
        }
    }

    fn batch_size(&self) -> usize {
        self.insert_batch_size.max(1)
    }
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self {
            insert_batch_size: 100,
            dry_run: false,
            dry_run_rows: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub table: String,
    pub rows: usize,
    pub columns: usize,
}

/// Rebuilds `table` under a temporary name, then swaps it in.
///
/// Readers keep seeing the previous table until the final renames, and every
/// step is committed separately so the reporting database stays reachable.
pub fn populate_table<S, T>(
    store: &mut S,
    table: &str,
    mut columns: Vec<ColumnSpec<T>>,
    objects: &[T],
    options: &PopulateOptions,
    now: DateTime<Utc>,
) -> Result<TableSummary, ReportingError>
where
    S: ReportingStore + ?Sized,
    T: 'static,
{
    cleanup_tables(store, table)?;

    let today = now.date_naive();
    columns.push(ColumnSpec::new(
        UPDATE_DATE_COLUMN,
        ColumnKind::Date,
        "Date de dernière mise à jour de Metabase",
        move |_: &T| CellValue::Date(today),
    ));
    ensure_unique_names(table, &columns)?;

    let (table_name, rows) = if options.dry_run {
        let sample_size = options.dry_run_rows.min(objects.len());
        let sample: Vec<&T> = objects
            .choose_multiple(&mut rand::thread_rng(), sample_size)
            .collect();
        (format!("{table}_dry_run"), sample)
    } else {
        (table.to_string(), objects.iter().collect())
    };
    let new_table = format!("{table_name}_new");
    let old_table = format!("{table_name}_old");

    info!(
        table = %table_name,
        rows = rows.len(),
        columns = columns.len(),
        "injecting rows into reporting table"
    );

    store.execute(Statement::Create {
        table: new_table.clone(),
        columns: columns.iter().map(ColumnSpec::definition).collect(),
    })?;
    store.commit()?;

    for column in &columns {
        store.execute(Statement::Comment {
            table: new_table.clone(),
            column: column.name.clone(),
            comment: column.comment.clone(),
        })?;
    }
    store.commit()?;

    let names: Vec<String> = columns.iter().map(|column| column.name.clone()).collect();
    for (index, chunk) in rows.chunks(options.batch_size()).enumerate() {
        let values = chunk
            .iter()
            .map(|row| columns.iter().map(|column| column.value_for(row)).collect())
            .collect();
        store.execute(Statement::InsertBatch {
            table: new_table.clone(),
            columns: names.clone(),
            rows: values,
        })?;
        store.commit()?;
        debug!(table = %new_table, batch = index, size = chunk.len(), "inserted batch");
    }

    store.execute(Statement::Rename {
        from: table_name.clone(),
        to: old_table.clone(),
        if_exists: true,
    })?;
    store.execute(Statement::Rename {
        from: new_table,
        to: table_name.clone(),
        if_exists: false,
    })?;
    store.commit()?;
    store.execute(Statement::DropIfExists { table: old_table })?;
    store.commit()?;

    Ok(TableSummary {
        table: table_name,
        rows: rows.len(),
        columns: columns.len(),
    })
}

/// Leftovers of an interrupted run, in both regular and dry-run flavors.
fn cleanup_tables<S: ReportingStore + ?Sized>(
    store: &mut S,
    table: &str,
) -> Result<(), ReportingError> {
    for suffix in ["_new", "_old", "_dry_run_new", "_dry_run_old"] {
        store.execute(Statement::DropIfExists {
            table: format!("{table}{suffix}"),
        })?;
    }
    store.commit()
}

fn ensure_unique_names<T>(table: &str, columns: &[ColumnSpec<T>]) -> Result<(), ReportingError> {
    let mut seen = HashSet::new();
    for column in columns {
        if column.name.is_empty() || !seen.insert(column.name.as_str()) {
            return Err(ReportingError::DuplicateColumn {
                table: table.to_string(),
                column: column.name.clone(),
            });
        }
    }
    Ok(())
}
