use std::io::Read;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::columns::{CellValue, ColumnKind, ColumnSpec};
use super::populate::{populate_table, PopulateOptions, TableSummary};
use super::store::ReportingStore;
use super::ReportingError;

pub const BIRTH_DATE_COLUMN: &str = "salarie_date_naissance";
pub const BIRTH_YEAR_COLUMN: &str = "salarie_annee_naissance";

/// Any column whose name contains one of these is never loaded.
pub const SENSITIVE_COLUMN_PATTERNS: [&str; 15] = [
    "nom_usage",
    "nom_naissance",
    "prenom",
    "date_naissance",
    "telephone",
    "adr_mail",
    "salarie_agrement",
    "salarie_adr_point_remise",
    "salarie_adr_cplt_point_geo",
    "salarie_adr_numero_voie",
    "salarie_codeextensionvoie",
    "salarie_codetypevoie",
    "salarie_adr_libelle_voie",
    "salarie_adr_cplt_distribution",
    "salarie_adr_qpv_nom",
];

pub fn is_sensitive(column: &str) -> bool {
    SENSITIVE_COLUMN_PATTERNS
        .iter()
        .any(|pattern| column.contains(pattern))
}

/// One fluxIAE export: a header row and text cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FluxIaeExport {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl FluxIaeExport {
    /// Reads a `|`-separated export. The leading `DEB…` row is optional, the
    /// trailing `FIN…` row is dropped. Quotes are plain characters.
    pub fn parse<R: Read>(reader: R) -> Result<Self, ReportingError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b'|')
            .quoting(false)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut headers: Option<Vec<String>> = None;
        let mut rows = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            let line = record
                .position()
                .map_or(index as u64 + 1, |position| position.line());
            let first = record.get(0).unwrap_or_default();

            match &headers {
                None if index == 0 && first.starts_with("DEB") => continue,
                None => {
                    if record.len() < 2 {
                        return Err(ReportingError::Fluxiae {
                            line,
                            message: "header row has fewer than two columns".to_string(),
                        });
                    }
                    headers = Some(record.iter().map(|cell| cell.trim().to_string()).collect());
                }
                Some(_) if first.starts_with("FIN") => break,
                Some(columns) => {
                    if record.len() != columns.len() {
                        return Err(ReportingError::Fluxiae {
                            line,
                            message: format!(
                                "expected {} cells, found {}",
                                columns.len(),
                                record.len()
                            ),
                        });
                    }
                    rows.push(record.iter().map(str::to_string).collect());
                }
            }
        }

        let headers = headers.ok_or_else(|| ReportingError::Fluxiae {
            line: 0,
            message: "export has no header row".to_string(),
        })?;
        Ok(Self { headers, rows })
    }

    /// Derives the birth year, then drops every sensitive column.
    pub fn anonymize(mut self) -> Self {
        if let Some(birth_date) = self.column_index(BIRTH_DATE_COLUMN) {
            self.headers.push(BIRTH_YEAR_COLUMN.to_string());
            for row in &mut self.rows {
                let year = birth_year(&row[birth_date]).unwrap_or_default();
                row.push(year);
            }
        }

        let kept: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .filter(|(_, name)| !is_sensitive(name))
            .map(|(index, _)| index)
            .collect();
        let dropped = self.headers.len() - kept.len();
        if dropped > 0 {
            info!(dropped, "dropped sensitive fluxIAE columns");
        }

        self.headers = kept.iter().map(|&index| self.headers[index].clone()).collect();
        self.rows = self
            .rows
            .into_iter()
            .map(|row| kept.iter().map(|&index| row[index].clone()).collect())
            .collect();
        self
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Text columns, except the derived birth year which is an integer.
    pub fn columns(&self) -> Vec<ColumnSpec<Vec<String>>> {
        self.headers
            .iter()
            .enumerate()
            .map(|(index, name)| {
                if name == BIRTH_YEAR_COLUMN {
                    ColumnSpec::new(
                        name.clone(),
                        ColumnKind::Integer,
                        "Année de naissance du salarié",
                        move |row: &Vec<String>| {
                            row.get(index)
                                .and_then(|cell| cell.parse::<i64>().ok())
                                .map_or(CellValue::Null, CellValue::Integer)
                        },
                    )
                } else {
                    ColumnSpec::new(
                        name.clone(),
                        ColumnKind::Varchar,
                        String::new(),
                        move |row: &Vec<String>| {
                            CellValue::optional_text(
                                row.get(index).filter(|cell| !cell.is_empty()).cloned(),
                            )
                        },
                    )
                }
            })
            .collect()
    }
}

/// `dd/mm/yyyy` and similar formats all end with the year.
fn birth_year(date: &str) -> Option<String> {
    let trimmed = date.trim();
    let start = trimmed.len().checked_sub(4)?;
    let year = trimmed.get(start..)?;
    if year.chars().all(|c| c.is_ascii_digit()) {
        Some(year.to_string())
    } else {
        warn!(value = trimmed, "unparsable fluxIAE birth date");
        None
    }
}

/// Loads one fluxIAE export into `table` through the usual swap.
pub fn populate_fluxiae<S, R>(
    store: &mut S,
    table: &str,
    reader: R,
    options: &PopulateOptions,
    now: DateTime<Utc>,
) -> Result<TableSummary, ReportingError>
where
    S: ReportingStore + ?Sized,
    R: Read,
{
    let export = FluxIaeExport::parse(reader)?.anonymize();
    info!(table, rows = export.rows.len(), "loaded fluxIAE export");
    let columns = export.columns();
    populate_table(store, table, columns, &export.rows, options, now)
}
