use std::collections::BTreeMap;
use std::io::Write;

use chrono::SecondsFormat;

use super::columns::{CellValue, ColumnDefinition};
use super::ReportingError;

/// DDL/DML issued while rebuilding one reporting table.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    DropIfExists {
        table: String,
    },
    Create {
        table: String,
        columns: Vec<ColumnDefinition>,
    },
    Comment {
        table: String,
        column: String,
        comment: String,
    },
    InsertBatch {
        table: String,
        columns: Vec<String>,
        rows: Vec<Vec<CellValue>>,
    },
    Rename {
        from: String,
        to: String,
        if_exists: bool,
    },
}

/// Destination of the reporting build.
pub trait ReportingStore {
    fn execute(&mut self, statement: Statement) -> Result<(), ReportingError>;

    /// Ends the current unit of work; stores without transactions ignore it.
    fn commit(&mut self) -> Result<(), ReportingError> {
        Ok(())
    }
}

/// Renders statements as a PostgreSQL script, one short transaction per commit.
pub struct SqlScriptStore<W: Write> {
    writer: W,
    in_transaction: bool,
}

impl<W: Write> SqlScriptStore<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            in_transaction: false,
        }
    }

    /// Closes any open transaction and hands the writer back.
    pub fn finish(mut self) -> Result<W, ReportingError> {
        self.commit()?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    fn write_line(&mut self, sql: &str) -> Result<(), ReportingError> {
        if !self.in_transaction {
            writeln!(self.writer, "BEGIN;")?;
            self.in_transaction = true;
        }
        writeln!(self.writer, "{sql};")?;
        Ok(())
    }
}

impl<W: Write> ReportingStore for SqlScriptStore<W> {
    fn execute(&mut self, statement: Statement) -> Result<(), ReportingError> {
        let sql = render(&statement);
        self.write_line(&sql)
    }

    fn commit(&mut self) -> Result<(), ReportingError> {
        if self.in_transaction {
            writeln!(self.writer, "COMMIT;")?;
            self.in_transaction = false;
        }
        Ok(())
    }
}

pub fn render(statement: &Statement) -> String {
    match statement {
        Statement::DropIfExists { table } => {
            format!("DROP TABLE IF EXISTS {}", quote_identifier(table))
        }
        Statement::Create { table, columns } => {
            let columns = columns
                .iter()
                .map(|column| {
                    format!(
                        "{} {}",
                        quote_identifier(&column.name),
                        column.kind.sql_type()
                    )
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("CREATE TABLE {} ({columns})", quote_identifier(table))
        }
        Statement::Comment {
            table,
            column,
            comment,
        } => format!(
            "COMMENT ON COLUMN {}.{} IS {}",
            quote_identifier(table),
            quote_identifier(column),
            quote_literal(comment)
        ),
        Statement::InsertBatch {
            table,
            columns,
            rows,
        } => {
            let columns = columns
                .iter()
                .map(|name| quote_identifier(name))
                .collect::<Vec<_>>()
                .join(", ");
            let values = rows
                .iter()
                .map(|row| {
                    let cells = row.iter().map(render_value).collect::<Vec<_>>().join(", ");
                    format!("({cells})")
                })
                .collect::<Vec<_>>()
                .join(",\n    ");
            format!(
                "INSERT INTO {} ({columns}) VALUES\n    {values}",
                quote_identifier(table)
            )
        }
        Statement::Rename {
            from,
            to,
            if_exists,
        } => format!(
            "ALTER TABLE {}{} RENAME TO {}",
            if *if_exists { "IF EXISTS " } else { "" },
            quote_identifier(from),
            quote_identifier(to)
        ),
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn render_value(value: &CellValue) -> String {
    match value {
        CellValue::Null => "NULL".to_string(),
        CellValue::Text(text) => quote_literal(text),
        CellValue::Integer(number) => number.to_string(),
        CellValue::Boolean(flag) => String::from(if *flag { "TRUE" } else { "FALSE" }),
        CellValue::Date(date) => format!("DATE '{}'", date.format("%Y-%m-%d")),
        CellValue::Timestamp(at) => format!(
            "TIMESTAMPTZ '{}'",
            at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ),
        CellValue::Interval(days) => format!("INTERVAL '{days} days'"),
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<ColumnDefinition>,
    pub comments: BTreeMap<String, String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl MemoryTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }

    /// Values of one column, in insertion order.
    pub fn column_values(&self, name: &str) -> Vec<CellValue> {
        match self.column_index(name) {
            Some(index) => self.rows.iter().map(|row| row[index].clone()).collect(),
            None => Vec::new(),
        }
    }
}

/// Keeps tables in memory and records every statement it was given.
#[derive(Debug, Default)]
pub struct MemoryReportingStore {
    tables: BTreeMap<String, MemoryTable>,
    history: Vec<Statement>,
    commits: usize,
}

impl MemoryReportingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&MemoryTable> {
        self.tables.get(name)
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    pub fn history(&self) -> &[Statement] {
        &self.history
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    fn existing_mut(&mut self, table: &str) -> Result<&mut MemoryTable, ReportingError> {
        self.tables
            .get_mut(table)
            .ok_or_else(|| ReportingError::UnknownTable(table.to_string()))
    }

    fn apply(&mut self, statement: &Statement) -> Result<(), ReportingError> {
        match statement {
            Statement::DropIfExists { table } => {
                self.tables.remove(table);
            }
            Statement::Create { table, columns } => {
                if self.tables.contains_key(table) {
                    return Err(ReportingError::TableExists(table.clone()));
                }
                self.tables.insert(
                    table.clone(),
                    MemoryTable {
                        columns: columns.clone(),
                        ..MemoryTable::default()
                    },
                );
            }
            Statement::Comment {
                table,
                column,
                comment,
            } => {
                let target = self.existing_mut(table)?;
                if target.column_index(column).is_none() {
                    return Err(ReportingError::UnknownColumn {
                        table: table.clone(),
                        column: column.clone(),
                    });
                }
                target.comments.insert(column.clone(), comment.clone());
            }
            Statement::InsertBatch {
                table,
                columns,
                rows,
            } => {
                let target = self.existing_mut(table)?;
                let declared: Vec<&str> = target
                    .columns
                    .iter()
                    .map(|column| column.name.as_str())
                    .collect();
                if declared != columns.iter().map(String::as_str).collect::<Vec<_>>()
                    || rows.iter().any(|row| row.len() != declared.len())
                {
                    return Err(ReportingError::ColumnMismatch(table.clone()));
                }
                target.rows.extend(rows.iter().cloned());
            }
            Statement::Rename {
                from,
                to,
                if_exists,
            } => {
                if self.tables.contains_key(to) {
                    return Err(ReportingError::TableExists(to.clone()));
                }
                match self.tables.remove(from) {
                    Some(table) => {
                        self.tables.insert(to.clone(), table);
                    }
                    None if *if_exists => {}
                    None => return Err(ReportingError::UnknownTable(from.clone())),
                }
            }
        }
        Ok(())
    }
}

impl ReportingStore for MemoryReportingStore {
    fn execute(&mut self, statement: Statement) -> Result<(), ReportingError> {
        self.apply(&statement)?;
        self.history.push(statement);
        Ok(())
    }

    fn commit(&mut self) -> Result<(), ReportingError> {
        self.commits += 1;
        Ok(())
    }
}
