use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Column types understood by the reporting database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Varchar,
    Integer,
    Boolean,
    Date,
    Timestamp,
    Interval,
}

impl ColumnKind {
    pub const fn sql_type(self) -> &'static str {
        match self {
            Self::Varchar => "varchar",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Timestamp => "timestamp with time zone",
            Self::Interval => "interval",
        }
    }

    /// Metabase cannot sum or average booleans, so they are stored as 0/1 integers.
    pub const fn stored(self) -> Self {
        match self {
            Self::Boolean => Self::Integer,
            other => other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    Date(NaiveDate),
    Timestamp(DateTime<Utc>),
    /// Whole days.
    Interval(i64),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn optional_text<S: Into<String>>(value: Option<S>) -> Self {
        value.map_or(Self::Null, |value| Self::Text(value.into()))
    }

    pub fn optional_date(value: Option<NaiveDate>) -> Self {
        value.map_or(Self::Null, Self::Date)
    }

    pub fn optional_timestamp(value: Option<DateTime<Utc>>) -> Self {
        value.map_or(Self::Null, Self::Timestamp)
    }

    pub fn count(value: usize) -> Self {
        Self::Integer(i64::try_from(value).unwrap_or(i64::MAX))
    }

    pub(crate) fn into_stored(self) -> Self {
        match self {
            Self::Boolean(value) => Self::Integer(i64::from(value)),
            other => other,
        }
    }
}

pub type Extractor<T> = Box<dyn Fn(&T) -> CellValue + Send + Sync>;

/// One reporting column: how it is declared and how a row fills it.
pub struct ColumnSpec<T> {
    pub name: String,
    pub kind: ColumnKind,
    pub comment: String,
    pub extract: Extractor<T>,
}

impl<T> ColumnSpec<T> {
    pub fn new<F>(
        name: impl Into<String>,
        kind: ColumnKind,
        comment: impl Into<String>,
        extract: F,
    ) -> Self
    where
        F: Fn(&T) -> CellValue + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            kind,
            comment: comment.into(),
            extract: Box::new(extract),
        }
    }

    pub fn definition(&self) -> ColumnDefinition {
        ColumnDefinition {
            name: self.name.clone(),
            kind: self.kind.stored(),
            comment: self.comment.clone(),
        }
    }

    pub(crate) fn value_for(&self, row: &T) -> CellValue {
        (self.extract)(row).into_stored()
    }
}

impl<T> std::fmt::Debug for ColumnSpec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ColumnSpec")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Column as declared in `CREATE TABLE`, booleans already mapped to integers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDefinition {
    pub name: String,
    pub kind: ColumnKind,
    pub comment: String,
}
