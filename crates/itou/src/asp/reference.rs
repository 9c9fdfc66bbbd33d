use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Reference rows carrying a validity period. A row without `end_date` is current.
pub trait Period {
    fn start_date(&self) -> NaiveDate;
    fn end_date(&self) -> Option<NaiveDate>;

    fn is_current(&self) -> bool {
        self.end_date().is_none()
    }
}

macro_rules! impl_period {
    ($($ty:ty),+) => {
        $(
            impl Period for $ty {
                fn start_date(&self) -> NaiveDate {
                    self.start_date
                }

                fn end_date(&self) -> Option<NaiveDate> {
                    self.end_date
                }
            }
        )+
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EducationLevel {
    pub id: u32,
    pub code: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// INSEE commune. The code differs from the postal code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commune {
    pub id: u32,
    pub code: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: u32,
    pub code: String,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

/// ASP equivalent of the SIAE kind, with its own codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub id: u32,
    /// `Rme_code_mesure_disp`, e.g. `ACI_DC`.
    pub code: String,
    pub display_code: String,
    pub help_code: String,
    pub name: String,
    pub rdi_id: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
}

impl_period!(EducationLevel, Commune, Department, Measure);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CountryGroup {
    #[serde(rename = "1")]
    France,
    #[serde(rename = "2")]
    Cee,
    #[serde(rename = "3")]
    OutsideCee,
}

impl CountryGroup {
    pub const fn code(self) -> &'static str {
        match self {
            Self::France => "1",
            Self::Cee => "2",
            Self::OutsideCee => "3",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::France => "France",
            Self::Cee => "CEE",
            Self::OutsideCee => "Hors CEE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "1" => Some(Self::France),
            "2" => Some(Self::Cee),
            "3" => Some(Self::OutsideCee),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub id: u32,
    pub code: String,
    pub name: String,
    pub group: CountryGroup,
    pub department: String,
}

/// Time spent registered at Pôle emploi (`ref_duree_allocation_emploi`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AllocationDuration {
    #[default]
    #[serde(rename = "")]
    None,
    #[serde(rename = "LESS_THAN_6_MONTHS")]
    LessThan6Months,
    #[serde(rename = "FROM_6_TO_11_MONTHS")]
    From6To11Months,
    #[serde(rename = "FROM_12_TO_23_MONTHS")]
    From12To23Months,
    #[serde(rename = "MORE_THAN_24_MONTHS")]
    MoreThan24Months,
}

impl AllocationDuration {
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "Aucune",
            Self::LessThan6Months => "Moins de 6 mois",
            Self::From6To11Months => "De 6 à 11 mois",
            Self::From12To23Months => "De 12 à 23 mois",
            Self::MoreThan24Months => "24 mois et plus",
        }
    }

    /// Code of the ASP `ref_duree_allocation_emploi` table.
    pub const fn asp_code(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::LessThan6Months => Some("01"),
            Self::From6To11Months => Some("02"),
            Self::From12To23Months => Some("03"),
            Self::MoreThan24Months => Some("04"),
        }
    }
}

/// In-memory reference table with "current" and "history" views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceTable<T> {
    rows: Vec<T>,
}

impl<T> Default for ReferenceTable<T> {
    fn default() -> Self {
        Self { rows: Vec::new() }
    }
}

impl<T: Period> ReferenceTable<T> {
    pub fn new(rows: Vec<T>) -> Self {
        Self { rows }
    }

    /// Rows usable as a reference for new objects.
    pub fn current(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().filter(|row| row.is_current())
    }

    /// Every version of every row, superseded ones included.
    pub fn history(&self) -> &[T] {
        &self.rows
    }

    /// Rows in effect on a given day.
    pub fn valid_on(&self, day: NaiveDate) -> impl Iterator<Item = &T> {
        self.rows.iter().filter(move |row| {
            row.start_date() <= day && row.end_date().map_or(true, |end| day <= end)
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
