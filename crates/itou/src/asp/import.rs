use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::{debug, info};

use super::reference::{Commune, Country, CountryGroup, Department, EducationLevel, Measure};

const ASP_DATE_FORMAT: &str = "%d/%m/%Y";

#[derive(Debug)]
pub enum ReferenceImportError {
    Io(std::io::Error),
    Csv(csv::Error),
    Json(serde_json::Error),
    InvalidDate { file: &'static str, value: String },
    InvalidCountryGroup { code: String, value: String },
}

impl std::fmt::Display for ReferenceImportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceImportError::Io(err) => write!(f, "failed to access ASP reference file: {}", err),
            ReferenceImportError::Csv(err) => write!(f, "invalid ASP reference CSV data: {}", err),
            ReferenceImportError::Json(err) => write!(f, "could not write fixture: {}", err),
            ReferenceImportError::InvalidDate { file, value } => {
                write!(f, "{file}: '{value}' is not a dd/mm/yyyy date")
            }
            ReferenceImportError::InvalidCountryGroup { code, value } => {
                write!(f, "country {code}: unknown group '{value}'")
            }
        }
    }
}

impl std::error::Error for ReferenceImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReferenceImportError::Io(err) => Some(err),
            ReferenceImportError::Csv(err) => Some(err),
            ReferenceImportError::Json(err) => Some(err),
            ReferenceImportError::InvalidDate { .. }
            | ReferenceImportError::InvalidCountryGroup { .. } => None,
        }
    }
}

impl From<std::io::Error> for ReferenceImportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<csv::Error> for ReferenceImportError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err)
    }
}

impl From<serde_json::Error> for ReferenceImportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err)
    }
}

/// Outcome of one reference file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedFile {
    pub source: &'static str,
    pub fixture: &'static str,
    pub rows: usize,
    pub written: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: Vec<ImportedFile>,
    pub skipped: Vec<&'static str>,
}

/// Turns ASP reference CSV exports into JSON fixture files.
pub struct ReferenceImporter {
    input_dir: PathBuf,
    output_dir: PathBuf,
    dry_run: bool,
}

impl ReferenceImporter {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            dry_run,
        }
    }

    /// Import every known reference file found in the input directory.
    pub fn run(&self) -> Result<ImportSummary, ReferenceImportError> {
        let mut summary = ImportSummary::default();

        self.import(
            &mut summary,
            "ref_niveau_formation.csv",
            "asp_education_levels.json",
            parse_education_levels,
        )?;
        self.import(
            &mut summary,
            "ref_insee_com.csv",
            "asp_INSEE_communes.json",
            parse_communes,
        )?;
        self.import(
            &mut summary,
            "ref_insee_dpt.csv",
            "asp_INSEE_departments.json",
            parse_departments,
        )?;
        self.import(
            &mut summary,
            "ref_insee_pays.csv",
            "asp_INSEE_countries.json",
            parse_countries,
        )?;
        self.import(&mut summary, "ref_mesure.csv", "asp_measures.json", parse_measures)?;

        Ok(summary)
    }

    fn import<T, F>(
        &self,
        summary: &mut ImportSummary,
        source: &'static str,
        fixture: &'static str,
        parse: F,
    ) -> Result<(), ReferenceImportError>
    where
        T: Serialize,
        F: FnOnce(File) -> Result<Vec<T>, ReferenceImportError>,
    {
        let path = self.input_dir.join(source);
        if !path.is_file() {
            info!(file = %path.display(), "no import file found, skipping");
            summary.skipped.push(source);
            return Ok(());
        }

        let rows = parse(File::open(&path)?)?;
        debug!(file = source, rows = rows.len(), "parsed ASP reference file");

        let written = if self.dry_run {
            info!(fixture, "dry run, fixture not written");
            false
        } else {
            write_fixture(&self.output_dir.join(fixture), &rows)?;
            info!(fixture, rows = rows.len(), "fixture written");
            true
        };

        summary.imported.push(ImportedFile {
            source,
            fixture,
            rows: rows.len(),
            written,
        });
        Ok(())
    }
}

fn write_fixture<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), ReferenceImportError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, rows)?;
    Ok(())
}

fn reader<R: Read>(source: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b';')
        .trim(csv::Trim::All)
        .from_reader(source)
}

/// ASP exports use `%d/%m/%Y`; an empty value or a lone `/` means "no date".
pub fn parse_asp_date(file: &'static str, value: Option<&str>) -> Result<Option<NaiveDate>, ReferenceImportError> {
    match value.map(str::trim) {
        None | Some("") | Some("/") => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, ASP_DATE_FORMAT)
            .map(Some)
            .map_err(|_| ReferenceImportError::InvalidDate {
                file,
                value: raw.to_string(),
            }),
    }
}

fn required_date(file: &'static str, value: Option<&str>) -> Result<NaiveDate, ReferenceImportError> {
    parse_asp_date(file, value)?.ok_or_else(|| ReferenceImportError::InvalidDate {
        file,
        value: value.unwrap_or_default().to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct EducationLevelRow {
    rnf_id: u32,
    rnf_code_form_empl: String,
    rnf_libelle_niveau_form_empl: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rte_date_debut_effet: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    rte_date_fin_effet: Option<String>,
}

pub fn parse_education_levels<R: Read>(source: R) -> Result<Vec<EducationLevel>, ReferenceImportError> {
    const FILE: &str = "ref_niveau_formation.csv";
    let mut rows = Vec::new();
    for row in reader(source).deserialize::<EducationLevelRow>() {
        let row = row?;
        rows.push(EducationLevel {
            id: row.rnf_id,
            code: row.rnf_code_form_empl,
            name: row.rnf_libelle_niveau_form_empl,
            start_date: required_date(FILE, row.rte_date_debut_effet.as_deref())?,
            end_date: parse_asp_date(FILE, row.rte_date_fin_effet.as_deref())?,
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct CommuneRow {
    #[serde(rename = "CODE_COM_INSEE")]
    code: String,
    #[serde(rename = "LIB_COM")]
    name: String,
    #[serde(rename = "DATE_DEB_INSEE", default, deserialize_with = "empty_string_as_none")]
    start: Option<String>,
    #[serde(rename = "DATE_FIN_INSEE", default, deserialize_with = "empty_string_as_none")]
    end: Option<String>,
}

pub fn parse_communes<R: Read>(source: R) -> Result<Vec<Commune>, ReferenceImportError> {
    const FILE: &str = "ref_insee_com.csv";
    let mut rows = Vec::new();
    for (idx, row) in reader(source).deserialize::<CommuneRow>().enumerate() {
        let row = row?;
        rows.push(Commune {
            id: idx as u32 + 1,
            code: row.code,
            name: row.name,
            start_date: required_date(FILE, row.start.as_deref())?,
            end_date: parse_asp_date(FILE, row.end.as_deref())?,
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct DepartmentRow {
    #[serde(rename = "CODE_DPT")]
    code: String,
    #[serde(rename = "LIB_DPT")]
    name: String,
    #[serde(rename = "DATE_DEB_DPT", default, deserialize_with = "empty_string_as_none")]
    start: Option<String>,
    #[serde(rename = "DATE_FIN_DPT", default, deserialize_with = "empty_string_as_none")]
    end: Option<String>,
}

pub fn parse_departments<R: Read>(source: R) -> Result<Vec<Department>, ReferenceImportError> {
    const FILE: &str = "ref_insee_dpt.csv";
    let mut rows = Vec::new();
    for (idx, row) in reader(source).deserialize::<DepartmentRow>().enumerate() {
        let row = row?;
        rows.push(Department {
            id: idx as u32 + 1,
            code: row.code,
            name: row.name,
            start_date: required_date(FILE, row.start.as_deref())?,
            end_date: parse_asp_date(FILE, row.end.as_deref())?,
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct CountryRow {
    #[serde(rename = "CODE_INSEE_PAYS")]
    code: String,
    #[serde(rename = "LIB_INSEE_PAYS")]
    name: String,
    #[serde(rename = "CODE_GROUPE_PAYS")]
    group: String,
    #[serde(rename = "CODE_DPT", default)]
    department: String,
}

pub fn parse_countries<R: Read>(source: R) -> Result<Vec<Country>, ReferenceImportError> {
    let mut rows = Vec::new();
    for (idx, row) in reader(source).deserialize::<CountryRow>().enumerate() {
        let row = row?;
        let group = CountryGroup::from_code(&row.group).ok_or_else(|| {
            ReferenceImportError::InvalidCountryGroup {
                code: row.code.clone(),
                value: row.group.clone(),
            }
        })?;
        rows.push(Country {
            id: idx as u32 + 1,
            code: row.code,
            name: row.name,
            group,
            department: if row.department.is_empty() {
                "098".to_string()
            } else {
                row.department
            },
        });
    }
    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct MeasureRow {
    #[serde(rename = "Rme_id")]
    id: u32,
    #[serde(rename = "Rme_code_mesure_disp")]
    code: String,
    #[serde(rename = "Rme_code_mesure")]
    display_code: String,
    #[serde(rename = "Rme_code_aide", default)]
    help_code: String,
    #[serde(rename = "Rme_libelle_mesure")]
    name: String,
    #[serde(rename = "Rdi_id", default)]
    rdi_id: String,
    #[serde(rename = "Rme_date_debut_effet", default, deserialize_with = "empty_string_as_none")]
    start: Option<String>,
    #[serde(rename = "Rme_date_fin_effet", default, deserialize_with = "empty_string_as_none")]
    end: Option<String>,
}

pub fn parse_measures<R: Read>(source: R) -> Result<Vec<Measure>, ReferenceImportError> {
    const FILE: &str = "ref_mesure.csv";
    let mut rows = Vec::new();
    for row in reader(source).deserialize::<MeasureRow>() {
        let row = row?;
        rows.push(Measure {
            id: row.id,
            code: row.code,
            display_code: row.display_code,
            help_code: row.help_code,
            name: row.name,
            rdi_id: row.rdi_id,
            start_date: required_date(FILE, row.start.as_deref())?,
            end_date: parse_asp_date(FILE, row.end.as_deref())?,
        });
    }
    Ok(rows)
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asp::reference::ReferenceTable;

    const COMMUNES: &str = "CODE_COM_INSEE;LIB_COM;DATE_DEB_INSEE;DATE_FIN_INSEE\n\
        67482;STRASBOURG;01/01/1900;\n\
        97101;ABYMES;01/01/1900;/\n\
        75056;PARIS;01/01/1900;31/12/2018\n";

    #[test]
    fn parses_communes_and_open_ended_periods() {
        let communes = parse_communes(COMMUNES.as_bytes()).expect("communes parse");
        assert_eq!(communes.len(), 3);
        assert_eq!(communes[0].id, 1);
        assert_eq!(communes[0].end_date, None);
        assert_eq!(communes[1].end_date, None, "'/' means no end date");
        assert_eq!(
            communes[2].end_date,
            NaiveDate::from_ymd_opt(2018, 12, 31)
        );

        let table = ReferenceTable::new(communes);
        assert_eq!(table.current().count(), 2);
    }

    #[test]
    fn rejects_unknown_country_groups() {
        let csv = "CODE_INSEE_PAYS;LIB_INSEE_PAYS;CODE_GROUPE_PAYS;CODE_DPT\n100;FRANCE;1;\n212;MAROC;9;098\n";
        match parse_countries(csv.as_bytes()) {
            Err(ReferenceImportError::InvalidCountryGroup { code, .. }) => assert_eq!(code, "212"),
            other => panic!("expected group error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_dates() {
        let csv = "CODE_DPT;LIB_DPT;DATE_DEB_DPT;DATE_FIN_DPT\n67;BAS-RHIN;1900-01-01;\n";
        assert!(matches!(
            parse_departments(csv.as_bytes()),
            Err(ReferenceImportError::InvalidDate { .. })
        ));
    }

    #[test]
    fn run_writes_fixtures_and_skips_missing_files() {
        let input = tempfile::tempdir().expect("input dir");
        let output = tempfile::tempdir().expect("output dir");
        std::fs::write(input.path().join("ref_insee_com.csv"), COMMUNES).expect("write csv");
        std::fs::write(
            input.path().join("ref_mesure.csv"),
            "Rme_id;Rme_code_mesure_disp;Rme_code_mesure;Rme_code_aide;Rme_libelle_mesure;Rdi_id;Rme_date_debut_effet;Rme_date_fin_effet\n\
             1;ACI_DC;ACI;ACI;Atelier et Chantier d'Insertion;D;01/07/2014;\n",
        )
        .expect("write csv");

        let summary = ReferenceImporter::new(input.path(), output.path(), false)
            .run()
            .expect("import succeeds");

        assert_eq!(summary.imported.len(), 2);
        assert_eq!(summary.skipped.len(), 3);
        let fixture = std::fs::read_to_string(output.path().join("asp_measures.json"))
            .expect("fixture written");
        let measures: Vec<Measure> = serde_json::from_str(&fixture).expect("fixture parses");
        assert_eq!(measures[0].code, "ACI_DC");
        assert_eq!(measures[0].display_code, "ACI");
    }

    #[test]
    fn dry_run_writes_nothing() {
        let input = tempfile::tempdir().expect("input dir");
        let output = tempfile::tempdir().expect("output dir");
        std::fs::write(input.path().join("ref_insee_com.csv"), COMMUNES).expect("write csv");

        let summary = ReferenceImporter::new(input.path(), output.path(), true)
            .run()
            .expect("import succeeds");

        assert_eq!(summary.imported[0].rows, 3);
        assert!(!summary.imported[0].written);
        assert!(!output.path().join("asp_INSEE_communes.json").exists());
    }
}
