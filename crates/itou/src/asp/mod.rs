//! ASP reference data: lane types, INSEE tables, measures and their CSV import.

pub mod import;
pub mod lane;
pub mod reference;

pub use import::{ImportSummary, ImportedFile, ReferenceImportError, ReferenceImporter};
pub use lane::{find_lane_type_alias, LaneExtension, LaneType};
pub use reference::{
    AllocationDuration, Commune, Country, CountryGroup, Department, EducationLevel, Measure,
    Period, ReferenceTable,
};
