//! Domain core of the inclusion job platform: job applications and their
//! hiring workflow, PASS IAE approvals, ASP employee records and reference
//! data, and the nightly reporting build.

pub mod approvals;
pub mod asp;
pub mod config;
pub mod eligibility;
pub mod employee_records;
pub mod error;
pub mod job_applications;
pub mod metabase;
pub mod repository;
pub mod siaes;
pub mod store;
pub mod telemetry;
pub mod users;
