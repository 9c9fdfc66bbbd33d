use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use itou::error::AppError;

use crate::commands;
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "itou",
    about = "Inclusive employment platform: HTTP service and scheduled jobs",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Create and mark ready the employee records of settled hirings
    PrepareEmployeeRecords(PrepareArgs),
    /// Exchange employee records with the ASP SFTP drop
    TransferEmployeeRecords(TransferArgs),
    /// Rebuild the reporting tables as a SQL script
    PopulateMetabase(PopulateMetabaseArgs),
    /// Convert the ASP reference exports into fixtures
    ImportAspRefs(ImportAspRefsArgs),
    /// Write the employer CSV export of an SIAE's job applications
    ExportJobApplications(ExportJobApplicationsArgs),
    /// Load one fluxIAE export into a reporting table
    PopulateFluxiae(PopulateFluxiaeArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PrepareArgs {
    /// Report what would be created without saving
    #[arg(long)]
    pub(crate) dry_run: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct TransferArgs {
    /// Only send ready records
    #[arg(long)]
    pub(crate) upload: bool,
    /// Only process feedback files
    #[arg(long)]
    pub(crate) download: bool,
    /// Touch neither the remote files nor the records
    #[arg(long)]
    pub(crate) dry_run: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PopulateMetabaseArgs {
    /// Fill sampled `_dry_run` tables instead of the live ones
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Script destination, stdout when absent
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ImportAspRefsArgs {
    /// Directory holding the raw ASP exports
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Directory receiving the JSON fixtures
    #[arg(long)]
    pub(crate) output: PathBuf,
    /// Parse only, write nothing
    #[arg(long)]
    pub(crate) dry_run: bool,
}

#[derive(Args, Debug)]
pub(crate) struct ExportJobApplicationsArgs {
    /// SIAE whose received applications are exported
    #[arg(long)]
    pub(crate) siae: u64,
    /// CSV destination, stdout when absent
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct PopulateFluxiaeArgs {
    /// `|`-separated fluxIAE export
    #[arg(long)]
    pub(crate) input: PathBuf,
    /// Reporting table to replace
    #[arg(long)]
    pub(crate) table: String,
    #[arg(long)]
    pub(crate) dry_run: bool,
    /// Script destination, stdout when absent
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::PrepareEmployeeRecords(args) => commands::prepare_employee_records(args),
        Command::TransferEmployeeRecords(args) => commands::transfer_employee_records(args),
        Command::PopulateMetabase(args) => commands::populate_metabase(args),
        Command::ImportAspRefs(args) => commands::import_asp_refs(args),
        Command::ExportJobApplications(args) => commands::export_job_applications(args),
        Command::PopulateFluxiae(args) => commands::populate_fluxiae(args),
    }
}
