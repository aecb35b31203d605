//! Command-line surface of `dominode-bootstrapper`.
//!
//! `bootstrap` and `add-department` run all three backends in order; `db`, `minio`
//! and `geonode` run a single backend and also carry the `add-department-user`
//! command.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::bootstrap::{log_already_bootstrapped, Bootstrapper, RunSummary};
use crate::config::{default_config_paths, Settings};
use crate::db::PgAdmin;
use crate::error::{Backend, BootstrapResult};
use crate::gis::{GeoNodeSession, GeoServerClient};
use crate::minio::McClient;
use crate::naming::{self, Department};
use crate::outcome::{Applied, Report};
use crate::policy::UserRole;
use crate::reconcile::{DatabaseReconciler, GisReconciler, StorageReconciler};

/// Provision DomiNode departments in PostgreSQL, MinIO, GeoNode and GeoServer
#[derive(Debug, Parser)]
#[command(name = "dominode-bootstrapper")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Extra TOML config file, applied after the standard locations
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Vec<PathBuf>,

    /// Override a setting, e.g. `-o db.host=10.0.0.5`
    #[arg(short = 'o', long = "set", value_name = "SECTION.KEY=VALUE", global = true)]
    pub overrides: Vec<String>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print the step report as JSON instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Bootstrap every configured department on all backends
    Bootstrap,
    /// Bootstrap a single department on all backends
    AddDepartment(DepartmentArgs),
    /// PostgreSQL roles, schemas and tables
    Db {
        #[command(subcommand)]
        command: DbCommand,
    },
    /// MinIO buckets, policies, groups and users
    Minio {
        #[command(subcommand)]
        command: MinioCommand,
    },
    /// GeoNode groups and users plus the GeoServer side of each department
    Geonode {
        #[command(subcommand)]
        command: GeonodeCommand,
    },
}

#[derive(Debug, Args)]
pub struct DepartmentArgs {
    /// Department name, e.g. `ppd`
    pub name: String,
}

#[derive(Debug, Args)]
pub struct UserArgs {
    /// Departments the account belongs to
    #[arg(required = true, num_args = 1..)]
    pub departments: Vec<String>,

    #[arg(long, value_enum, default_value = "user")]
    pub role: UserRole,
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    Bootstrap,
    AddDepartment(DepartmentArgs),
    /// Create a login role under the department roles
    AddDepartmentUser {
        username: String,
        password: String,
        #[command(flatten)]
        user: UserArgs,
        /// Also grant the topographic map editor role
        #[arg(long)]
        topomap_editor: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum MinioCommand {
    Bootstrap,
    AddDepartment(DepartmentArgs),
    /// Create a storage account and add it to the matching group
    AddDepartmentUser {
        access_key: String,
        secret_key: String,
        #[command(flatten)]
        user: UserArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum GeonodeCommand {
    Bootstrap,
    AddDepartment(DepartmentArgs),
    /// Create a GeoNode account and add it to the matching groups
    AddDepartmentUser {
        username: String,
        password: String,
        #[command(flatten)]
        user: UserArgs,
    },
}

impl Cli {
    /// Standard config locations plus `--config`, the environment, then `-o` overrides.
    pub fn load_settings<I>(&self, env: I) -> BootstrapResult<Settings>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut paths = default_config_paths();
        paths.extend(self.config.iter().cloned());
        let mut settings = Settings::load(&paths, env)?;
        for spec in &self.overrides {
            settings.apply_override(spec)?;
        }
        Ok(settings)
    }
}

fn finish(report: Report, result: BootstrapResult<()>) -> RunSummary {
    RunSummary { report, error: result.err() }
}

async fn connect_db(settings: &Settings) -> BootstrapResult<PgAdmin> {
    PgAdmin::connect_with_retry(&settings.db()?).await
}

fn storage_client(settings: &Settings) -> BootstrapResult<McClient> {
    McClient::new(&settings.minio()?)
}

fn gis_clients(settings: &Settings) -> BootstrapResult<(GeoNodeSession, GeoServerClient)> {
    Ok((GeoNodeSession::new(&settings.geonode()?)?, GeoServerClient::new(&settings.geoserver()?)?))
}

/// Run one command to completion. Never panics on backend failures; the error, if
/// any, travels in the summary next to the steps already applied.
pub async fn execute(command: Commands, settings: &Settings) -> RunSummary {
    let mut report = Report::new();
    match command {
        Commands::Bootstrap => match connect_all(settings).await {
            Ok((db, storage, geonode, geoserver)) => {
                Bootstrapper::new(settings, &db, &storage, &geonode, &geoserver).bootstrap().await
            }
            Err(e) => finish(report, Err(e)),
        },
        Commands::AddDepartment(args) => {
            let department = match Department::parse(&args.name) {
                Ok(d) => d,
                Err(e) => return finish(report, Err(e)),
            };
            match connect_all(settings).await {
                Ok((db, storage, geonode, geoserver)) => {
                    Bootstrapper::new(settings, &db, &storage, &geonode, &geoserver)
                        .add_department(&department)
                        .await
                }
                Err(e) => finish(report, Err(e)),
            }
        }
        Commands::Db { command } => {
            let result = run_db(command, settings, &mut report).await;
            finish(report, result)
        }
        Commands::Minio { command } => {
            let result = run_minio(command, settings, &mut report).await;
            finish(report, result)
        }
        Commands::Geonode { command } => {
            let result = run_geonode(command, settings, &mut report).await;
            finish(report, result)
        }
    }
}

async fn connect_all(settings: &Settings) -> BootstrapResult<(PgAdmin, McClient, GeoNodeSession, GeoServerClient)> {
    // storage and GIS clients are built before the db retry loop
    let storage = storage_client(settings)?;
    let (geonode, geoserver) = gis_clients(settings)?;
    let db = connect_db(settings).await?;
    Ok((db, storage, geonode, geoserver))
}

async fn run_db(command: DbCommand, settings: &Settings, report: &mut Report) -> BootstrapResult<()> {
    match command {
        DbCommand::Bootstrap => {
            let departments = settings.departments()?;
            let admin = connect_db(settings).await?;
            DatabaseReconciler::new(&admin, settings).bootstrap(&departments, report).await?;
            log_already_bootstrapped(Backend::Database, &departments, report);
        }
        DbCommand::AddDepartment(args) => {
            let d = Department::parse(&args.name)?;
            let admin = connect_db(settings).await?;
            DatabaseReconciler::new(&admin, settings).add_department(&d, report).await?;
            log_already_bootstrapped(Backend::Database, std::slice::from_ref(&d), report);
        }
        DbCommand::AddDepartmentUser { username, password, user, topomap_editor } => {
            let departments = naming::parse_departments(&user.departments)?;
            let admin = connect_db(settings).await?;
            DatabaseReconciler::new(&admin, settings)
                .add_department_user(&username, &password, &departments, user.role, topomap_editor, report)
                .await?;
        }
    }
    Ok(())
}

async fn run_minio(command: MinioCommand, settings: &Settings, report: &mut Report) -> BootstrapResult<()> {
    let client = storage_client(settings)?;
    let reconciler = StorageReconciler::new(&client);
    match command {
        MinioCommand::Bootstrap => {
            let departments = settings.departments()?;
            reconciler.bootstrap(&departments, report).await?;
            log_already_bootstrapped(Backend::Storage, &departments, report);
        }
        MinioCommand::AddDepartment(args) => {
            let d = Department::parse(&args.name)?;
            reconciler.add_department(&d, report).await?;
            log_already_bootstrapped(Backend::Storage, std::slice::from_ref(&d), report);
        }
        MinioCommand::AddDepartmentUser { access_key, secret_key, user } => {
            let departments = naming::parse_departments(&user.departments)?;
            reconciler.add_department_user(&access_key, &secret_key, &departments, user.role, report).await?;
        }
    }
    Ok(())
}

async fn run_geonode(command: GeonodeCommand, settings: &Settings, report: &mut Report) -> BootstrapResult<()> {
    let (geonode, geoserver) = gis_clients(settings)?;
    let reconciler = GisReconciler::new(&geonode, &geoserver, settings);
    match command {
        GeonodeCommand::Bootstrap => {
            let departments = settings.departments()?;
            reconciler.bootstrap(&departments, report).await?;
            log_already_bootstrapped(Backend::Gis, &departments, report);
        }
        GeonodeCommand::AddDepartment(args) => {
            let d = Department::parse(&args.name)?;
            reconciler.add_department(&d, report).await?;
            log_already_bootstrapped(Backend::Gis, std::slice::from_ref(&d), report);
        }
        GeonodeCommand::AddDepartmentUser { username, password, user } => {
            let departments = naming::parse_departments(&user.departments)?;
            reconciler.add_department_user(&username, &password, &departments, user.role, report).await?;
        }
    }
    Ok(())
}

// ---- report rendering ----

const REPORT_HEADERS: [&str; 5] = ["backend", "scope", "kind", "name", "result"];
const MAX_CELL_WIDTH: usize = 48;

/// ASCII table of the steps, followed by a one-line tally.
pub fn render_report(report: &Report) -> String {
    let rows: Vec<[String; 5]> = report
        .steps
        .iter()
        .map(|s| {
            [s.backend.to_string(), s.scope.clone(), s.kind.clone(), s.name.clone(), s.applied.to_string()]
                .map(|cell| clip(&cell))
        })
        .collect();

    let mut widths = REPORT_HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let sep = widths.iter().fold(String::from("+"), |line, w| format!("{line}{}+", "-".repeat(w + 2)));
    let line = |cells: &[String; 5]| {
        cells.iter().zip(widths).fold(String::from("|"), |line, (cell, w)| format!("{line} {cell:<w$} |"))
    };

    let mut out = format!("{sep}\n{}\n{sep}\n", line(&REPORT_HEADERS.map(String::from)));
    for row in &rows {
        out.push_str(&line(row));
        out.push('\n');
    }
    out.push_str(&format!(
        "{sep}\n{} steps: {} created, {} skipped, {} ensured\n",
        report.steps.len(),
        report.count(Applied::Created),
        report.count(Applied::Skipped),
        report.count(Applied::Ensured),
    ));
    out
}

/// Cap a cell at `MAX_CELL_WIDTH` characters, marking the cut with an ellipsis.
fn clip(cell: &str) -> String {
    if cell.chars().count() <= MAX_CELL_WIDTH {
        return cell.to_string();
    }
    cell.chars().take(MAX_CELL_WIDTH - 1).chain(std::iter::once('…')).collect()
}

pub fn render_report_json(report: &Report) -> BootstrapResult<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
