use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use dominode_bootstrapper::cli::{self, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_level))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let settings = match cli.load_settings(std::env::vars()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    };
    info!(target: "dominode::bootstrap", "dominode-bootstrapper {} starting", env!("CARGO_PKG_VERSION"));

    let json = cli.json;
    let summary = cli::execute(cli.command, &settings).await;
    if json {
        println!("{}", cli::render_report_json(&summary.report)?);
    } else if !summary.report.steps.is_empty() {
        print!("{}", cli::render_report(&summary.report));
    }

    match summary.error {
        None => Ok(()),
        Some(e) => {
            error!(target: "dominode::bootstrap", "{} ({})", e, e.code_str());
            eprintln!("error: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
