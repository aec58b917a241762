mod plot;
mod prompt;
mod report;
mod session;

use clap::{ArgAction, Parser};
use plot::VelocityChart;
use session::{exit_status_for, run_session};
use std::io;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dragfall")]
#[command(version)]
#[command(about = "Velocity of a body falling with linear drag, derived by Laplace transform", long_about = None)]
struct Cli {
    /// Skip the chart window
    #[arg(long)]
    no_plot: bool,

    /// Also print the run report as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Raise log verbosity on stderr (-v warn, -vv info, -vvv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "error",
        1 => "warn",
        2 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .compact()
        .finish();
    match tracing::subscriber::set_global_default(subscriber) {
        Ok(_) => {
            info!("Logging initialised");
        }
        Err(e) => {
            eprintln!("Failed to init logging. {e}");
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut stdout = io::stdout();
    let outcome = match run_session(io::stdin().lock(), &mut stdout) {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("{err:#}");
            eprintln!("\nERROR: {err}");
            return ExitCode::from(exit_status_for(&err));
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&outcome.report) {
            Ok(json) => println!("{json}"),
            Err(err) => {
                error!("failed to serialize report: {err}");
                return ExitCode::from(2);
            }
        }
    }

    if !cli.no_plot {
        info!("Launching chart");
        if let Err(err) = VelocityChart::from_output(&outcome.output).run() {
            error!("chart window failed: {err}");
            eprintln!("\nERROR: could not open the chart window: {err}");
            return ExitCode::from(2);
        }
    }

    ExitCode::SUCCESS
}
