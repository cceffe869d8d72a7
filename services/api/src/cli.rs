use crate::infra::audit_seed;
use crate::server;
use clap::{Args, Parser, Subcommand};
use hostel_desk::error::AppError;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "Hostel Desk",
    about = "Run the hostel room desk or audit a hostel snapshot from the command line",
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
    /// Check a hostel snapshot for rooms whose occupied flag disagrees with the ledger
    Audit(AuditArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override HOSTEL_SEED_PATH for this run
    #[arg(long)]
    pub(crate) seed: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct AuditArgs {
    /// JSON snapshot to audit
    #[arg(long)]
    pub(crate) seed: PathBuf,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Audit(args) => run_audit(args),
    }
}

fn run_audit(args: AuditArgs) -> Result<(), AppError> {
    let report = audit_seed(&args.seed)?;

    println!("Rooms checked: {}", report.rooms_checked);
    println!("Allotments checked: {}", report.allotments_checked);
    if report.is_consistent() {
        println!("No occupancy violations found.");
        return Ok(());
    }

    println!("Violations:");
    for violation in &report.violations {
        println!("- {violation}");
    }
    Err(AppError::Seed(hostel_desk::hostel::SeedError::Inconsistent(
        report,
    )))
}
