mod config;
mod core_router;
mod error;
mod ipam;
mod models;
mod nms;
mod notify;
mod ping;
mod provision;
mod render;
mod session;
mod telco;
mod utils;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use config::Config;
use error::ProvisionError;
use models::TelcoPort;

#[derive(Parser)]
#[command(name = "telco-provision", version, about = "Provision a Telco 280 for a new customer circuit")]
struct Cli {
    /// Directory holding CONFIG_PARAMETERS.json (overrides PARAMS_DIR)
    #[arg(long, global = true)]
    params_dir: Option<String>,

    /// Config template (overrides TEMPLATE_PATH)
    #[arg(long, global = true)]
    template: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Configure the core port and the Telco, then update IPAM and notify engineering
    Provision,
    /// Reserve a mgmt /30 in IPAM for a Telco being inventoried
    Reserve {
        #[arg(long)]
        inventory_number: String,
    },
    /// Print the rendered config for a given uplink without touching any device
    Render {
        #[arg(long)]
        uplink: TelcoPort,
        #[arg(long, default_value = "")]
        snmp_location: String,
    },
}

/// Console plus run-log file. The guard must live until exit so buffered lines are flushed.
fn init_tracing(log_file: &str) -> Option<WorkerGuard> {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "telco_provision=debug".into())
    };
    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(filter());

    let path = Path::new(log_file);
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
    let file_name = path.file_name().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("log.txt"));

    match std::fs::create_dir_all(dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            tracing_subscriber::registry().with(console).with(file).init();
            Some(guard)
        }
        Err(e) => {
            tracing_subscriber::registry().with(console).init();
            tracing::warn!("Cannot create log directory {}: {}, logging to console only", dir.display(), e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut cfg = Config::load();
    let cli = Cli::parse();
    if let Some(dir) = cli.params_dir {
        cfg.params_dir = dir;
    }
    if let Some(template) = cli.template {
        cfg.template_path = template;
    }

    let _guard = init_tracing(&cfg.log_file);

    let result = match cli.command.unwrap_or(Command::Provision) {
        Command::Provision => provision(&cfg).await,
        Command::Reserve { inventory_number } => reserve(&cfg, &inventory_number).await,
        Command::Render { uplink, snmp_location } => render(&cfg, uplink, &snmp_location),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}. {}", capitalize(&e.to_string()), e.hint());
            tracing::error!(category = ?e.category(), "Exiting: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn provision(cfg: &Config) -> Result<(), ProvisionError> {
    tracing::info!("Starting Telco provisioning with parameters from {}", cfg.params_path().display());
    let report =
        provision::run_provision(cfg, &cfg.params_path(), Path::new(&cfg.template_path)).await?;

    println!(
        "{} is provisioned behind {} (mgmt {}, uplink {}). Updated {} IPAM records.",
        report.telco.plan.hostname, report.core_port, report.mgmt.telco, report.telco.uplink, report.relabelled
    );
    Ok(())
}

async fn reserve(cfg: &Config, inventory_number: &str) -> Result<(), ProvisionError> {
    let block = provision::run_reserve(cfg, inventory_number).await?;
    println!("Reserved mgmt block {}/30 for inventory number {}", block.base, inventory_number);
    println!("Telco mgmt IP: {}", block.mgmt.telco);
    println!("Core gateway IP: {}", block.mgmt.gateway);
    Ok(())
}

fn render(cfg: &Config, uplink: TelcoPort, snmp_location: &str) -> Result<(), ProvisionError> {
    let config = provision::run_render(
        &cfg.params_path(),
        Path::new(&cfg.template_path),
        uplink,
        snmp_location,
    )?;
    println!("{}", config);
    Ok(())
}

fn capitalize(message: &str) -> String {
    let mut chars = message.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
