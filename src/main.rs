//! jvmhost CLI entry point.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod cli;

/// jvmhost - embed and manage a JVM from a host process
#[derive(Parser, Debug)]
#[command(name = "jvmhost")]
#[command(about = "Boot and inspect a managed VM across interchangeable backends")]
#[command(
    long_about = "jvmhost boots a managed VM inside the calling process, respecting the VM's \
irreversible startup semantics.\n\n\
Quick start:\n  \
jvmhost which\n  \
jvmhost props --backend hotspot\n  \
jvmhost classes /opt/app/index.jar"
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch a backend's default properties via a disposable child-process VM
    Props(cli::PropsCmd),

    /// Print the VM library the selected backend would boot
    Which(cli::WhichCmd),

    /// List the classes contained in a jar
    Classes(cli::ClassesCmd),

    /// Negotiation worker mode (spawned by `props`, not typed by hand)
    #[command(hide = true)]
    PropsWorker(cli::PropsWorkerCmd),
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging based on RUST_LOG or default to warn
    init_logging();

    tracing::debug!(version = jvmhost::VERSION, "starting jvmhost");

    // Execute command
    let result = match cli.command {
        Commands::Props(cmd) => cmd.run(),
        Commands::Which(cmd) => cmd.run(),
        Commands::Classes(cmd) => cmd.run(),
        Commands::PropsWorker(cmd) => cmd.run(),
    };

    // Handle errors
    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Initialize the tracing subscriber.
///
/// Logs go to stderr unconditionally: in worker mode stdout carries the
/// negotiation payload.
fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jvmhost=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
