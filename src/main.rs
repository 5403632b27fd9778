//! Remote Exec - run programs on playground devices from the command line
//!
//! This is the binary entry point. All logic lives in the library.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use rexec_core::WorkspaceLocation;
use tracing::{error, warn};

/// Remote Exec - run programs on playground devices
#[derive(Parser, Debug)]
#[command(name = "rexec")]
#[command(about = "Run programs on remote playground devices", long_about = None)]
struct Args {
    /// Project directory holding `.rexec/config.toml`
    #[arg(long, value_name = "PATH", global = true)]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List devices available to the authenticated user
    Devices,

    /// Compile a program and run it on a device
    Run {
        /// Device id as listed by `rexec devices`
        #[arg(long)]
        device: i64,

        /// Workspace the session is bound to (defaults to the configured one)
        #[arg(long)]
        workspace: Option<WorkspaceLocation>,

        /// Milliseconds to wait for the device to finish
        #[arg(long, default_value_t = 30_000)]
        wait_ms: u64,

        /// Program source file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Write a default `.rexec/config.toml`
    Init,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();

    // Logging goes to a file; stdout is reserved for JSON events.
    if let Err(e) = rexec_core::logging::init() {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let project = args
        .project
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let result = match args.command {
        Command::Devices => remote_exec::run_devices(&project).await,
        Command::Run {
            device,
            workspace,
            wait_ms,
            file,
        } => {
            let program = std::fs::read_to_string(&file)?;
            if program.trim().is_empty() {
                warn!("{} is empty", file.display());
            }
            remote_exec::run_program(
                &project,
                remote_exec::RunRequest {
                    device_id: device,
                    workspace,
                    program,
                    wait: Duration::from_millis(wait_ms),
                },
            )
            .await
        }
        Command::Init => rexec_app::config::init_config_dir(&project),
    };

    if let Err(e) = &result {
        error!("rexec failed: {}", e);
        if let Ok(log_file) = rexec_core::logging::get_current_log_file() {
            eprintln!("Details in {}", log_file.display());
        }
    }
    Ok(result?)
}
