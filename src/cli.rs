use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "winget-warden",
    version,
    about = "Keeps winget installed and current on this machine"
)]
pub struct Cli {
    #[arg(long, global = true, help = "Machine config file (TOML)")]
    pub config: Option<PathBuf>,
    #[arg(long, global = true, help = "Output machine-readable JSON")]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check prerequisites, then install or update winget.
    Run {
        #[arg(long, help = "Version to reach instead of the latest release")]
        target: Option<String>,
        #[arg(long, help = "Minutes to wait for the update to land")]
        wait_minutes: Option<u64>,
        #[arg(long, default_value_t = false)]
        stop_processes: bool,
        #[arg(long, default_value_t = false)]
        skip_prerequisites: bool,
    },
    /// Compare the installed version with the latest release.
    Status,
    /// Verify OS build and runtime redistributable.
    Prerequisites,
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
    Scope {
        #[command(subcommand)]
        command: ScopeCommands,
    },
    /// Print the scheduled task definitions for the current policy.
    Schedule {
        #[arg(long, help = "Daily, Every2Days, Weekly, Every2Weeks or Monthly")]
        interval: Option<String>,
        #[arg(long, help = "Time of day, HH:MM")]
        time: Option<String>,
        #[arg(long)]
        logon: Option<bool>,
    },
    /// Put back the store policy captured before it was overridden.
    Restore,
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommands {
    Get { key: String },
    /// Write one or more Key=Value pairs.
    Set {
        #[arg(required = true)]
        assignments: Vec<String>,
    },
    Show,
}

#[derive(Subcommand, Debug)]
pub enum ScopeCommands {
    /// Make machine the default install scope in the settings document.
    Apply {
        #[arg(long, value_enum)]
        context: Option<ExecutionContext>,
        #[arg(long, help = "Settings document to edit instead of the context default")]
        path: Option<PathBuf>,
        #[arg(long, help = "Also require machine scope (defaults to MachineScopeOnly)")]
        machine_only: Option<bool>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ExecutionContext {
    System,
    User,
}
