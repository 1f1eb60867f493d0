//! Operating-system side effects behind one trait, so the engine can be
//! driven against a scripted fake in tests.

pub mod powershell;

use std::fmt;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::model::version::Version;

pub use powershell::PowerShell;

#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{action} failed ({status}): {detail}")]
    Command {
        action: String,
        status: String,
        detail: String,
    },
    #[error("unexpected output from {action}: {output:?}")]
    Parse { action: String, output: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X64,
    X86,
    Arm64,
}

impl Arch {
    pub fn current() -> Self {
        match std::env::consts::ARCH {
            "aarch64" => Arch::Arm64,
            "x86" => Arch::X86,
            _ => Arch::X64,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Arch::X64 => "x64",
            Arch::X86 => "x86",
            Arch::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

pub trait Platform {
    fn os_build(&self) -> Result<u32, PlatformError>;

    fn architecture(&self) -> Arch;

    /// Display names from the installed-programs records.
    fn installed_programs(&self) -> Result<Vec<String>, PlatformError>;

    /// Version of the named package in the local inventory, if installed.
    fn installed_package_version(&self, package: &str) -> Result<Option<Version>, PlatformError>;

    /// Provision a downloaded bundle machine-wide.
    fn provision_package(&self, bundle: &Path) -> Result<(), PlatformError>;

    /// Run an installer executable and require a zero exit status.
    fn run_silent(&self, program: &Path, args: &[String]) -> Result<(), PlatformError>;

    fn stop_processes(&self, names: &[String]) -> Result<(), PlatformError>;

    /// Ask the enterprise app-management bridge to scan for store updates.
    fn request_store_update_scan(&self) -> Result<(), PlatformError>;

    /// Current store auto-download policy value, if the policy is set.
    fn store_auto_download(&self) -> Result<Option<u32>, PlatformError>;

    /// Write the store auto-download policy value.
    fn set_store_auto_download(&self, value: u32) -> Result<(), PlatformError>;

    /// Whether the process runs as the local system account.
    fn is_system_context(&self) -> bool;
}
