use std::path::Path;
use std::process::Command;

use super::{Arch, Platform, PlatformError};
use crate::model::version::{Version, VersionError};

const STORE_POLICY_KEY: &str = r"HKLM:\SOFTWARE\Policies\Microsoft\WindowsStore";
const STORE_POLICY_VALUE: &str = "AutoDownload";

const UNINSTALL_KEYS: [&str; 2] = [
    r"HKLM:\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\*",
    r"HKLM:\SOFTWARE\WOW6432Node\Microsoft\Windows\CurrentVersion\Uninstall\*",
];

/// [`Platform`] backed by Windows PowerShell.
#[derive(Debug, Clone)]
pub struct PowerShell {
    executable: String,
}

impl Default for PowerShell {
    fn default() -> Self {
        Self {
            executable: "powershell.exe".to_string(),
        }
    }
}

impl PowerShell {
    fn run(&self, action: &str, script: &str) -> Result<String, PlatformError> {
        tracing::debug!("{action}: {script}");
        let output = Command::new(&self.executable)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
                script,
            ])
            .output()
            .map_err(|source| PlatformError::Spawn {
                program: self.executable.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(PlatformError::Command {
                action: action.to_string(),
                status: output.status.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Platform for PowerShell {
    fn os_build(&self) -> Result<u32, PlatformError> {
        let action = "query OS build";
        let out = self.run(action, "[System.Environment]::OSVersion.Version.Build")?;
        out.parse().map_err(|_| PlatformError::Parse {
            action: action.to_string(),
            output: out,
        })
    }

    fn architecture(&self) -> Arch {
        Arch::current()
    }

    fn installed_programs(&self) -> Result<Vec<String>, PlatformError> {
        let paths = UNINSTALL_KEYS
            .iter()
            .map(|key| quote(key))
            .collect::<Vec<_>>()
            .join(", ");
        let script = format!(
            "Get-ItemProperty {paths} -ErrorAction SilentlyContinue | \
             Where-Object {{ $_.DisplayName }} | \
             Select-Object -ExpandProperty DisplayName"
        );
        let out = self.run("list installed programs", &script)?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn installed_package_version(&self, package: &str) -> Result<Option<Version>, PlatformError> {
        let action = "query package inventory";
        let script = format!(
            "Get-AppxPackage -AllUsers -Name {} | Select-Object -ExpandProperty Version",
            quote(package)
        );
        let out = self.run(action, &script)?;
        newest_version(&out).map_err(|_| PlatformError::Parse {
            action: action.to_string(),
            output: out,
        })
    }

    fn provision_package(&self, bundle: &Path) -> Result<(), PlatformError> {
        let script = format!(
            "Add-AppxProvisionedPackage -Online -PackagePath {} -SkipLicense | Out-Null",
            quote(&bundle.to_string_lossy())
        );
        self.run("provision package", &script).map(drop)
    }

    fn run_silent(&self, program: &Path, args: &[String]) -> Result<(), PlatformError> {
        let program_name = program.display().to_string();
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|source| PlatformError::Spawn {
                program: program_name.clone(),
                source,
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::Command {
                action: format!("run {program_name}"),
                status: status.to_string(),
                detail: String::new(),
            })
        }
    }

    fn stop_processes(&self, names: &[String]) -> Result<(), PlatformError> {
        if names.is_empty() {
            return Ok(());
        }
        let list = names
            .iter()
            .map(|name| quote(name))
            .collect::<Vec<_>>()
            .join(", ");
        let script = format!("Stop-Process -Name {list} -Force -ErrorAction SilentlyContinue");
        self.run("stop processes", &script).map(drop)
    }

    fn request_store_update_scan(&self) -> Result<(), PlatformError> {
        let script = "Get-CimInstance -Namespace 'Root\\cimv2\\mdm\\dmmap' \
                      -ClassName 'MDM_EnterpriseModernAppManagement_AppManagement01' | \
                      Invoke-CimMethod -MethodName UpdateScanMethod | Out-Null";
        self.run("request store update scan", script).map(drop)
    }

    fn store_auto_download(&self) -> Result<Option<u32>, PlatformError> {
        let action = "read store policy";
        let script = format!(
            "Get-ItemProperty -Path {} -Name {} -ErrorAction SilentlyContinue | \
             Select-Object -ExpandProperty {}",
            quote(STORE_POLICY_KEY),
            STORE_POLICY_VALUE,
            STORE_POLICY_VALUE
        );
        let out = self.run(action, &script)?;
        if out.is_empty() {
            return Ok(None);
        }
        out.parse().map(Some).map_err(|_| PlatformError::Parse {
            action: action.to_string(),
            output: out,
        })
    }

    fn set_store_auto_download(&self, value: u32) -> Result<(), PlatformError> {
        let script = format!(
            "New-Item -Path {key} -Force | Out-Null; \
             New-ItemProperty -Path {key} -Name {name} -Value {value} -PropertyType DWord -Force | Out-Null",
            key = quote(STORE_POLICY_KEY),
            name = STORE_POLICY_VALUE,
        );
        self.run("write store policy", &script).map(drop)
    }

    fn is_system_context(&self) -> bool {
        std::env::var("USERNAME")
            .map(|user| user.eq_ignore_ascii_case("SYSTEM") || user.ends_with('$'))
            .unwrap_or(false)
    }
}

/// Single-quoted PowerShell literal.
fn quote(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

/// Highest version among the inventory lines. Several builds can be
/// registered for different users.
fn newest_version(output: &str) -> Result<Option<Version>, VersionError> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::parse::<Version>)
        .try_fold(None, |newest: Option<Version>, version| {
            let version = version?;
            Ok(Some(match newest {
                Some(newest) if newest >= version => newest,
                _ => version,
            }))
        })
}
