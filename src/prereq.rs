use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::install::artifact::{ScratchFile, file_name_from_url};
use crate::model::config::PrerequisiteConfig;
use crate::net::Transport;
use crate::platform::{Arch, Platform, PlatformError};

/// Any of these ends the process with a non-zero status.
#[derive(Debug, Error)]
pub enum PrereqError {
    #[error("OS build {found} is older than the minimum supported build {minimum}")]
    UnsupportedBuild { found: u32, minimum: u32 },
    #[error("runtime redistributable install failed: {0}")]
    RuntimeInstallFailed(String),
    #[error("invalid runtime pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error(transparent)]
    Platform(#[from] PlatformError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "name", rename_all = "snake_case")]
pub enum RuntimeStatus {
    Present(String),
    Installed,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrereqReport {
    pub os_build: u32,
    pub runtime: RuntimeStatus,
}

pub struct PrerequisiteChecker<'a, P, T> {
    platform: &'a P,
    transport: &'a T,
    config: &'a PrerequisiteConfig,
    work_dir: &'a std::path::Path,
}

impl<'a, P: Platform, T: Transport> PrerequisiteChecker<'a, P, T> {
    pub fn new(
        platform: &'a P,
        transport: &'a T,
        config: &'a PrerequisiteConfig,
        work_dir: &'a std::path::Path,
    ) -> Self {
        Self {
            platform,
            transport,
            config,
            work_dir,
        }
    }

    /// OS build first, then the runtime redistributable (installing it when
    /// missing).
    pub fn check(&self) -> Result<PrereqReport, PrereqError> {
        let os_build = self.platform.os_build()?;
        if os_build < self.config.min_os_build {
            return Err(PrereqError::UnsupportedBuild {
                found: os_build,
                minimum: self.config.min_os_build,
            });
        }
        tracing::info!("OS build {os_build} is supported");

        let arch = self.platform.architecture();
        let programs = self.platform.installed_programs()?;
        let runtime = match find_runtime(&programs, &self.config.runtime_patterns, arch)? {
            Some(name) => {
                tracing::info!("runtime present: {name}");
                RuntimeStatus::Present(name)
            }
            None => {
                self.install_runtime(arch)?;
                RuntimeStatus::Installed
            }
        };

        Ok(PrereqReport { os_build, runtime })
    }

    fn install_runtime(&self, arch: Arch) -> Result<(), PrereqError> {
        let url = self
            .config
            .runtime_installer_url
            .replace("{arch}", arch.label());
        tracing::warn!("runtime redistributable ({arch}) missing, installing from {url}");

        let name = file_name_from_url(&url, &format!("VC_redist.{arch}.exe"));
        let installer = ScratchFile::reserve(self.work_dir, &name)
            .map_err(|err| PrereqError::RuntimeInstallFailed(err.to_string()))?;
        self.transport
            .download(&url, installer.path())
            .map_err(|err| PrereqError::RuntimeInstallFailed(err.to_string()))?;
        self.platform
            .run_silent(installer.path(), &self.config.installer_args)
            .map_err(|err| PrereqError::RuntimeInstallFailed(err.to_string()))?;

        tracing::info!("runtime redistributable ({arch}) installed");
        Ok(())
    }
}

/// First installed program matching one of `patterns` (`{arch}` substituted).
pub fn find_runtime(
    programs: &[String],
    patterns: &[String],
    arch: Arch,
) -> Result<Option<String>, PrereqError> {
    let compiled = patterns
        .iter()
        .map(|pattern| {
            let pattern = pattern.replace("{arch}", arch.label());
            Regex::new(&pattern).map_err(|source| PrereqError::Pattern { pattern, source })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(programs
        .iter()
        .find(|name| compiled.iter().any(|re| re.is_match(name)))
        .cloned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::config::AgentConfig;
    use crate::testing::{FakePlatform, StaticTransport};

    fn config() -> PrerequisiteConfig {
        AgentConfig::load_defaults().prerequisites
    }

    #[test]
    fn default_patterns_match_the_2015_2022_redistributable() {
        let programs = vec![
            "7-Zip 23.01 (x64)".to_string(),
            "Microsoft Visual C++ 2015-2022 Redistributable (x64) - 14.38.33130".to_string(),
        ];
        let found = find_runtime(&programs, &config().runtime_patterns, Arch::X64).unwrap();
        assert_eq!(found.as_deref(), Some(programs[1].as_str()));

        let none = find_runtime(&programs, &config().runtime_patterns, Arch::X86).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn old_build_is_fatal_without_remediation() {
        let platform = FakePlatform::with_build(17134);
        let transport = StaticTransport::default();
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let checker = PrerequisiteChecker::new(&platform, &transport, &config, dir.path());

        let err = checker.check().unwrap_err();
        assert!(matches!(
            err,
            PrereqError::UnsupportedBuild {
                found: 17134,
                minimum: 17763
            }
        ));
        assert!(transport.downloads().is_empty());
        assert!(platform.calls().is_empty());
    }

    #[test]
    fn present_runtime_needs_no_download() {
        let platform = FakePlatform::with_build(19045)
            .with_program("Microsoft Visual C++ 2015-2022 Redistributable (x64) - 14.38.33130");
        let transport = StaticTransport::default();
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let checker = PrerequisiteChecker::new(&platform, &transport, &config, dir.path());

        let report = checker.check().unwrap();
        assert_eq!(report.os_build, 19045);
        assert!(matches!(report.runtime, RuntimeStatus::Present(_)));
        assert!(transport.downloads().is_empty());
    }

    #[test]
    fn missing_runtime_is_downloaded_installed_and_removed() {
        let platform = FakePlatform::with_build(19045);
        let transport = StaticTransport::default();
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("prereq");
        let config = config();
        let checker = PrerequisiteChecker::new(&platform, &transport, &config, &work);

        let report = checker.check().unwrap();
        assert_eq!(report.runtime, RuntimeStatus::Installed);
        assert_eq!(
            transport.downloads(),
            vec!["https://aka.ms/vs/17/release/VC_redist.x64.exe".to_string()]
        );
        assert_eq!(
            platform.calls(),
            vec!["run_silent VC_redist.x64.exe /quiet /norestart".to_string()]
        );
        assert!(!work.join("VC_redist.x64.exe").exists());
    }

    #[test]
    fn failing_runtime_installer_is_fatal() {
        let platform = FakePlatform::with_build(19045).failing("run_silent");
        let transport = StaticTransport::default();
        let dir = tempfile::tempdir().unwrap();
        let config = config();
        let checker = PrerequisiteChecker::new(&platform, &transport, &config, dir.path());

        assert!(matches!(
            checker.check(),
            Err(PrereqError::RuntimeInstallFailed(_))
        ));
        assert!(!dir.path().join("VC_redist.x64.exe").exists());
    }
}
