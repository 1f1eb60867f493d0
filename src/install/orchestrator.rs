use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::artifact::{ScratchFile, file_name_from_url};
use super::poll::{BoundedPoll, PollOutcome};
use super::state::{Assessment, InstallState, ReconcileReport, RemediationPath};
use crate::model::config::AgentConfig;
use crate::model::release::{InstalledState, ReleaseInfo};
use crate::model::version::Version;
use crate::net::{Transport, TransportError};
use crate::platform::{Platform, PlatformError};
use crate::release::{ReleaseError, ReleaseResolver};
use crate::settings::{PolicyBackend, SettingsError, SettingsStore};

/// Store auto-download policy value that turns automatic updates off.
pub const STORE_AUTO_DOWNLOAD_DISABLED: u32 = 2;
/// Store auto-download policy value that turns automatic updates on.
pub const STORE_AUTO_DOWNLOAD_ENABLED: u32 = 4;

/// Reasons a reconcile cannot even start. Remediation failures are not
/// errors; they end up in [`ReconcileReport::failure`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(transparent)]
    Upstream(#[from] ReleaseError),
    #[error("cannot read package inventory: {0}")]
    Inventory(#[from] PlatformError),
}

#[derive(Debug, Error)]
enum RemediationError {
    #[error("preparing working directory: {0}")]
    WorkDir(#[from] io::Error),
    #[error(transparent)]
    Download(#[from] TransportError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Version to reach; the latest release when `None`.
    pub target: Option<Version>,
    pub wait_budget: Duration,
    /// Stop running package-manager processes before a store update.
    pub stop_processes: bool,
}

pub struct InstallOrchestrator<'a, P, T, B> {
    platform: &'a P,
    transport: &'a T,
    settings: &'a mut SettingsStore<B>,
    resolver: ReleaseResolver<'a, T>,
    package: &'a str,
    processes: &'a [String],
    work_dir: PathBuf,
    poll_interval: Duration,
    sleeper: fn(Duration),
}

impl<'a, P, T, B> InstallOrchestrator<'a, P, T, B>
where
    P: Platform,
    T: Transport,
    B: PolicyBackend,
{
    pub fn new(
        platform: &'a P,
        transport: &'a T,
        settings: &'a mut SettingsStore<B>,
        config: &'a AgentConfig,
    ) -> Self {
        Self {
            platform,
            transport,
            settings,
            resolver: ReleaseResolver::new(
                transport,
                &config.feed.url,
                &config.feed.artifact_extension,
            ),
            package: &config.install.package_name,
            processes: &config.install.processes,
            work_dir: config.work_dir(),
            poll_interval: config.poll_interval(),
            sleeper: std::thread::sleep,
        }
    }

    pub fn with_sleeper(mut self, sleeper: fn(Duration)) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn installed_state(&self) -> Result<InstalledState, PlatformError> {
        let version = self.platform.installed_package_version(self.package)?;
        Ok(InstalledState::from_inventory(version))
    }

    /// Compare the local install against the latest release without
    /// changing anything.
    pub fn assess(&self) -> Result<Assessment, ReconcileError> {
        let latest = self.resolver.resolve_latest()?;
        let installed = self.installed_state()?;
        Ok(Assessment {
            state: InstallState::assess(&installed, &latest.version),
            installed,
            latest: latest.version,
            artifact_uri: latest.artifact_uri,
        })
    }

    /// Bring the package manager to the target version.
    pub fn reconcile(&mut self, options: &ReconcileOptions) -> Result<ReconcileReport, ReconcileError> {
        let latest = self.resolver.resolve_latest()?;
        let target = options
            .target
            .clone()
            .unwrap_or_else(|| latest.version.clone());
        let installed = self.installed_state()?;
        let initial = InstallState::assess(&installed, &target);

        let mut report = ReconcileReport {
            initial,
            outcome: initial,
            latest: latest.version.clone(),
            target: target.clone(),
            installed_before: installed.version.clone(),
            installed_after: installed.version.clone(),
            path: None,
            failure: None,
        };

        let path = match initial {
            InstallState::Current => {
                tracing::info!(
                    "{} {} is current (target {target})",
                    self.package,
                    installed.version.as_ref().map(ToString::to_string).unwrap_or_default()
                );
                return Ok(report);
            }
            InstallState::Absent => RemediationPath::SideLoad,
            _ => RemediationPath::StoreUpdate,
        };
        report.path = Some(path);
        report.outcome = InstallState::Updating;
        tracing::info!(
            "{}: {initial:?} -> {:?} via {path:?} (target {target})",
            self.package,
            report.outcome
        );

        let remediation = match path {
            RemediationPath::SideLoad => self.side_load(&latest),
            RemediationPath::StoreUpdate => self.store_update(options.stop_processes),
        };
        if let Err(err) = remediation {
            tracing::error!("{}: {path:?} failed: {err}", self.package);
            report.outcome = InstallState::Failed;
            report.failure = Some(err.to_string());
            return Ok(report);
        }

        let (outcome, observed) = self.wait_for(&target, options.wait_budget);
        report.outcome = outcome;
        report.installed_after = observed;
        if outcome == InstallState::Failed {
            report.failure = Some(format!(
                "{} did not reach {target} within {}s",
                self.package,
                options.wait_budget.as_secs()
            ));
            tracing::warn!("{}: Updating -> Failed (timed out)", self.package);
        } else {
            tracing::info!("{}: Updating -> Current", self.package);
        }
        Ok(report)
    }

    fn side_load(&self, release: &ReleaseInfo) -> Result<(), RemediationError> {
        let name = file_name_from_url(&release.artifact_uri, "DesktopAppInstaller.msixbundle");
        let bundle = ScratchFile::reserve(&self.work_dir, &name)?;
        self.transport.download(&release.artifact_uri, bundle.path())?;
        tracing::info!("provisioning {}", bundle.path().display());
        self.platform.provision_package(bundle.path())?;
        Ok(())
    }

    fn store_update(&mut self, stop_processes: bool) -> Result<(), RemediationError> {
        if stop_processes {
            tracing::info!("stopping {}", self.processes.join(", "));
            self.platform.stop_processes(self.processes)?;
        }
        self.allow_store_updates()?;
        tracing::info!("requesting store update scan");
        self.platform.request_store_update_scan()?;
        Ok(())
    }

    /// Lift a policy that blocks store updates, capturing its value first.
    fn allow_store_updates(&mut self) -> Result<(), RemediationError> {
        let current = self.platform.store_auto_download()?;
        if current != Some(STORE_AUTO_DOWNLOAD_DISABLED) {
            return Ok(());
        }
        self.settings.preserve_original(STORE_AUTO_DOWNLOAD_DISABLED)?;
        self.platform
            .set_store_auto_download(STORE_AUTO_DOWNLOAD_ENABLED)?;
        tracing::info!("store auto-download policy overridden");
        Ok(())
    }

    fn wait_for(&self, target: &Version, budget: Duration) -> (InstallState, Option<Version>) {
        let poll = BoundedPoll::new(self.poll_interval, budget);
        tracing::info!(
            "waiting for {target}: up to {} checks {}s apart",
            poll.max_sleeps().saturating_add(1),
            self.poll_interval.as_secs()
        );
        let mut observed = None;
        let outcome = poll.run(
            || match self.platform.installed_package_version(self.package) {
                Ok(version) => {
                    let reached = version.as_ref().is_some_and(|v| v >= target);
                    observed = version;
                    reached
                }
                Err(err) => {
                    tracing::warn!("inventory query failed while waiting: {err}");
                    false
                }
            },
            self.sleeper,
        );

        match outcome {
            PollOutcome::Reached { waited } => {
                tracing::debug!("target observed after {}s", waited.as_secs());
                (InstallState::Current, observed)
            }
            PollOutcome::TimedOut { waited } => {
                tracing::warn!("{target} not observed after {}s", waited.as_secs());
                (InstallState::Failed, observed)
            }
        }
    }
}

/// Write the captured store policy back and forget it. Returns the restored
/// value, if one had been captured.
pub fn restore_store_policy<P: Platform, B: PolicyBackend>(
    platform: &P,
    settings: &mut SettingsStore<B>,
) -> anyhow::Result<Option<u32>> {
    let Some(original) = settings.original_store_value()? else {
        tracing::info!("no captured store policy to restore");
        return Ok(None);
    };
    platform.set_store_auto_download(original)?;
    settings.clear_original()?;
    tracing::info!("store auto-download policy restored to {original}");
    Ok(Some(original))
}
