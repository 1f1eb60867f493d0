use serde::Serialize;

use crate::model::release::InstalledState;
use crate::model::version::Version;

/// Where the package manager stands relative to the target version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InstallState {
    Absent,
    Current,
    Outdated,
    Updating,
    Failed,
}

impl InstallState {
    pub fn assess(installed: &InstalledState, target: &Version) -> Self {
        match &installed.version {
            None => InstallState::Absent,
            Some(version) if version >= target => InstallState::Current,
            Some(_) => InstallState::Outdated,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationPath {
    /// Download the bundle and provision it directly.
    SideLoad,
    /// Ask the store to update the already-installed package.
    StoreUpdate,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub initial: InstallState,
    pub outcome: InstallState,
    pub latest: Version,
    pub target: Version,
    pub installed_before: Option<Version>,
    pub installed_after: Option<Version>,
    pub path: Option<RemediationPath>,
    pub failure: Option<String>,
}

impl ReconcileReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == InstallState::Current
    }
}

/// Read-only view used by `status`.
#[derive(Debug, Clone, Serialize)]
pub struct Assessment {
    pub state: InstallState,
    pub installed: InstalledState,
    pub latest: Version,
    pub artifact_uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn installed(v: Option<&str>) -> InstalledState {
        InstalledState::from_inventory(v.map(|v| v.parse().unwrap()))
    }

    #[test]
    fn assessment_covers_each_initial_state() {
        let target: Version = "1.7.10861".parse().unwrap();
        assert_eq!(InstallState::assess(&installed(None), &target), InstallState::Absent);
        assert_eq!(
            InstallState::assess(&installed(Some("1.6.3482")), &target),
            InstallState::Outdated
        );
        assert_eq!(
            InstallState::assess(&installed(Some("1.7.10861.0")), &target),
            InstallState::Current
        );
        assert_eq!(
            InstallState::assess(&installed(Some("1.22.10861.0")), &target),
            InstallState::Current
        );
    }
}
