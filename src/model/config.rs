use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

static ENV_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%([A-Za-z_][A-Za-z0-9_()]*)%").expect("valid env reference regex"));

#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    pub feed: FeedConfig,
    pub install: InstallConfig,
    pub prerequisites: PrerequisiteConfig,
    pub settings: SettingsConfig,
    pub scope: ScopeDocumentConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    pub url: String,
    pub artifact_extension: String,
    pub user_agent: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InstallConfig {
    pub package_name: String,
    pub work_dir: String,
    pub poll_interval_secs: u64,
    pub wait_budget_secs: u64,
    pub processes: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrerequisiteConfig {
    pub min_os_build: u32,
    pub runtime_patterns: Vec<String>,
    pub runtime_installer_url: String,
    pub installer_args: Vec<String>,
    pub work_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SettingsConfig {
    pub policy_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScopeDocumentConfig {
    pub system_document: String,
    pub user_document: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub directory: String,
    pub filter: String,
}

impl AgentConfig {
    /// Load configuration with layering: embedded defaults, then the machine
    /// config file (explicit path, or the platform config dir if present).
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let defaults = include_str!("../../config/default.toml");
        let mut table: toml::Table = toml::from_str(defaults)?;

        let override_path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => project_dirs()
                .map(|dirs| dirs.config_dir().join("config.toml"))
                .filter(|path| path.exists()),
        };

        if let Some(path) = override_path {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            let overlay: toml::Table = toml::from_str(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?;
            merge_tables(&mut table, overlay);
            tracing::debug!("loaded machine config from {}", path.display());
        }

        Ok(toml::Value::Table(table).try_into()?)
    }

    #[cfg(test)]
    pub fn load_defaults() -> Self {
        toml::from_str(include_str!("../../config/default.toml")).expect("valid default config")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.install.poll_interval_secs)
    }

    pub fn wait_budget(&self) -> Duration {
        Duration::from_secs(self.install.wait_budget_secs)
    }

    pub fn feed_timeout(&self) -> Duration {
        Duration::from_secs(self.feed.timeout_secs)
    }

    pub fn policy_file(&self) -> PathBuf {
        resolve_or_data_dir(&self.settings.policy_file, "policy.toml")
    }

    pub fn work_dir(&self) -> PathBuf {
        resolve_or_data_dir(&self.install.work_dir, "artifacts")
    }

    pub fn prerequisite_dir(&self) -> PathBuf {
        resolve_or_data_dir(&self.prerequisites.work_dir, "prerequisites")
    }

    pub fn log_dir(&self) -> PathBuf {
        resolve_or_data_dir(&self.logging.directory, "logs")
    }

    pub fn scope_document(&self, system_context: bool) -> Result<PathBuf> {
        let raw = if system_context {
            &self.scope.system_document
        } else {
            &self.scope.user_document
        };
        expand_env(raw)
            .map(PathBuf::from)
            .ok_or_else(|| anyhow!("cannot resolve scope document path {raw}"))
    }
}

/// Expand `%VAR%` references. `None` when any referenced variable is unset.
pub fn expand_env(raw: &str) -> Option<String> {
    let mut missing = false;
    let expanded = ENV_REF_RE.replace_all(raw, |caps: &regex::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(value) => value,
            Err(_) => {
                missing = true;
                String::new()
            }
        }
    });
    if missing {
        None
    } else {
        Some(expanded.into_owned())
    }
}

fn resolve_or_data_dir(raw: &str, leaf: &str) -> PathBuf {
    if !raw.trim().is_empty() {
        if let Some(path) = expand_env(raw) {
            return PathBuf::from(path);
        }
    }

    project_dirs()
        .map(|dirs| dirs.data_dir().join(leaf))
        .unwrap_or_else(|| std::env::temp_dir().join("winget-warden").join(leaf))
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "winget-warden")
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_without_machine_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.toml");
        fs::write(&path, "").unwrap();

        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.feed.artifact_extension, ".msixbundle");
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.wait_budget(), Duration::from_secs(600));
        assert_eq!(config.prerequisites.min_os_build, 17763);
    }

    #[test]
    fn machine_file_overrides_single_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[install]\nwait_budget_secs = 120\n").unwrap();

        let config = AgentConfig::load(Some(&path)).unwrap();
        assert_eq!(config.wait_budget(), Duration::from_secs(120));
        assert_eq!(config.install.package_name, "Microsoft.DesktopAppInstaller");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AgentConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn env_references_expand_or_report_missing() {
        let (name, value) = std::env::vars()
            .find(|(name, _)| {
                name.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_')
                    && name.chars().next().is_some_and(|c| !c.is_ascii_digit())
            })
            .unwrap();
        assert_eq!(
            expand_env(&format!("%{name}%\\x")).unwrap(),
            format!("{value}\\x")
        );
        assert_eq!(expand_env("%WINGET_WARDEN_UNSET_FOR_TEST%\\x"), None);
        assert_eq!(expand_env("plain").unwrap(), "plain");
    }

    #[test]
    fn unresolvable_paths_fall_back_to_data_dir() {
        let path = resolve_or_data_dir("%WINGET_WARDEN_UNSET_FOR_TEST%\\policy.toml", "policy.toml");
        assert!(path.ends_with("policy.toml"));
        assert!(!path.to_string_lossy().contains('%'));
    }
}
