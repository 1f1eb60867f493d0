use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use chrono::NaiveTime;
use serde::Serialize;

use crate::cli::{Commands, ExecutionContext, ScopeCommands, SettingsCommands};
use crate::install::{InstallOrchestrator, ReconcileOptions, restore_store_policy};
use crate::model::config::AgentConfig;
use crate::model::policy::{PolicyKey, PolicyUpdate, UpdateInterval, parse_time_of_day};
use crate::model::version::Version;
use crate::net::HttpTransport;
use crate::platform::{Platform, PowerShell};
use crate::prereq::PrerequisiteChecker;
use crate::schedule::{TaskDefinition, build_triggers, maintenance_task, notification_task};
use crate::scope;
use crate::settings::{SettingsStore, TomlFileBackend};

/// Run time used by the maintenance task when `UpdateTime` is unset.
const DEFAULT_UPDATE_TIME: (u32, u32) = (6, 0);

#[derive(Serialize)]
struct JsonOut<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct SettingRow {
    key: &'static str,
    value: Option<String>,
}

#[derive(Serialize)]
struct ScopeResult {
    path: PathBuf,
    machine_scope_only: bool,
    changed: bool,
}

#[derive(Serialize)]
struct ScheduleOut {
    maintenance: TaskDefinition,
    notification: TaskDefinition,
}

#[derive(Serialize)]
struct RestoreOut {
    restored: Option<u32>,
}

/// Everything a command needs, owned in one place and lent to the
/// components for the duration of a call.
pub struct App {
    config: AgentConfig,
    platform: PowerShell,
    transport: HttpTransport,
    settings: SettingsStore<TomlFileBackend>,
    json: bool,
}

impl App {
    pub fn new(config: AgentConfig, json: bool) -> Result<Self> {
        let transport = HttpTransport::new(&config.feed.user_agent, config.feed_timeout())?;
        let backend = TomlFileBackend::new(config.policy_file());
        tracing::debug!("policy store at {}", backend.path().display());
        Ok(Self {
            settings: SettingsStore::new(backend),
            platform: PowerShell::default(),
            transport,
            config,
            json,
        })
    }

    pub fn dispatch(&mut self, command: Commands) -> Result<ExitCode> {
        match command {
            Commands::Run {
                target,
                wait_minutes,
                stop_processes,
                skip_prerequisites,
            } => self.run(target, wait_minutes, stop_processes, skip_prerequisites),
            Commands::Status => self.status().map(|()| ExitCode::SUCCESS),
            Commands::Prerequisites => self.prerequisites(),
            Commands::Settings { command } => self.settings(command).map(|()| ExitCode::SUCCESS),
            Commands::Scope {
                command:
                    ScopeCommands::Apply {
                        context,
                        path,
                        machine_only,
                    },
            } => self
                .scope_apply(context, path, machine_only)
                .map(|()| ExitCode::SUCCESS),
            Commands::Schedule {
                interval,
                time,
                logon,
            } => self
                .schedule(interval, time, logon)
                .map(|()| ExitCode::SUCCESS),
            Commands::Restore => self.restore().map(|()| ExitCode::SUCCESS),
        }
    }

    fn run(
        &mut self,
        target: Option<String>,
        wait_minutes: Option<u64>,
        stop_processes: bool,
        skip_prerequisites: bool,
    ) -> Result<ExitCode> {
        let target = target
            .map(|raw| raw.parse::<Version>())
            .transpose()
            .context("invalid --target version")?;

        if !skip_prerequisites && self.check_prerequisites()?.is_none() {
            return Ok(ExitCode::FAILURE);
        }

        let options = ReconcileOptions {
            target,
            wait_budget: wait_budget(wait_minutes, self.config.wait_budget()),
            stop_processes,
        };

        let mut orchestrator = InstallOrchestrator::new(
            &self.platform,
            &self.transport,
            &mut self.settings,
            &self.config,
        );
        match orchestrator.reconcile(&options) {
            Ok(report) => {
                if !report.succeeded() {
                    tracing::warn!(
                        "reconcile ended {:?}: {}",
                        report.outcome,
                        report.failure.as_deref().unwrap_or("target version not observed")
                    );
                }
                self.print_one(&report, |r| {
                    let installed = r
                        .installed_after
                        .as_ref()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "none".to_string());
                    format!("{:?} -> {:?}\tinstalled {installed}\ttarget {}", r.initial, r.outcome, r.target)
                })?;
            }
            Err(err) => {
                tracing::warn!("skipping remediation this run: {err}");
                eprintln!("remediation skipped: {err}");
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn status(&mut self) -> Result<()> {
        let orchestrator = InstallOrchestrator::new(
            &self.platform,
            &self.transport,
            &mut self.settings,
            &self.config,
        );
        let assessment = orchestrator.assess()?;
        self.print_one(&assessment, |a| {
            let installed = a
                .installed
                .version
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "none".to_string());
            format!("{:?}\tinstalled {installed}\tlatest {}", a.state, a.latest)
        })
    }

    fn prerequisites(&self) -> Result<ExitCode> {
        Ok(match self.check_prerequisites()? {
            Some(()) => ExitCode::SUCCESS,
            None => ExitCode::FAILURE,
        })
    }

    /// `None` when the machine cannot run the package manager; the error has
    /// already been reported.
    fn check_prerequisites(&self) -> Result<Option<()>> {
        let work_dir = self.config.prerequisite_dir();
        let checker = PrerequisiteChecker::new(
            &self.platform,
            &self.transport,
            &self.config.prerequisites,
            &work_dir,
        );
        match checker.check() {
            Ok(report) => {
                self.print_one(&report, |r| format!("OS build {}\truntime {:?}", r.os_build, r.runtime))?;
                Ok(Some(()))
            }
            Err(err) => {
                tracing::error!("prerequisites not met: {err}");
                eprintln!("prerequisites not met: {err}");
                Ok(None)
            }
        }
    }

    fn settings(&mut self, command: SettingsCommands) -> Result<()> {
        match command {
            SettingsCommands::Get { key } => {
                let key: PolicyKey = key.parse()?;
                let value = self.settings.get(key)?;
                self.print_one(
                    SettingRow {
                        key: key.name(),
                        value: value.map(|v| v.to_string()),
                    },
                    |row| row.value.clone().unwrap_or_default(),
                )
            }
            SettingsCommands::Set { assignments } => {
                let mut update = PolicyUpdate::default();
                for assignment in &assignments {
                    update.assign(assignment)?;
                }
                let written = self.settings.set(&update)?;
                let names: Vec<&'static str> = written.iter().map(|key| key.name()).collect();
                tracing::info!("settings written: {}", names.join(", "));
                self.print_out(&names, |name| format!("set {name}"))
            }
            SettingsCommands::Show => {
                let rows: Vec<SettingRow> = self
                    .settings
                    .snapshot()?
                    .into_iter()
                    .map(|(key, value)| SettingRow {
                        key: key.name(),
                        value: value.map(|v| v.to_string()),
                    })
                    .collect();
                self.print_out(&rows, |row| {
                    format!("{}\t{}", row.key, row.value.as_deref().unwrap_or("(unset)"))
                })
            }
        }
    }

    fn scope_apply(
        &self,
        context: Option<ExecutionContext>,
        path: Option<PathBuf>,
        machine_only: Option<bool>,
    ) -> Result<()> {
        let path = match path {
            Some(path) => path,
            None => {
                let system = match context {
                    Some(context) => context == ExecutionContext::System,
                    None => self.platform.is_system_context(),
                };
                self.config.scope_document(system)?
            }
        };
        let machine_scope_only = match machine_only {
            Some(flag) => flag,
            None => self.settings.machine_scope_only()?,
        };

        let changed = scope::apply_to_file(&path, machine_scope_only)?;
        self.print_one(
            ScopeResult {
                path,
                machine_scope_only,
                changed,
            },
            |r| {
                let verb = if r.changed { "updated" } else { "unchanged" };
                format!("{verb} {}", r.path.display())
            },
        )
    }

    fn schedule(&self, interval: Option<String>, time: Option<String>, logon: Option<bool>) -> Result<()> {
        let interval = match interval {
            Some(raw) => Some(
                raw.parse::<UpdateInterval>()
                    .map_err(|()| anyhow!("unknown update interval {raw:?}"))?,
            ),
            None => self.settings.update_interval()?,
        };
        let at = match time {
            Some(raw) => {
                parse_time_of_day(&raw).ok_or_else(|| anyhow!("invalid time of day {raw:?}"))?
            }
            None => match self.settings.update_time()? {
                Some(at) => at,
                None => default_update_time()?,
            },
        };
        let logon = match logon {
            Some(flag) => flag,
            None => self.settings.update_on_login()?,
        };

        let maintenance = maintenance_task(build_triggers(interval, at, logon));
        if maintenance.is_unconditional() {
            tracing::info!("no interval or logon trigger configured, task runs on demand only");
        }
        self.print_one(
            ScheduleOut {
                maintenance,
                notification: notification_task(),
            },
            |out| {
                let mut lines = Vec::new();
                for task in [&out.maintenance, &out.notification] {
                    lines.push(format!(
                        "{}\t{:?}\tlimit {}s\t{} trigger(s)",
                        task.name,
                        task.principal,
                        task.execution_limit.as_secs(),
                        task.triggers.len()
                    ));
                    for trigger in &task.triggers {
                        let at = trigger
                            .anchor()
                            .map(|at| at.format(" at %H:%M").to_string())
                            .unwrap_or_default();
                        lines.push(format!("  {}{at}", trigger.label()));
                    }
                }
                lines.join("\n")
            },
        )
    }

    fn restore(&mut self) -> Result<()> {
        let restored = restore_store_policy(&self.platform, &mut self.settings)?;
        self.print_one(RestoreOut { restored }, |out| match out.restored {
            Some(value) => format!("store policy restored to {value}"),
            None => "nothing to restore".to_string(),
        })
    }

    fn print_out<T: Serialize>(&self, data: &[T], row: impl Fn(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&JsonOut { ok: true, data })?);
        } else {
            for d in data {
                println!("{}", row(d));
            }
        }
        Ok(())
    }

    fn print_one<T: Serialize>(&self, data: T, row: impl Fn(&T) -> String) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string_pretty(&JsonOut { ok: true, data })?);
        } else {
            println!("{}", row(&data));
        }
        Ok(())
    }
}

fn default_update_time() -> Result<NaiveTime> {
    let (hour, minute) = DEFAULT_UPDATE_TIME;
    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| anyhow!("invalid default update time"))
}

fn wait_budget(minutes: Option<u64>, default: Duration) -> Duration {
    minutes
        .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
        .unwrap_or(default)
}
