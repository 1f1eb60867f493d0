use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Isolated machine: the policy store, logs and settings documents all live
/// under one temp dir, wired in through a machine config file.
pub struct TestEnv {
    _tmp: TempDir,
    pub root: PathBuf,
    pub config: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let root = tmp.path().to_path_buf();
        let config = root.join("config.toml");

        let machine_config = format!(
            "[settings]\npolicy_file = '{}'\n\n\
             [install]\nwork_dir = '{}'\n\n\
             [prerequisites]\nwork_dir = '{}'\n\n\
             [scope]\nsystem_document = '{}'\nuser_document = '{}'\n\n\
             [logging]\ndirectory = '{}'\n",
            path_str(&root.join("policy.toml")),
            path_str(&root.join("artifacts")),
            path_str(&root.join("prerequisites")),
            path_str(&root.join("system").join("settings.json")),
            path_str(&root.join("user").join("settings.json")),
            path_str(&root.join("logs")),
        );
        fs::write(&config, machine_config).expect("write machine config");

        Self {
            _tmp: tmp,
            root,
            config,
        }
    }

    pub fn cmd(&self) -> Command {
        let mut cmd = cargo_bin_cmd!("winget-warden");
        cmd.arg("--config").arg(&self.config).env_remove("RUST_LOG");
        cmd
    }

    pub fn run_json(&self, args: &[&str]) -> Value {
        let out = self
            .cmd()
            .arg("--json")
            .args(args)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();
        serde_json::from_slice(&out).expect("valid json output")
    }
}

fn path_str(path: &Path) -> String {
    path.to_str().expect("temp path utf8").to_string()
}
