//! Scripted stand-ins for the platform, the network and the policy store.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::Path;

use crate::model::version::Version;
use crate::net::{Transport, TransportError};
use crate::platform::{Arch, Platform, PlatformError};
use crate::settings::backend::{BackendError, PolicyBackend, RawValue};

#[derive(Debug, Default)]
pub struct MemoryBackend {
    values: BTreeMap<String, RawValue>,
}

impl PolicyBackend for MemoryBackend {
    fn read(&self, name: &str) -> Result<Option<RawValue>, BackendError> {
        Ok(self.values.get(name).cloned())
    }

    fn write(&mut self, name: &str, value: RawValue) -> Result<(), BackendError> {
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), BackendError> {
        self.values.remove(name);
        Ok(())
    }
}

/// Serves fixed pages and writes a placeholder for every download.
#[derive(Debug, Clone, Default)]
pub struct StaticTransport {
    pages: HashMap<String, String>,
    downloads: RefCell<Vec<String>>,
    fail_downloads: bool,
}

impl StaticTransport {
    pub fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }

    pub fn failing_downloads(mut self) -> Self {
        self.fail_downloads = true;
        self
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.borrow().clone()
    }
}

impl Transport for StaticTransport {
    fn get_text(&self, url: &str) -> Result<String, TransportError> {
        self.pages.get(url).cloned().ok_or_else(|| TransportError::Io {
            path: url.into(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such page"),
        })
    }

    fn download(&self, url: &str, dest: &Path) -> Result<u64, TransportError> {
        self.downloads.borrow_mut().push(url.to_string());
        if self.fail_downloads {
            return Err(TransportError::Io {
                path: dest.to_path_buf(),
                source: io::Error::new(io::ErrorKind::ConnectionReset, "scripted failure"),
            });
        }
        fs::write(dest, b"payload").map_err(|source| TransportError::Io {
            path: dest.to_path_buf(),
            source,
        })?;
        Ok(7)
    }
}

/// Records every mutating call; inventory answers are replayed in order
/// and the last one repeats.
#[derive(Debug, Default)]
pub struct FakePlatform {
    build: u32,
    programs: Vec<String>,
    versions: RefCell<VecDeque<Option<Version>>>,
    store_policy: Cell<Option<u32>>,
    failing: HashSet<&'static str>,
    calls: RefCell<Vec<String>>,
    inventory_queries: Cell<usize>,
    bundle_existed: Cell<bool>,
}

impl FakePlatform {
    pub fn with_build(build: u32) -> Self {
        Self {
            build,
            ..Self::default()
        }
    }

    pub fn with_program(mut self, name: &str) -> Self {
        self.programs.push(name.to_string());
        self
    }

    pub fn with_versions(self, versions: &[Option<&str>]) -> Self {
        *self.versions.borrow_mut() = versions
            .iter()
            .map(|v| v.map(|v| v.parse().expect("valid test version")))
            .collect();
        self
    }

    pub fn with_store_policy(self, value: Option<u32>) -> Self {
        self.store_policy.set(value);
        self
    }

    /// Make the named operation (`provision`, `run_silent`, `stop`, `scan`,
    /// `set_store_policy`) fail.
    pub fn failing(mut self, op: &'static str) -> Self {
        self.failing.insert(op);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn inventory_queries(&self) -> usize {
        self.inventory_queries.get()
    }

    pub fn bundle_existed_at_provision(&self) -> bool {
        self.bundle_existed.get()
    }

    pub fn store_policy(&self) -> Option<u32> {
        self.store_policy.get()
    }

    fn record(&self, op: &'static str, call: String) -> Result<(), PlatformError> {
        self.calls.borrow_mut().push(call);
        if self.failing.contains(op) {
            return Err(PlatformError::Command {
                action: op.to_string(),
                status: "exit code: 1".to_string(),
                detail: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

impl Platform for FakePlatform {
    fn os_build(&self) -> Result<u32, PlatformError> {
        Ok(self.build)
    }

    fn architecture(&self) -> Arch {
        Arch::X64
    }

    fn installed_programs(&self) -> Result<Vec<String>, PlatformError> {
        Ok(self.programs.clone())
    }

    fn installed_package_version(&self, _package: &str) -> Result<Option<Version>, PlatformError> {
        self.inventory_queries.set(self.inventory_queries.get() + 1);
        let mut versions = self.versions.borrow_mut();
        let next = if versions.len() > 1 {
            versions.pop_front().flatten()
        } else {
            versions.front().cloned().flatten()
        };
        Ok(next)
    }

    fn provision_package(&self, bundle: &Path) -> Result<(), PlatformError> {
        self.bundle_existed.set(bundle.is_file());
        self.record("provision", format!("provision {}", file_name(bundle)))
    }

    fn run_silent(&self, program: &Path, args: &[String]) -> Result<(), PlatformError> {
        self.record(
            "run_silent",
            format!("run_silent {} {}", file_name(program), args.join(" ")),
        )
    }

    fn stop_processes(&self, names: &[String]) -> Result<(), PlatformError> {
        self.record("stop", format!("stop {}", names.join(",")))
    }

    fn request_store_update_scan(&self) -> Result<(), PlatformError> {
        self.record("scan", "scan".to_string())
    }

    fn store_auto_download(&self) -> Result<Option<u32>, PlatformError> {
        Ok(self.store_policy.get())
    }

    fn set_store_auto_download(&self, value: u32) -> Result<(), PlatformError> {
        self.record("set_store_policy", format!("set_store_policy {value}"))?;
        self.store_policy.set(Some(value));
        Ok(())
    }

    fn is_system_context(&self) -> bool {
        true
    }
}
