use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value kinds a hierarchical machine policy store can hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Dword(u32),
    String(String),
    MultiString(Vec<String>),
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("serializing policy document: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Named values under the product's machine-wide policy key.
pub trait PolicyBackend {
    fn read(&self, name: &str) -> Result<Option<RawValue>, BackendError>;
    fn write(&mut self, name: &str, value: RawValue) -> Result<(), BackendError>;
    fn remove(&mut self, name: &str) -> Result<(), BackendError>;
}

/// Policy values kept in a TOML document, re-read on every access so that
/// separate invocations always see each other's writes.
#[derive(Debug, Clone)]
pub struct TomlFileBackend {
    path: PathBuf,
}

impl TomlFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, RawValue>, BackendError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.path).map_err(|source| BackendError::Io {
            path: self.path.clone(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| BackendError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    fn store(&self, values: &BTreeMap<String, RawValue>) -> Result<(), BackendError> {
        let io_err = |source: io::Error| BackendError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        // Staged write, then rename over the live document.
        let staged = self.path.with_extension("toml.tmp");
        fs::write(&staged, toml::to_string(values)?).map_err(io_err)?;
        fs::rename(&staged, &self.path).map_err(io_err)
    }
}

impl PolicyBackend for TomlFileBackend {
    fn read(&self, name: &str) -> Result<Option<RawValue>, BackendError> {
        Ok(self.load()?.remove(name))
    }

    fn write(&mut self, name: &str, value: RawValue) -> Result<(), BackendError> {
        let mut values = self.load()?;
        values.insert(name.to_string(), value);
        self.store(&values)
    }

    fn remove(&mut self, name: &str) -> Result<(), BackendError> {
        let mut values = self.load()?;
        if values.remove(name).is_some() {
            self.store(&values)?;
        }
        Ok(())
    }
}
