use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const SETTINGS_SCHEMA: &str = "https://aka.ms/winget-settings.schema.json";
pub const MACHINE_SCOPE: &str = "machine";

#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("scope document is not valid settings JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The package manager's settings document. Only the scope sections are
/// typed; everything else is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeDocument {
    #[serde(rename = "$schema", default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(
        rename = "installBehavior",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub install_behavior: Option<InstallBehavior>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstallBehavior {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<ScopeSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirements: Option<ScopeSection>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl ScopeDocument {
    /// Parse the document, skipping a byte-order mark and `//` comment
    /// lines. Blank input yields the minimal skeleton.
    pub fn parse(raw: &str) -> Result<Self, ScopeError> {
        let stripped = strip_comments(raw);
        if stripped.trim().is_empty() {
            return Ok(Self::skeleton());
        }
        Ok(serde_json::from_str(&stripped)?)
    }

    pub fn skeleton() -> Self {
        Self {
            schema: Some(SETTINGS_SCHEMA.to_string()),
            ..Self::default()
        }
    }

    /// Ensure `installBehavior.preferences.scope = "machine"`, and the same
    /// under `requirements` when `machine_scope_only`. Only absent sections
    /// are created.
    pub fn apply_machine_scope(&mut self, machine_scope_only: bool) {
        let behavior = self.install_behavior.get_or_insert_with(InstallBehavior::default);
        behavior
            .preferences
            .get_or_insert_with(ScopeSection::default)
            .scope = Some(MACHINE_SCOPE.to_string());
        if machine_scope_only {
            behavior
                .requirements
                .get_or_insert_with(ScopeSection::default)
                .scope = Some(MACHINE_SCOPE.to_string());
        }
    }

    pub fn to_pretty_json(&self) -> Result<String, ScopeError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn strip_comments(raw: &str) -> String {
    raw.strip_prefix('\u{feff}')
        .unwrap_or(raw)
        .lines()
        .filter(|line| !line.trim_start().starts_with("//"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Same JSON content, ignoring key order, comments and formatting.
fn same_content(existing: &str, updated: &str) -> bool {
    let before = serde_json::from_str::<Value>(&strip_comments(existing));
    let after = serde_json::from_str::<Value>(updated);
    matches!((before, after), (Ok(before), Ok(after)) if before == after)
}

/// Merge machine scope into an existing document (or the skeleton) and
/// return the text to write back.
pub fn apply_machine_scope(existing: Option<&str>, machine_scope_only: bool) -> Result<String, ScopeError> {
    let mut document = match existing {
        Some(raw) => ScopeDocument::parse(raw)?,
        None => ScopeDocument::skeleton(),
    };
    document.apply_machine_scope(machine_scope_only);
    document.to_pretty_json()
}

/// File variant of [`apply_machine_scope`]. Returns whether the file changed.
pub fn apply_to_file(path: &Path, machine_scope_only: bool) -> Result<bool, ScopeError> {
    let io_err = |source: io::Error| ScopeError::Io {
        path: path.to_path_buf(),
        source,
    };

    let existing = match fs::read_to_string(path) {
        Ok(raw) => Some(raw),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(err) => return Err(io_err(err)),
    };
    let updated = apply_machine_scope(existing.as_deref(), machine_scope_only)?;
    if existing
        .as_deref()
        .is_some_and(|existing| same_content(existing, &updated))
    {
        tracing::debug!("{} already has machine scope", path.display());
        return Ok(false);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, &updated).map_err(io_err)?;
    tracing::info!(
        "machine scope written to {} (requirements: {machine_scope_only})",
        path.display()
    );
    Ok(true)
}
