use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A downloaded file in the working directory, deleted when dropped
/// whether or not the install that used it succeeded.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    /// Reserve `dir/<name>`, creating the working directory if needed.
    pub fn reserve(dir: &Path, name: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(name),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!("removed {}", self.path.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => tracing::warn!("failed to remove {}: {err}", self.path.display()),
        }
    }
}

/// Local file name for a download URL: its last path segment, without query.
pub fn file_name_from_url(url: &str, fallback: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    without_query
        .rsplit('/')
        .next()
        .filter(|segment| {
            !segment.is_empty()
                && !segment.contains(':')
                && segment
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        })
        .unwrap_or(fallback)
        .to_string()
}
