use std::fs;
use std::io::Write;
use std::path::PathBuf;

use crate::models::{CoreError, CoreErrorKind, SourceLine};
use crate::sanitize::sanitize_source_line;

pub type SourceResult<T> = Result<T, CoreError>;

/// Editor for the persisted repository source list. The on-disk format of
/// the real APT source list is owned by the system tooling; this seam only
/// guarantees that every line passes through the sanitizer before it is
/// written or compared.
pub trait SourceListEditor: Send + Sync {
    fn add_line(&self, line: &str) -> SourceResult<()>;

    fn remove_line(&self, line: &str) -> SourceResult<()>;

    fn lines(&self) -> SourceResult<Vec<SourceLine>>;
}

pub struct FileSourceList {
    path: PathBuf,
}

impl FileSourceList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_raw(&self) -> SourceResult<Vec<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.lines().map(str::to_owned).collect()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => Err(storage_error(format!(
                "failed to read source list '{}': {error}",
                self.path.display()
            ))),
        }
    }

    fn write_raw(&self, lines: &[String]) -> SourceResult<()> {
        let mut body = lines.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(&self.path, body).map_err(|error| {
            storage_error(format!(
                "failed to write source list '{}': {error}",
                self.path.display()
            ))
        })
    }
}

impl SourceListEditor for FileSourceList {
    fn add_line(&self, line: &str) -> SourceResult<()> {
        let sanitized = sanitize_source_line(line);
        if sanitized.trim().is_empty() {
            return Err(CoreError {
                scope: None,
                task: None,
                kind: CoreErrorKind::ValidationFailure,
                message: "source line is empty after sanitization".to_string(),
            });
        }

        let existing = self.read_raw()?;
        if existing
            .iter()
            .any(|stored| sanitize_source_line(stored) == sanitized)
        {
            tracing::debug!(line = %sanitized, "source line already present");
            return Ok(());
        }

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|error| {
                storage_error(format!(
                    "failed to open source list '{}': {error}",
                    self.path.display()
                ))
            })?;
        writeln!(file, "{sanitized}").map_err(|error| {
            storage_error(format!(
                "failed to append to source list '{}': {error}",
                self.path.display()
            ))
        })
    }

    fn remove_line(&self, line: &str) -> SourceResult<()> {
        let sanitized = sanitize_source_line(line);
        let existing = self.read_raw()?;
        let kept: Vec<String> = existing
            .into_iter()
            .filter(|stored| sanitize_source_line(stored) != sanitized)
            .collect();
        self.write_raw(&kept)
    }

    fn lines(&self) -> SourceResult<Vec<SourceLine>> {
        Ok(self
            .read_raw()?
            .into_iter()
            .filter(|raw| !raw.trim().is_empty())
            .map(SourceLine::from_stored)
            .collect())
    }
}

fn storage_error(message: String) -> CoreError {
    CoreError {
        scope: None,
        task: None,
        kind: CoreErrorKind::Internal,
        message,
    }
}
