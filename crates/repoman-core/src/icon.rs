use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::models::InstallScope;

const ICON_EXTENSION: &str = "svg";
const ICON_LIMIT_BYTES: u64 = 4 * 1024 * 1024;

/// Outcome of looking up a cached icon. "Not cached yet" is an expected
/// state, distinct from an unreadable cache file.
#[derive(Debug)]
pub enum IconLookup {
    Found(PathBuf),
    Missing,
    Unreadable(std::io::Error),
}

/// Result delivered to the UI for a fetch-icon task. Icons are decorative:
/// there is no failure variant.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum IconOutcome {
    Fresh(PathBuf),
    Cached(PathBuf),
    Placeholder,
}

#[derive(Clone)]
pub struct IconStore {
    cache_root: PathBuf,
}

impl IconStore {
    pub fn new(cache_root: impl Into<PathBuf>) -> Self {
        Self {
            cache_root: cache_root.into(),
        }
    }

    pub fn cache_path(&self, scope: InstallScope, remote_name: &str) -> PathBuf {
        self.cache_root
            .join(scope.dir_name())
            .join(format!("{remote_name}.{ICON_EXTENSION}"))
    }

    pub fn cached(&self, scope: InstallScope, remote_name: &str) -> IconLookup {
        let path = self.cache_path(scope, remote_name);
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() && meta.len() > 0 => IconLookup::Found(path),
            Ok(_) => IconLookup::Missing,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => IconLookup::Missing,
            Err(error) => IconLookup::Unreadable(error),
        }
    }

    /// Downloads the remote's icon into the cache and reports what the UI
    /// should display. Every failure degrades: first to the previously
    /// cached file, then to the placeholder.
    pub async fn refresh(
        &self,
        scope: InstallScope,
        remote_name: &str,
        icon_url: Option<&str>,
    ) -> IconOutcome {
        let Some(url) = icon_url.map(str::to_owned) else {
            tracing::debug!(remote = remote_name, "remote has no icon url");
            return self.fallback(scope, remote_name);
        };

        let store = self.clone();
        let scope_copy = scope;
        let name = remote_name.to_string();
        let fetched = tokio::task::spawn_blocking(move || store.fetch_blocking(scope_copy, &name, &url))
            .await
            .unwrap_or_else(|join_error| {
                tracing::warn!(%join_error, "icon fetch task aborted");
                None
            });

        match fetched {
            Some(path) => IconOutcome::Fresh(path),
            None => self.fallback(scope, remote_name),
        }
    }

    fn fallback(&self, scope: InstallScope, remote_name: &str) -> IconOutcome {
        match self.cached(scope, remote_name) {
            IconLookup::Found(path) => IconOutcome::Cached(path),
            IconLookup::Missing => IconOutcome::Placeholder,
            IconLookup::Unreadable(error) => {
                tracing::warn!(remote = remote_name, %error, "icon cache unreadable");
                IconOutcome::Placeholder
            }
        }
    }

    fn fetch_blocking(
        &self,
        scope: InstallScope,
        remote_name: &str,
        url: &str,
    ) -> Option<PathBuf> {
        let path = self.cache_path(scope, remote_name);
        match download_to(url, &path) {
            Ok(()) => Some(path),
            Err(error) => {
                tracing::warn!(remote = remote_name, url, %error, "could not load latest icon");
                None
            }
        }
    }
}

fn download_to(url: &str, path: &Path) -> Result<(), String> {
    let response = ureq::get(url).call().map_err(|error| error.to_string());
    let response = response?;

    let mut contents = Vec::new();
    response
        .into_reader()
        .take(ICON_LIMIT_BYTES)
        .read_to_end(&mut contents)
        .map_err(|error| error.to_string())?;

    if contents.is_empty() {
        return Err("icon response was empty".to_string());
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|error| error.to_string())?;
    }
    fs::write(path, contents).map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::{IconLookup, IconStore};
    use crate::models::InstallScope;

    #[test]
    fn cache_path_is_keyed_by_scope_and_name() {
        let store = IconStore::new("/tmp/repoman-icons");
        let path = store.cache_path(InstallScope::User, "flathub");
        assert!(path.ends_with("user/flathub.svg"));
    }

    #[test]
    fn missing_cache_entry_is_not_an_error() {
        let store = IconStore::new(std::env::temp_dir().join("repoman-icon-test-none"));
        assert!(matches!(
            store.cached(InstallScope::System, "absent"),
            IconLookup::Missing
        ));
    }
}
