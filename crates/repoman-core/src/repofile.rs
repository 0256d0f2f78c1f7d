use std::io::Read;

use ini::Ini;

use crate::models::{CoreError, CoreErrorKind, TaskKind};

const REPO_GROUP: &str = "Flatpak Repo";
const FETCH_LIMIT_BYTES: u64 = 1024 * 1024;

pub type RepoFileResult<T> = Result<T, CoreError>;

/// Parsed contents of a `.flatpakrepo` keyfile.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RepoFile {
    pub title: Option<String>,
    pub url: Option<String>,
    pub icon: Option<String>,
    pub comment: Option<String>,
    pub gpg_key: Option<String>,
}

impl RepoFile {
    pub fn parse(contents: &str) -> RepoFileResult<Self> {
        let ini = Ini::load_from_str(contents).map_err(|error| CoreError {
            scope: None,
            task: Some(TaskKind::AddRemote),
            kind: CoreErrorKind::ParseFailure,
            message: format!("malformed flatpakrepo file: {error}"),
        })?;

        let Some(section) = ini.section(Some(REPO_GROUP)) else {
            return Err(CoreError {
                scope: None,
                task: Some(TaskKind::AddRemote),
                kind: CoreErrorKind::ParseFailure,
                message: format!("flatpakrepo file has no [{REPO_GROUP}] group"),
            });
        };

        let field = |key: &str| section.get(key).map(str::to_owned);
        Ok(Self {
            title: field("Title"),
            url: field("Url"),
            icon: field("Icon"),
            comment: field("Comment"),
            gpg_key: field("GPGKey"),
        })
    }
}

/// A remote-definition URL must carry the expected extension; anything else
/// is rejected before a worker is dispatched.
pub fn is_flatpakrepo_url(url: &str) -> bool {
    url.rsplit('.').next() == Some("flatpakrepo")
}

pub fn is_flatpakref_path(path: &str) -> bool {
    path.rsplit('.').next() == Some("flatpakref")
}

/// Blocking download of a repofile; callers on the async side wrap this in
/// `spawn_blocking`.
pub fn fetch_repofile(url: &str) -> RepoFileResult<RepoFile> {
    let response = ureq::get(url).call().map_err(|error| CoreError {
        scope: None,
        task: Some(TaskKind::AddRemote),
        kind: CoreErrorKind::TransactionFailure,
        message: format!("failed to fetch flatpakrepo from '{url}': {error}"),
    })?;

    let mut contents = String::new();
    response
        .into_reader()
        .take(FETCH_LIMIT_BYTES)
        .read_to_string(&mut contents)
        .map_err(|error| CoreError {
            scope: None,
            task: Some(TaskKind::AddRemote),
            kind: CoreErrorKind::TransactionFailure,
            message: format!("failed to read flatpakrepo from '{url}': {error}"),
        })?;

    RepoFile::parse(&contents)
}
