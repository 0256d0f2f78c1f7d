use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum InstallScope {
    User,
    System,
}

impl InstallScope {
    pub fn cli_flag(self) -> &'static str {
        match self {
            Self::User => "--user",
            Self::System => "--system",
        }
    }

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Remote {
    pub name: String,
    pub title: Option<String>,
    pub url: String,
    pub icon_url: Option<String>,
    pub scope: InstallScope,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum RefKind {
    App,
    Runtime,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InstalledRef {
    pub name: String,
    pub kind: RefKind,
    pub branch: String,
    pub origin: String,
}
