use serde::{Deserialize, Serialize};

/// One textual repository definition as stored in the source list.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SourceLine {
    pub raw: String,
    pub enabled: bool,
}

impl SourceLine {
    pub fn from_stored(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let enabled = !raw.trim_start().starts_with('#');
        Self { raw, enabled }
    }
}
