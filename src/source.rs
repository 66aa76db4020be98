use std::fmt;

use serde::{Deserialize, Serialize};

/// Source describes which input won the resolution of a flag or parameter.
///
/// Sources are listed in priority order: a source only wins when every source above it had
/// nothing to offer for the requested key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Url indicates the value was forced through the page query string.
    Url,
    /// Test indicates the process is a test environment and the definition declares a test
    /// override.
    Test,
    /// Override indicates the definition declares a static override.
    Override,
    /// Remote indicates the remote configuration service produced the value.
    Remote,
    /// Fallback indicates nothing else applied and the declared fallback was used.
    Fallback,
}

impl Source {
    /// All sources, highest priority first.
    pub const PRIORITY: [Source; 5] = [
        Source::Url,
        Source::Test,
        Source::Override,
        Source::Remote,
        Source::Fallback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Url => "url",
            Source::Test => "test",
            Source::Override => "override",
            Source::Remote => "remote",
            Source::Fallback => "fallback",
        }
    }

    /// Returns the [LocalSource] equivalent if this source is declared locally (URL, test or
    /// static override) rather than produced by the remote service or the fallback.
    pub fn as_local(&self) -> Option<LocalSource> {
        match self {
            Source::Url => Some(LocalSource::Url),
            Source::Test => Some(LocalSource::Test),
            Source::Override => Some(LocalSource::Override),
            Source::Remote | Source::Fallback => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subset of [Source] whose values are trusted even when they fail schema validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalSource {
    Url,
    Test,
    Override,
}

impl From<LocalSource> for Source {
    fn from(source: LocalSource) -> Self {
        match source {
            LocalSource::Url => Source::Url,
            LocalSource::Test => Source::Test,
            LocalSource::Override => Source::Override,
        }
    }
}
