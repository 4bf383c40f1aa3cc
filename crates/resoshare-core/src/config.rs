//! Configuration — the `[options]` section of the resoshare TOML file.
//!
//! Exactly three fields are recognized: `hash`, `browser`, `user-agent`.
//! Anything else, and any empty value, is a fatal configuration error.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{Error, Result};

/// The closed set of supported browser families. Selected once at startup,
/// never changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserKind {
    Firefox,
    Chrome,
    Edge,
}

impl FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "firefox" => Ok(Self::Firefox),
            "chrome" => Ok(Self::Chrome),
            "edge" => Ok(Self::Edge),
            _ => Err(Error::Config(format!("unsupported browser {s}"))),
        }
    }
}

impl fmt::Display for BrowserKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Firefox => write!(f, "Firefox"),
            Self::Chrome => write!(f, "Chrome"),
            Self::Edge => write!(f, "Edge"),
        }
    }
}

/// Validated startup options. The account hash is immutable for the process
/// lifetime; one process manages exactly one account.
#[derive(Debug, Clone)]
pub struct Options {
    pub hash: String,
    pub browser: BrowserKind,
    pub user_agent: String,
}

impl Options {
    /// Load and validate options from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|_| {
            Error::Config(format!("configuration file {} not found", path.display()))
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate the raw configuration text.
    pub fn parse(raw: &str) -> Result<Self> {
        let doc: toml::Table = toml::from_str(raw)
            .map_err(|e| Error::Config(format!("malformed configuration: {e}")))?;
        let section = doc
            .get("options")
            .and_then(|v| v.as_table())
            .ok_or_else(|| Error::Config("missing [options] section".into()))?;

        let mut hash = None;
        let mut browser = None;
        let mut user_agent = None;

        for (field, value) in section {
            let value = value.as_str().unwrap_or_default();
            if value.is_empty() {
                return Err(Error::Config(format!("field {field} has an empty value")));
            }
            match field.as_str() {
                "hash" => hash = Some(value.to_string()),
                "browser" => browser = Some(value.parse()?),
                "user-agent" => user_agent = Some(value.to_string()),
                _ => return Err(Error::Config(format!("field {field} is not recognized"))),
            }
        }

        Ok(Self {
            hash: hash.ok_or_else(|| Error::Config("field hash is missing".into()))?,
            browser: browser.ok_or_else(|| Error::Config("field browser is missing".into()))?,
            user_agent: user_agent
                .ok_or_else(|| Error::Config("field user-agent is missing".into()))?,
        })
    }
}
