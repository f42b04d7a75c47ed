use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};

pub const ROOT_MARKER_PREFIX: &str = "EBROOT";
pub const VERSION_MARKER_PREFIX: &str = "EBVERSION";

/// A loadable module, written `name/version`.
///
/// The version is everything after the first `/` so identifiers round-trip
/// exactly as the module system spells them.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleId {
    name: String,
    version: Option<String>,
}

impl ModuleId {
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(ToOwned::to_owned),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("module identifier is empty");
        }
        if raw.chars().any(char::is_whitespace) {
            bail!("module identifier `{raw}` contains whitespace");
        }
        match raw.split_once('/') {
            Some((name, version)) => {
                if name.is_empty() || version.is_empty() {
                    return Err(anyhow!("module identifier `{raw}` must be `name/version`"));
                }
                Ok(Self::new(name, Some(version)))
            }
            None => Ok(Self::new(raw, None)),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Case-insensitive comparison against a bare module name.
    #[must_use]
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    #[must_use]
    pub fn marker_key(&self) -> String {
        marker_key(&self.name)
    }
}

/// Spells a module name the way EasyBuild spells its `EBROOT*`/`EBVERSION*`
/// environment markers.
#[must_use]
pub fn marker_key(name: &str) -> String {
    name.to_ascii_uppercase()
        .replace('-', "MINUS")
        .replace('+', "PLUS")
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}", self.name, version),
            None => f.write_str(&self.name),
        }
    }
}

impl FromStr for ModuleId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ModuleId {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).map_err(|err| err.to_string())
    }
}

impl From<ModuleId> for String {
    fn from(value: ModuleId) -> Self {
        value.to_string()
    }
}
