use std::fmt;

use serde::{Deserialize, Serialize};

/// A registry partition: the acting user's personal registry or one group's
/// shared registry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum Scope {
    Personal,
    Group(String),
}

impl Scope {
    #[must_use]
    pub fn group(name: impl Into<String>) -> Self {
        Scope::Group(name.into())
    }

    #[must_use]
    pub fn group_name(&self) -> Option<&str> {
        match self {
            Scope::Personal => None,
            Scope::Group(name) => Some(name),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Personal => f.write_str("personal"),
            Scope::Group(name) => write!(f, "group:{name}"),
        }
    }
}
