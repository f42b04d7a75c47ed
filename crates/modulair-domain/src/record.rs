use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::module::ModuleId;
use crate::toolchain::ToolchainSource;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub user: String,
    #[serde(default)]
    pub group: Option<String>,
}

/// One named environment as persisted in a scope's registry document.
///
/// Fields this version does not know about are kept in `extra` and written
/// back untouched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner: Owner,
    pub python_version: String,
    pub toolchain_modules: Vec<ModuleId>,
    pub toolchain_source: ToolchainSource,
    pub created_at: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    environments: Vec<EnvironmentRecord>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

#[derive(Serialize)]
struct RawDocumentRef<'a> {
    environments: Vec<&'a EnvironmentRecord>,
    #[serde(flatten)]
    extra: &'a Map<String, Value>,
}

/// The `{"environments": [...]}` document backing one scope, viewed as an
/// insertion-ordered mapping from name to record.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RegistryDocument {
    environments: IndexMap<String, EnvironmentRecord>,
    extra: Map<String, Value>,
}

impl<'de> Deserialize<'de> for RegistryDocument {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawDocument::deserialize(deserializer)?;
        let mut environments = IndexMap::with_capacity(raw.environments.len());
        for record in raw.environments {
            if environments.contains_key(&record.name) {
                return Err(de::Error::custom(format!(
                    "duplicate environment name `{}`",
                    record.name
                )));
            }
            environments.insert(record.name.clone(), record);
        }
        Ok(Self {
            environments,
            extra: raw.extra,
        })
    }
}

impl Serialize for RegistryDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        RawDocumentRef {
            environments: self.environments.values().collect(),
            extra: &self.extra,
        }
        .serialize(serializer)
    }
}

impl RegistryDocument {
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        let mut rendered = serde_json::to_string_pretty(self)?;
        rendered.push('\n');
        Ok(rendered)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&EnvironmentRecord> {
        self.environments.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.environments.contains_key(name)
    }

    /// Adds a record unless its name is taken, handing the record back on
    /// conflict.
    pub fn insert(&mut self, record: EnvironmentRecord) -> Result<(), EnvironmentRecord> {
        if self.environments.contains_key(&record.name) {
            return Err(record);
        }
        self.environments.insert(record.name.clone(), record);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<EnvironmentRecord> {
        self.environments.shift_remove(name)
    }

    pub fn records(&self) -> impl Iterator<Item = &EnvironmentRecord> {
        self.environments.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.environments.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }
}
