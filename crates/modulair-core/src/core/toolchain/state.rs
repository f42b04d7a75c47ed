use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use modulair_domain::{marker_key, ModuleId, ROOT_MARKER_PREFIX, VERSION_MARKER_PREFIX};

use crate::config::EnvSnapshot;

const LOADED_MODULES_VAR: &str = "LOADEDMODULES";

/// What the module system reports as active: Lmod's load order plus the
/// EasyBuild root/version markers, keyed by marker spelling.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModuleState {
    loaded: Vec<ModuleId>,
    roots: BTreeMap<String, PathBuf>,
    versions: BTreeMap<String, String>,
}

impl ModuleState {
    pub fn from_vars<'a>(vars: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut state = Self::default();
        for (key, value) in vars {
            if value.is_empty() {
                continue;
            }
            if key == LOADED_MODULES_VAR {
                state.loaded = value
                    .split(':')
                    .filter_map(|entry| ModuleId::parse(entry).ok())
                    .collect();
            } else if let Some(name) = key.strip_prefix(VERSION_MARKER_PREFIX) {
                state.versions.insert(name.to_string(), value.to_string());
            } else if let Some(name) = key.strip_prefix(ROOT_MARKER_PREFIX) {
                state.roots.insert(name.to_string(), PathBuf::from(value));
            }
        }
        state
    }

    #[must_use]
    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Self {
        Self::from_vars(snapshot.iter())
    }

    #[must_use]
    pub fn loaded(&self) -> &[ModuleId] {
        &self.loaded
    }

    #[must_use]
    pub fn root(&self, module_name: &str) -> Option<&Path> {
        self.roots.get(&marker_key(module_name)).map(PathBuf::as_path)
    }

    #[must_use]
    pub fn version(&self, module_name: &str) -> Option<&str> {
        self.versions
            .get(&marker_key(module_name))
            .map(String::as_str)
    }

    #[must_use]
    pub fn is_loaded(&self, module: &ModuleId) -> bool {
        self.loaded.iter().any(|loaded| loaded == module)
    }

    /// Active modules that carry an install-root marker, in load order.
    #[must_use]
    pub fn toolchain_modules(&self) -> Vec<ModuleId> {
        self.loaded
            .iter()
            .filter(|module| self.roots.contains_key(&module.marker_key()))
            .cloned()
            .collect()
    }
}
