use std::path::{Component, Path, PathBuf};

use anyhow::Result;
use modulair_domain::Scope;

use crate::config::Config;
use crate::core::registry::{RegistryHandle, LOCK_SUFFIX, METADATA_FILENAME};
use crate::errors::EnvError;

const MAX_NAME_LEN: usize = 64;

/// Where a scope keeps its registry document and environment directories.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeLayout {
    scope: Scope,
    root: PathBuf,
}

impl ScopeLayout {
    pub fn resolve(config: &Config, scope: &Scope) -> Result<Self> {
        let root = match scope {
            Scope::Personal => config.scopes().user_root.clone(),
            Scope::Group(group) => {
                validate_name(group).map_err(|reason| EnvError::InvalidName {
                    name: group.clone(),
                    reason,
                })?;
                config.scopes().group_dir(group)
            }
        };
        Ok(Self {
            scope: scope.clone(),
            root,
        })
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILENAME)
    }

    #[must_use]
    pub fn environment_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    #[must_use]
    pub fn registry(&self, config: &Config) -> RegistryHandle {
        RegistryHandle::open(
            self.scope.clone(),
            self.metadata_path(),
            config.registry().lock_timeout,
        )
    }

    /// True when `path` is a strict descendant of the scope root.
    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        if path
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return false;
        }
        path.starts_with(&self.root) && path != self.root
    }
}

/// Environment and group names double as directory names.
pub(crate) fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name is empty".to_string());
    }
    if name.len() > MAX_NAME_LEN {
        return Err(format!("name is longer than {MAX_NAME_LEN} characters"));
    }
    if name.starts_with('.') || name.starts_with('-') {
        return Err("name may not start with `.` or `-`".to_string());
    }
    if name == METADATA_FILENAME
        || name
            .strip_prefix(METADATA_FILENAME)
            .is_some_and(|rest| rest == LOCK_SUFFIX)
    {
        return Err("name is reserved".to_string());
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("character `{bad}` is not allowed"));
    }
    Ok(())
}
