//! One registry document per scope, mutated only under an exclusive lock and
//! replaced atomically so readers never see a partial write.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use modulair_domain::{EnvironmentRecord, RegistryDocument, Scope};

use crate::errors::EnvError;

mod lock;

pub(crate) use lock::RegistryLock;

pub const METADATA_FILENAME: &str = "metadata.json";
pub const LOCK_SUFFIX: &str = ".lock";

#[derive(Clone, Debug)]
pub struct RegistryHandle {
    scope: Scope,
    path: PathBuf,
    timeout: Duration,
}

impl RegistryHandle {
    /// No I/O happens here; a missing document reads as an empty registry.
    pub fn open(scope: Scope, path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            scope,
            path: path.into(),
            timeout,
        }
    }

    #[must_use]
    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(LOCK_SUFFIX);
        PathBuf::from(name)
    }

    /// Reads the whole document without locking.
    pub fn snapshot(&self) -> Result<RegistryDocument> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(RegistryDocument::default())
            }
            Err(err) if err.kind() == ErrorKind::PermissionDenied => {
                return Err(EnvError::ScopeUnavailable {
                    scope: self.scope.to_string(),
                    reason: format!("{}: {err}", self.path.display()),
                }
                .into())
            }
            Err(err) if err.kind() == ErrorKind::InvalidData => {
                return Err(self.malformed("document is not valid UTF-8"))
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read registry {}", self.path.display()))
            }
        };
        if contents.trim().is_empty() {
            return Err(self.malformed("document is empty"));
        }
        RegistryDocument::from_json(&contents).map_err(|err| self.malformed(&err.to_string()))
    }

    pub fn find(&self, name: &str) -> Result<Option<EnvironmentRecord>> {
        Ok(self.snapshot()?.get(name).cloned())
    }

    pub fn get(&self, name: &str) -> Result<EnvironmentRecord> {
        self.find(name)?.ok_or_else(|| self.not_found(name))
    }

    pub fn list(&self) -> Result<Vec<EnvironmentRecord>> {
        Ok(self.snapshot()?.records().cloned().collect())
    }

    /// Adds a record, re-checking the name under the lock.
    pub fn insert(&self, record: EnvironmentRecord) -> Result<()> {
        let name = record.name.clone();
        self.mutate(|document| {
            document.insert(record).map_err(|_| {
                EnvError::NameConflict {
                    name: name.clone(),
                    scope: self.scope.to_string(),
                    path: None,
                }
                .into()
            })
        })?;
        tracing::debug!(name = %name, registry = %self.path.display(), "registry record inserted");
        Ok(())
    }

    pub fn remove(&self, name: &str) -> Result<EnvironmentRecord> {
        let removed = self.mutate(|document| {
            document.remove(name).ok_or_else(|| self.not_found(name))
        })?;
        tracing::debug!(name, registry = %self.path.display(), "registry record removed");
        Ok(removed)
    }

    fn mutate<T>(&self, apply: impl FnOnce(&mut RegistryDocument) -> Result<T>) -> Result<T> {
        let _lock = RegistryLock::acquire(&self.lock_path(), &self.path, &self.scope, self.timeout)?;
        let mut document = self.snapshot()?;
        let value = apply(&mut document)?;
        self.write(&document)?;
        Ok(value)
    }

    fn write(&self, document: &RegistryDocument) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| anyhow!("registry path {} has no parent", self.path.display()))?;
        let rendered = document.to_json().context("failed to serialize registry")?;
        let mut temp = tempfile::Builder::new()
            .prefix(".metadata.")
            .suffix(".tmp")
            .tempfile_in(dir)
            .with_context(|| format!("failed to create temp file in {}", dir.display()))?;
        temp.write_all(rendered.as_bytes())
            .with_context(|| format!("failed to write {}", temp.path().display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = match fs::metadata(&self.path) {
                Ok(meta) => meta.permissions(),
                Err(_) => fs::Permissions::from_mode(match self.scope {
                    Scope::Personal => 0o644,
                    Scope::Group(_) => 0o664,
                }),
            };
            temp.as_file()
                .set_permissions(permissions)
                .with_context(|| format!("failed to set permissions on {}", temp.path().display()))?;
        }
        temp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync {}", temp.path().display()))?;
        temp.persist(&self.path)
            .map_err(|err| err.error)
            .with_context(|| format!("failed to replace registry {}", self.path.display()))?;
        Ok(())
    }

    fn malformed(&self, reason: &str) -> anyhow::Error {
        EnvError::MalformedRegistry {
            path: self.path.clone(),
            reason: reason.to_string(),
        }
        .into()
    }

    fn not_found(&self, name: &str) -> anyhow::Error {
        EnvError::NotFound {
            name: name.to_string(),
            searched: self.scope.to_string(),
        }
        .into()
    }
}

#[cfg(test)]
mod tests;
