use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use modulair_domain::ToolchainCatalog;
use serde::{Deserialize, Serialize};

use crate::errors::EnvError;

pub(crate) mod context;

pub const USER_ROOT_ENV: &str = "MODULAIR_USER_ROOT";
pub const GROUP_ROOT_ENV: &str = "MODULAIR_GROUP_ROOT";
pub const USER_ENV: &str = "MODULAIR_USER";
pub const TOOLCHAINS_ENV: &str = "MODULAIR_TOOLCHAINS";
pub const LOCK_TIMEOUT_ENV: &str = "MODULAIR_LOCK_TIMEOUT";
pub const MODULE_COMMAND_ENV: &str = "MODULAIR_MODULE_COMMAND";

const DEFAULT_GROUP_ROOT: &str = "/scratch/group";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_MODULE_COMMAND: &str = "module";
const ENVS_DIRNAME: &str = "virtual_envs";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalOptions {
    pub quiet: bool,
    pub verbose: u8,
    pub trace: bool,
    pub json: bool,
}

/// Frozen copy of the process environment taken at command start.
#[derive(Debug, Clone)]
pub struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    #[must_use]
    pub fn capture() -> Self {
        Self {
            vars: env::vars_os()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
        }
    }

    #[must_use]
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }

    #[must_use]
    pub fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) user: String,
    pub(crate) scopes: ScopeConfig,
    pub(crate) registry: RegistryConfig,
    pub(crate) modules: ModuleConfig,
    pub(crate) catalog_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ScopeConfig {
    pub user_root: PathBuf,
    pub group_root: PathBuf,
}

#[derive(Debug, Clone, Copy)]
pub struct RegistryConfig {
    pub lock_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct ModuleConfig {
    pub command: String,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if the acting user or personal root cannot be determined.
    pub fn from_env() -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture())
    }

    pub fn from_snapshot(snapshot: &EnvSnapshot) -> Result<Self> {
        Ok(Self {
            user: resolve_user(snapshot)?,
            scopes: ScopeConfig {
                user_root: resolve_user_root(snapshot)?,
                group_root: snapshot
                    .var(GROUP_ROOT_ENV)
                    .map_or_else(|| PathBuf::from(DEFAULT_GROUP_ROOT), PathBuf::from),
            },
            registry: RegistryConfig {
                lock_timeout: resolve_lock_timeout(snapshot)?,
            },
            modules: ModuleConfig {
                command: snapshot
                    .var(MODULE_COMMAND_ENV)
                    .unwrap_or(DEFAULT_MODULE_COMMAND)
                    .to_string(),
            },
            catalog_path: snapshot.var(TOOLCHAINS_ENV).map(PathBuf::from),
        })
    }

    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    #[must_use]
    pub fn scopes(&self) -> &ScopeConfig {
        &self.scopes
    }

    #[must_use]
    pub fn registry(&self) -> &RegistryConfig {
        &self.registry
    }

    #[must_use]
    pub fn modules(&self) -> &ModuleConfig {
        &self.modules
    }

    /// Loads the toolchain catalog used for explicit-version requests.
    ///
    /// # Errors
    /// Returns [`EnvError::InvalidToolchain`] if a configured catalog cannot be
    /// read or parsed.
    pub fn toolchain_catalog(&self) -> Result<ToolchainCatalog> {
        let Some(path) = &self.catalog_path else {
            return Ok(ToolchainCatalog::builtin());
        };
        let contents = fs::read_to_string(path).map_err(|err| EnvError::InvalidToolchain {
            reason: format!("cannot read toolchain catalog {}: {err}", path.display()),
        })?;
        ToolchainCatalog::from_json(&contents).map_err(|err| {
            EnvError::InvalidToolchain {
                reason: format!("{}: {err:#}", path.display()),
            }
            .into()
        })
    }
}

impl ScopeConfig {
    #[must_use]
    pub fn group_dir(&self, group: &str) -> PathBuf {
        self.group_root.join(group).join(ENVS_DIRNAME)
    }
}

fn scratch_user(snapshot: &EnvSnapshot) -> Option<String> {
    let scratch = snapshot.var("SCRATCH")?;
    Path::new(scratch.trim_end_matches('/'))
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

fn resolve_user(snapshot: &EnvSnapshot) -> Result<String> {
    snapshot
        .var(USER_ENV)
        .map(ToOwned::to_owned)
        .or_else(|| scratch_user(snapshot))
        .or_else(|| snapshot.var("USER").map(ToOwned::to_owned))
        .ok_or_else(|| anyhow!("unable to determine the current user; set {USER_ENV}"))
}

fn resolve_user_root(snapshot: &EnvSnapshot) -> Result<PathBuf> {
    if let Some(root) = snapshot.var(USER_ROOT_ENV) {
        return Ok(PathBuf::from(root));
    }
    if let Some(scratch) = snapshot.var("SCRATCH") {
        return Ok(PathBuf::from(scratch).join(ENVS_DIRNAME));
    }
    let home = dirs_next::home_dir()
        .ok_or_else(|| anyhow!("no personal environment root; set {USER_ROOT_ENV} or SCRATCH"))?;
    Ok(home.join(ENVS_DIRNAME))
}

fn resolve_lock_timeout(snapshot: &EnvSnapshot) -> Result<Duration> {
    let Some(raw) = snapshot.var(LOCK_TIMEOUT_ENV) else {
        return Ok(DEFAULT_LOCK_TIMEOUT);
    };
    let seconds: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid {LOCK_TIMEOUT_ENV} `{raw}`"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("invalid {LOCK_TIMEOUT_ENV} `{raw}`: expected a non-negative number of seconds");
    }
    Ok(Duration::from_secs_f64(seconds))
}
