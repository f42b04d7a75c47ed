use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use modulair_domain::ModuleId;

use super::modules::load_into_process;
use super::process::run_command;
use crate::config::{EnvSnapshot, ModuleConfig};
use crate::core::toolchain::ModuleState;

/// The cluster's environment-module system as seen from this process.
pub trait ModuleSystem: Send + Sync {
    /// Load markers and load order of the modules active right now.
    fn current(&self) -> Result<ModuleState>;
    /// Loads `modules` in the given order into this process; additive.
    fn load(&self, modules: &[ModuleId]) -> Result<()>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PythonDetails {
    pub full_version: String,
    pub executable: String,
}

pub trait PythonRuntime: Send + Sync {
    /// Interpreter provided by the currently loaded toolchain.
    fn interpreter(&self, state: &ModuleState) -> Result<PathBuf>;
    fn inspect(&self, python: &Path) -> Result<PythonDetails>;
    /// Builds an isolated environment in `target`, which already exists and is empty.
    fn create_venv(&self, python: &Path, target: &Path) -> Result<()>;
}

pub trait Accounts: Send + Sync {
    /// Groups of the acting user, in the order the system reports them.
    fn groups(&self) -> Result<Vec<String>>;
}

pub trait FileSystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Non-recursive create that fails with `AlreadyExists` if `path` exists.
    fn claim_dir(&self, path: &Path) -> io::Result<()>;
    fn remove_dir_all(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn list_dir(&self, path: &Path) -> Result<Vec<String>>;
}

pub trait Effects: Send + Sync {
    fn modules(&self) -> &dyn ModuleSystem;
    fn python(&self) -> &dyn PythonRuntime;
    fn accounts(&self) -> &dyn Accounts;
    fn fs(&self) -> &dyn FileSystem;
}

pub struct SystemEffects {
    modules: Arc<SystemModuleSystem>,
    python: Arc<SystemPythonRuntime>,
    accounts: Arc<SystemAccounts>,
    fs: Arc<SystemFileSystem>,
}

impl SystemEffects {
    #[must_use]
    pub fn new(modules: &ModuleConfig) -> Self {
        Self {
            modules: Arc::new(SystemModuleSystem {
                command: modules.command.clone(),
            }),
            python: Arc::new(SystemPythonRuntime),
            accounts: Arc::new(SystemAccounts),
            fs: Arc::new(SystemFileSystem),
        }
    }
}

impl Effects for SystemEffects {
    fn modules(&self) -> &dyn ModuleSystem {
        self.modules.as_ref()
    }

    fn python(&self) -> &dyn PythonRuntime {
        self.python.as_ref()
    }

    fn accounts(&self) -> &dyn Accounts {
        self.accounts.as_ref()
    }

    fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }
}

struct SystemModuleSystem {
    command: String,
}

impl ModuleSystem for SystemModuleSystem {
    fn current(&self) -> Result<ModuleState> {
        Ok(ModuleState::from_snapshot(&EnvSnapshot::capture()))
    }

    fn load(&self, modules: &[ModuleId]) -> Result<()> {
        load_into_process(&self.command, modules)
    }
}

struct SystemPythonRuntime;

impl PythonRuntime for SystemPythonRuntime {
    fn interpreter(&self, state: &ModuleState) -> Result<PathBuf> {
        if let Some(root) = state.root("Python") {
            for candidate in ["python3", "python"] {
                let path = root.join("bin").join(candidate);
                if path.is_file() {
                    return Ok(path);
                }
            }
            bail!("no python executable under {}", root.join("bin").display());
        }
        which::which("python3").context("no python3 on PATH and no Python module loaded")
    }

    fn inspect(&self, python: &Path) -> Result<PythonDetails> {
        const SCRIPT: &str =
            "import json, platform, sys; print(json.dumps({'version': platform.python_version(), 'executable': sys.executable}))";
        let program = python.to_string_lossy();
        let output = run_command(&program, &["-c".to_string(), SCRIPT.to_string()])
            .with_context(|| format!("failed to inspect python at {}", python.display()))?;
        if !output.success() {
            bail!(
                "python exited with {} while probing: {}",
                output.code,
                output.stderr_summary()
            );
        }
        let payload: serde_json::Value = serde_json::from_str(output.stdout.trim())
            .context("invalid interpreter inspection payload")?;
        let field = |name: &str| {
            payload
                .get(name)
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
                .ok_or_else(|| anyhow!("python inspection missing {name}"))
        };
        Ok(PythonDetails {
            full_version: field("version")?,
            executable: field("executable")?,
        })
    }

    fn create_venv(&self, python: &Path, target: &Path) -> Result<()> {
        let program = python.to_string_lossy();
        let output = run_command(
            &program,
            &[
                "-m".to_string(),
                "venv".to_string(),
                target.to_string_lossy().into_owned(),
            ],
        )?;
        if !output.success() {
            bail!("`python -m venv` failed: {}", output.stderr_summary());
        }
        Ok(())
    }
}

struct SystemAccounts;

impl Accounts for SystemAccounts {
    fn groups(&self) -> Result<Vec<String>> {
        let output = run_command("groups", &[])?;
        if !output.success() {
            bail!("`groups` failed: {}", output.stderr_summary());
        }
        Ok(parse_groups(&output.stdout))
    }
}

/// Accepts both `g1 g2` and the `user : g1 g2` form some systems print.
fn parse_groups(stdout: &str) -> Vec<String> {
    let list = stdout
        .split_once(" : ")
        .map_or(stdout, |(_, groups)| groups);
    let mut groups: Vec<String> = Vec::new();
    for group in list.split_whitespace() {
        if !groups.iter().any(|known| known == group) {
            groups.push(group.to_string());
        }
    }
    groups
}

struct SystemFileSystem;

impl FileSystem for SystemFileSystem {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).with_context(|| format!("creating {}", path.display()))
    }

    fn claim_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        super::fs::remove_dir_all_writable(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries =
            fs::read_dir(path).with_context(|| format!("reading dir {}", path.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("reading dir {}", path.display()))?;
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names)
    }
}

pub type SharedEffects = Arc<dyn Effects>;
