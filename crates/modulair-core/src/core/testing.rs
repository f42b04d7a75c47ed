//! In-memory stand-ins for the module system, interpreter and accounts, with
//! a real filesystem rooted in a temp dir.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use modulair_domain::{
    marker_key, EnvironmentRecord, ModuleId, Owner, ToolchainSource, ROOT_MARKER_PREFIX,
    VERSION_MARKER_PREFIX,
};
use serde_json::Map;
use tempfile::TempDir;

use crate::config::context::CommandContext;
use crate::config::{Config, EnvSnapshot, GlobalOptions};
use crate::core::toolchain::ModuleState;
use crate::effects::{
    Accounts, Effects, FileSystem, ModuleSystem, PythonDetails, PythonRuntime, SharedEffects,
};
use crate::errors::EnvError;

pub(crate) fn sample_record(name: &str, root: &Path) -> EnvironmentRecord {
    EnvironmentRecord {
        name: name.to_string(),
        description: None,
        owner: Owner {
            user: "alice".to_string(),
            group: None,
        },
        python_version: "3.11.3".to_string(),
        toolchain_modules: vec![
            ModuleId::new("GCCcore", Some("12.3.0")),
            ModuleId::new("Python", Some("3.11.3-GCCcore-12.3.0")),
        ],
        toolchain_source: ToolchainSource::ExplicitVersion,
        created_at: "2026-10-17T09:30:00Z".to_string(),
        path: root.join(name),
        extra: Map::new(),
    }
}

pub(crate) fn module_ids(raw: &[&str]) -> Vec<ModuleId> {
    raw.iter()
        .map(|module| ModuleId::parse(module).expect("module id"))
        .collect()
}

pub(crate) struct FakeModules {
    install_root: PathBuf,
    vars: Mutex<Vec<(String, String)>>,
    loads: Mutex<Vec<Vec<ModuleId>>>,
    unavailable: Mutex<Vec<String>>,
}

impl FakeModules {
    fn new(install_root: PathBuf) -> Self {
        Self {
            install_root,
            vars: Mutex::new(Vec::new()),
            loads: Mutex::new(Vec::new()),
            unavailable: Mutex::new(Vec::new()),
        }
    }

    /// Marks modules active without recording a load.
    pub(crate) fn preload(&self, modules: &[&str]) {
        for module in module_ids(modules) {
            self.activate(&module);
        }
    }

    pub(crate) fn mark_unavailable(&self, module: &str) {
        self.unavailable
            .lock()
            .expect("lock")
            .push(module.to_string());
    }

    pub(crate) fn loads(&self) -> Vec<Vec<String>> {
        self.loads
            .lock()
            .expect("lock")
            .iter()
            .map(|batch| batch.iter().map(ToString::to_string).collect())
            .collect()
    }

    fn activate(&self, module: &ModuleId) {
        let mut vars = self.vars.lock().expect("lock");
        let key = marker_key(module.name());
        let root = self
            .install_root
            .join(module.name())
            .join(module.version().unwrap_or("default"));
        let mut loaded = vars
            .iter()
            .find(|(name, _)| name == "LOADEDMODULES")
            .map(|(_, value)| value.clone())
            .unwrap_or_default();
        vars.retain(|(name, _)| {
            name != "LOADEDMODULES"
                && *name != format!("{ROOT_MARKER_PREFIX}{key}")
                && *name != format!("{VERSION_MARKER_PREFIX}{key}")
        });
        if !loaded.is_empty() {
            loaded.push(':');
        }
        loaded.push_str(&module.to_string());
        vars.push(("LOADEDMODULES".to_string(), loaded));
        vars.push((
            format!("{ROOT_MARKER_PREFIX}{key}"),
            root.to_string_lossy().into_owned(),
        ));
        if let Some(version) = module.version() {
            let bare = version.split('-').next().unwrap_or(version);
            vars.push((format!("{VERSION_MARKER_PREFIX}{key}"), bare.to_string()));
        }
    }
}

impl ModuleSystem for FakeModules {
    fn current(&self) -> Result<ModuleState> {
        let vars = self.vars.lock().expect("lock");
        Ok(ModuleState::from_vars(
            vars.iter().map(|(key, value)| (key.as_str(), value.as_str())),
        ))
    }

    fn load(&self, modules: &[ModuleId]) -> Result<()> {
        let unavailable = self.unavailable.lock().expect("lock").clone();
        if let Some(missing) = modules
            .iter()
            .find(|module| unavailable.contains(&module.to_string()))
        {
            return Err(EnvError::ModuleLoadFailed {
                modules: missing.to_string(),
                reason: "module not found".to_string(),
            }
            .into());
        }
        self.loads.lock().expect("lock").push(modules.to_vec());
        for module in modules {
            self.activate(module);
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakePython {
    pub(crate) fail_venv: AtomicBool,
}

impl PythonRuntime for FakePython {
    fn interpreter(&self, state: &ModuleState) -> Result<PathBuf> {
        state
            .root("Python")
            .map(|root| root.join("bin").join("python3"))
            .ok_or_else(|| anyhow!("no Python module loaded"))
    }

    fn inspect(&self, python: &Path) -> Result<PythonDetails> {
        let version = python
            .parent()
            .and_then(Path::parent)
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().split('-').next().unwrap_or("").to_string())
            .filter(|version| !version.is_empty() && version != "default")
            .unwrap_or_else(|| "3.11.3".to_string());
        Ok(PythonDetails {
            full_version: version,
            executable: python.display().to_string(),
        })
    }

    fn create_venv(&self, _python: &Path, target: &Path) -> Result<()> {
        fs::write(target.join("pyvenv.cfg"), "home = /fake\n")?;
        if self.fail_venv.load(Ordering::SeqCst) {
            bail!("ensurepip exited with 1");
        }
        fs::create_dir_all(target.join("bin"))?;
        fs::write(target.join("bin").join("activate"), "# activate\n")?;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct FakeAccounts {
    groups: Mutex<Vec<String>>,
}

impl FakeAccounts {
    pub(crate) fn set(&self, groups: &[&str]) {
        *self.groups.lock().expect("lock") = groups.iter().map(ToString::to_string).collect();
    }
}

impl Accounts for FakeAccounts {
    fn groups(&self) -> Result<Vec<String>> {
        Ok(self.groups.lock().expect("lock").clone())
    }
}

#[derive(Default)]
pub(crate) struct LocalFs {
    pub(crate) fail_remove: AtomicBool,
}

impl FileSystem for LocalFs {
    fn create_dir_all(&self, path: &Path) -> Result<()> {
        Ok(fs::create_dir_all(path)?)
    }

    fn claim_dir(&self, path: &Path) -> io::Result<()> {
        fs::create_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        if self.fail_remove.load(Ordering::SeqCst) {
            bail!("Device or resource busy");
        }
        Ok(fs::remove_dir_all(path)?)
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_dir(&self, path: &Path) -> Result<Vec<String>> {
        let mut names = fs::read_dir(path)?
            .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
            .collect::<io::Result<Vec<_>>>()?;
        names.sort();
        Ok(names)
    }
}

pub(crate) struct FakeEffects {
    pub(crate) modules: FakeModules,
    pub(crate) python: FakePython,
    pub(crate) accounts: FakeAccounts,
    pub(crate) fs: LocalFs,
}

impl Effects for FakeEffects {
    fn modules(&self) -> &dyn ModuleSystem {
        &self.modules
    }

    fn python(&self) -> &dyn PythonRuntime {
        &self.python
    }

    fn accounts(&self) -> &dyn Accounts {
        &self.accounts
    }

    fn fs(&self) -> &dyn FileSystem {
        &self.fs
    }
}

/// A scratch cluster: personal and group roots under one temp dir.
pub(crate) struct Harness {
    pub(crate) temp: TempDir,
    pub(crate) effects: Arc<FakeEffects>,
    pub(crate) config: Config,
    global: GlobalOptions,
}

impl Harness {
    pub(crate) fn new() -> Self {
        let temp = TempDir::new().expect("tempdir");
        let user_root = temp.path().join("alice").join("virtual_envs");
        let group_root = temp.path().join("group");
        let snapshot = EnvSnapshot::from_pairs(&[
            ("MODULAIR_USER", "alice"),
            ("MODULAIR_USER_ROOT", user_root.to_str().expect("utf8 path")),
            ("MODULAIR_GROUP_ROOT", group_root.to_str().expect("utf8 path")),
            ("MODULAIR_LOCK_TIMEOUT", "5"),
        ]);
        let config = Config::from_snapshot(&snapshot).expect("config");
        let effects = Arc::new(FakeEffects {
            modules: FakeModules::new(temp.path().join("software")),
            python: FakePython::default(),
            accounts: FakeAccounts::default(),
            fs: LocalFs::default(),
        });
        Self {
            temp,
            effects,
            config,
            global: GlobalOptions::default(),
        }
    }

    pub(crate) fn ctx(&self) -> CommandContext<'_> {
        let effects: SharedEffects = self.effects.clone();
        CommandContext::with_config(&self.global, self.config.clone(), effects)
    }

    pub(crate) fn user_root(&self) -> PathBuf {
        self.config.scopes().user_root.clone()
    }

    pub(crate) fn group_root(&self, group: &str) -> PathBuf {
        self.config.scopes().group_dir(group)
    }
}

pub(crate) fn env_error(err: &anyhow::Error) -> &EnvError {
    err.downcast_ref::<EnvError>()
        .unwrap_or_else(|| panic!("expected a typed error, got {err:#}"))
}

/// Writes an empty registry at `path` and strips every permission bit.
/// Returns `false` when the file is still readable, as it is for root.
#[cfg(unix)]
pub(crate) fn write_unreadable_registry(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("mkdir");
    }
    fs::write(path, "{\"environments\": []}").expect("write");
    fs::set_permissions(path, fs::Permissions::from_mode(0o000)).expect("chmod");
    fs::read(path).is_err()
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().expect("log buffer").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Runs `f` on this thread with a subscriber that keeps `WARN` and above,
/// returning what was logged.
pub(crate) fn capture_warnings<T>(f: impl FnOnce() -> T) -> (T, String) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let value = tracing::subscriber::with_default(subscriber, f);
    let logged = String::from_utf8_lossy(&buffer.0.lock().expect("log buffer")).into_owned();
    (value, logged)
}
