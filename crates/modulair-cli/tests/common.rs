#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use assert_cmd::cargo::cargo_bin_cmd;
use serde_json::{json, Value};
use tempfile::TempDir;

/// A scratch cluster layout: `alice/virtual_envs` for the personal scope and
/// `group/<G>/virtual_envs` for group scopes.
pub struct Cluster {
    pub temp: TempDir,
}

impl Cluster {
    pub fn new() -> Self {
        let temp = tempfile::Builder::new()
            .prefix("modulair-cli")
            .tempdir()
            .expect("tempdir");
        Self { temp }
    }

    pub fn user_root(&self) -> PathBuf {
        self.temp.path().join("alice").join("virtual_envs")
    }

    pub fn group_root(&self, group: &str) -> PathBuf {
        self.temp.path().join("group").join(group).join("virtual_envs")
    }

    /// `modulair` with the cluster's roots, a no-op module command and no
    /// toolchain markers inherited from the host.
    pub fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("modulair");
        cmd.env("MODULAIR_USER", "alice")
            .env("MODULAIR_USER_ROOT", self.user_root())
            .env("MODULAIR_GROUP_ROOT", self.temp.path().join("group"))
            .env("MODULAIR_MODULE_COMMAND", ":")
            .env("MODULAIR_LOCK_TIMEOUT", "2")
            .env("NO_COLOR", "1")
            .env_remove("LOADEDMODULES")
            .env_remove("EBROOTPYTHON")
            .env_remove("EBVERSIONPYTHON")
            .env_remove("EBROOTGCCCORE")
            .env_remove("EBVERSIONGCCCORE")
            .env_remove("MODULAIR_TOOLCHAINS")
            .env_remove("SCRATCH");
        cmd
    }

    /// Writes a personal registry holding `names`, each with an environment
    /// directory that has an activation script.
    pub fn seed_personal(&self, names: &[&str]) {
        seed(&self.user_root(), names, None);
    }

    pub fn seed_group(&self, group: &str, names: &[&str]) {
        seed(&self.group_root(group), names, Some(group));
    }
}

fn seed(root: &Path, names: &[&str], group: Option<&str>) {
    let mut environments = Vec::new();
    for name in names {
        let path = root.join(name);
        fs::create_dir_all(path.join("bin")).expect("env dir");
        fs::write(path.join("bin").join("activate"), "# activate\n").expect("activate");
        environments.push(record(name, &path, group));
    }
    write_registry(root, &json!({ "environments": environments }).to_string());
}

pub fn record(name: &str, path: &Path, group: Option<&str>) -> Value {
    json!({
        "name": name,
        "description": format!("{name} stack"),
        "owner": { "user": "alice", "group": group },
        "python_version": "3.11.3",
        "toolchain_modules": ["GCCcore/12.3.0", "Python/3.11.3-GCCcore-12.3.0"],
        "toolchain_source": "explicit-version",
        "created_at": "2026-10-17T09:30:00Z",
        "path": path,
    })
}

pub fn write_registry(root: &Path, contents: &str) {
    fs::create_dir_all(root).expect("scope root");
    fs::write(root.join("metadata.json"), contents).expect("metadata");
}

pub fn read_registry(root: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(root.join("metadata.json")).expect("read"))
        .expect("registry json")
}

pub fn parse_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("json envelope")
}

/// A host interpreter that can build virtual environments, if there is one.
pub fn find_python() -> Option<PathBuf> {
    for candidate in ["python3", "python"] {
        let ok = Command::new(candidate)
            .args(["-c", "import ensurepip, venv"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);
        if ok {
            let output = Command::new(candidate)
                .args(["-c", "import sys; print(sys.executable)"])
                .output()
                .ok()?;
            let path = String::from_utf8(output.stdout).ok()?;
            return Some(PathBuf::from(path.trim()));
        }
    }
    None
}
