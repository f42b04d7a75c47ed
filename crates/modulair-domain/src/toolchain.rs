use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use pep440_rs::Version;
use serde::{Deserialize, Serialize};

use crate::module::ModuleId;

/// How the toolchain of an environment was determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolchainSource {
    Detected,
    ExplicitVersion,
    ExplicitToolchain,
}

impl ToolchainSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ToolchainSource::Detected => "detected",
            ToolchainSource::ExplicitVersion => "explicit-version",
            ToolchainSource::ExplicitToolchain => "explicit-toolchain",
        }
    }
}

impl fmt::Display for ToolchainSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The concrete, ordered module set an environment is built with and later
/// re-activated with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolchainPlan {
    pub modules: Vec<ModuleId>,
    /// `None` only for explicit toolchains that do not name an interpreter
    /// module; the version is then probed from the loaded interpreter.
    pub python_version: Option<String>,
    pub source: ToolchainSource,
}

impl ToolchainPlan {
    #[must_use]
    pub fn interpreter_module(&self) -> Option<&ModuleId> {
        self.modules.iter().find(|module| module.is_named("python"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainDefinition {
    pub python: String,
    pub compiler: ModuleId,
    #[serde(default)]
    pub dependencies: Vec<ModuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleId>,
}

impl ToolchainDefinition {
    #[must_use]
    pub fn interpreter_module(&self) -> ModuleId {
        self.module
            .clone()
            .unwrap_or_else(|| ModuleId::new("Python", Some(&self.python)))
    }

    /// Load order: compiler core, dependencies, interpreter.
    #[must_use]
    pub fn modules(&self) -> Vec<ModuleId> {
        let mut modules = Vec::with_capacity(self.dependencies.len() + 2);
        modules.push(self.compiler.clone());
        modules.extend(self.dependencies.iter().cloned());
        modules.push(self.interpreter_module());
        modules
    }

    fn python_version(&self) -> Option<Version> {
        Version::from_str(&self.python).ok()
    }

    fn compiler_version(&self) -> Option<Version> {
        self.compiler
            .version()
            .and_then(|version| Version::from_str(version).ok())
    }

    fn extends(&self, requested: &str) -> bool {
        self.python
            .strip_prefix(requested)
            .is_some_and(|rest| rest.starts_with('.'))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainCatalog {
    #[serde(default)]
    pub toolchains: Vec<ToolchainDefinition>,
}

const BUILTIN_TOOLCHAINS: [(&str, &str); 8] = [
    ("3.8.6", "10.2.0"),
    ("3.9.5", "10.3.0"),
    ("3.9.6", "11.2.0"),
    ("3.10.4", "11.3.0"),
    ("3.10.8", "12.2.0"),
    ("3.11.3", "12.3.0"),
    ("3.11.5", "13.2.0"),
    ("3.12.3", "13.3.0"),
];

impl ToolchainCatalog {
    /// EasyBuild `Python-*-GCCcore-*` generations commonly deployed on clusters.
    #[must_use]
    pub fn builtin() -> Self {
        let toolchains = BUILTIN_TOOLCHAINS
            .iter()
            .map(|(python, gcccore)| ToolchainDefinition {
                python: (*python).to_string(),
                compiler: ModuleId::new("GCCcore", Some(gcccore)),
                dependencies: Vec::new(),
                module: Some(ModuleId::new(
                    "Python",
                    Some(&format!("{python}-GCCcore-{gcccore}")),
                )),
            })
            .collect();
        Self { toolchains }
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        serde_json::from_str(contents).context("toolchain catalog is not valid JSON")
    }

    /// Picks the definition for a requested interpreter version.
    ///
    /// Exact matches win over prefix matches (`3.11` extends to `3.11.x`).
    /// Among candidates the highest interpreter version wins, then the
    /// highest compiler-core version, then catalog order.
    #[must_use]
    pub fn best_match(&self, requested: &str) -> Option<&ToolchainDefinition> {
        let requested = requested.trim();
        if requested.is_empty() {
            return None;
        }
        let exact: Vec<&ToolchainDefinition> = self
            .toolchains
            .iter()
            .filter(|definition| definition.python == requested)
            .collect();
        let candidates = if exact.is_empty() {
            self.toolchains
                .iter()
                .filter(|definition| definition.extends(requested))
                .collect()
        } else {
            exact
        };

        let mut best: Option<(&ToolchainDefinition, (Option<Version>, Option<Version>))> = None;
        for candidate in candidates {
            let key = (candidate.python_version(), candidate.compiler_version());
            match &best {
                Some((_, best_key)) if key <= *best_key => {}
                _ => best = Some((candidate, key)),
            }
        }
        best.map(|(definition, _)| definition)
    }
}
