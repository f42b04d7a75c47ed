//! Toolchain resolution: turns a create request into the exact, ordered
//! module list an environment is built with.

use anyhow::Result;
use modulair_domain::{ModuleId, ToolchainCatalog, ToolchainPlan, ToolchainSource};

use crate::errors::EnvError;

mod state;

pub use state::ModuleState;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ToolchainRequest {
    /// Use whatever toolchain is loaded right now.
    Detect,
    /// `-p VERSION`: look the interpreter up in the toolchain catalog.
    Version(String),
    /// `-t "mod1 mod2"`: taken verbatim, no search.
    Modules(Vec<ModuleId>),
}

impl ToolchainRequest {
    pub fn from_flags(python: Option<&str>, toolchain: Option<&str>) -> Result<Self> {
        match (python, toolchain) {
            (Some(_), Some(_)) => Err(EnvError::InvalidToolchain {
                reason: "`-p` and `-t` cannot be combined".to_string(),
            }
            .into()),
            (Some(version), None) => Ok(Self::Version(version.trim().to_string())),
            (None, Some(list)) => {
                let modules = list
                    .split_whitespace()
                    .map(ModuleId::parse)
                    .collect::<Result<Vec<_>>>()
                    .map_err(|err| EnvError::InvalidToolchain {
                        reason: err.to_string(),
                    })?;
                Ok(Self::Modules(modules))
            }
            (None, None) => Ok(Self::Detect),
        }
    }

    #[must_use]
    pub fn source(&self) -> ToolchainSource {
        match self {
            Self::Detect => ToolchainSource::Detected,
            Self::Version(_) => ToolchainSource::ExplicitVersion,
            Self::Modules(_) => ToolchainSource::ExplicitToolchain,
        }
    }
}

/// Resolves a request against the active module state or the catalog.
///
/// # Errors
/// [`EnvError::NoActiveToolchain`] when detecting without a loaded Python,
/// [`EnvError::UnknownLoadOrder`] when Lmod did not record the load order,
/// [`EnvError::NoMatchingToolchain`] when the catalog has no candidate, and
/// [`EnvError::InvalidToolchain`] for an empty explicit list.
pub fn resolve(
    request: &ToolchainRequest,
    state: &ModuleState,
    catalog: &ToolchainCatalog,
) -> Result<ToolchainPlan> {
    let mut plan = match request {
        ToolchainRequest::Detect => {
            if state.root("Python").is_none() {
                return Err(EnvError::NoActiveToolchain.into());
            }
            if state.loaded().is_empty() {
                return Err(EnvError::UnknownLoadOrder.into());
            }
            ToolchainPlan {
                modules: state.toolchain_modules(),
                python_version: state.version("Python").map(ToOwned::to_owned),
                source: request.source(),
            }
        }
        ToolchainRequest::Version(requested) => {
            let definition =
                catalog
                    .best_match(requested)
                    .ok_or_else(|| EnvError::NoMatchingToolchain {
                        requested: requested.clone(),
                    })?;
            ToolchainPlan {
                modules: definition.modules(),
                python_version: Some(definition.python.clone()),
                source: request.source(),
            }
        }
        ToolchainRequest::Modules(modules) => {
            if modules.is_empty() {
                return Err(EnvError::InvalidToolchain {
                    reason: "explicit toolchain lists no modules".to_string(),
                }
                .into());
            }
            ToolchainPlan {
                modules: modules.clone(),
                python_version: None,
                source: request.source(),
            }
        }
    };
    if plan.python_version.is_none() {
        plan.python_version = plan.interpreter_module().and_then(interpreter_version);
    }
    tracing::debug!(
        source = %plan.source,
        modules = ?plan.modules.iter().map(ToString::to_string).collect::<Vec<_>>(),
        python = ?plan.python_version,
        "toolchain resolved"
    );
    Ok(plan)
}

/// `Python/3.11.3-GCCcore-12.3.0` -> `3.11.3`.
fn interpreter_version(module: &ModuleId) -> Option<String> {
    module
        .version()
        .and_then(|version| version.split('-').next())
        .filter(|version| !version.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use modulair_domain::ToolchainDefinition;

    fn names(plan: &ToolchainPlan) -> Vec<String> {
        plan.modules.iter().map(ToString::to_string).collect()
    }

    fn error_of(err: &anyhow::Error) -> &EnvError {
        err.downcast_ref::<EnvError>().expect("typed error")
    }

    #[test]
    fn explicit_version_maps_to_compiler_and_interpreter() {
        let catalog = ToolchainCatalog {
            toolchains: vec![ToolchainDefinition {
                python: "3.11.5".to_string(),
                compiler: ModuleId::parse("gcccore/12.3").unwrap(),
                dependencies: Vec::new(),
                module: Some(ModuleId::parse("python/3.11.5").unwrap()),
            }],
        };
        let request = ToolchainRequest::Version("3.11.5".to_string());
        let plan = resolve(&request, &ModuleState::default(), &catalog).unwrap();
        assert_eq!(names(&plan), ["gcccore/12.3", "python/3.11.5"]);
        assert_eq!(plan.python_version.as_deref(), Some("3.11.5"));
        assert_eq!(plan.source, ToolchainSource::ExplicitVersion);

        let missing = ToolchainRequest::Version("3.12.1".to_string());
        let err = resolve(&missing, &ModuleState::default(), &catalog).unwrap_err();
        assert!(matches!(
            error_of(&err),
            EnvError::NoMatchingToolchain { requested } if requested == "3.12.1"
        ));
    }

    #[test]
    fn detect_requires_an_interpreter_marker() {
        let state = ModuleState::from_vars([
            ("LOADEDMODULES", "GCCcore/12.3.0"),
            ("EBROOTGCCCORE", "/sw/GCCcore"),
        ]);
        let err = resolve(&ToolchainRequest::Detect, &state, &ToolchainCatalog::default())
            .unwrap_err();
        assert!(matches!(error_of(&err), EnvError::NoActiveToolchain));
    }

    #[test]
    fn detect_refuses_markers_without_a_load_order() {
        let state = ModuleState::from_vars([
            ("EBROOTGCCCORE", "/sw/GCCcore"),
            ("EBVERSIONGCCCORE", "12.2.0"),
            ("EBROOTPYTHON", "/sw/Python"),
            ("EBVERSIONPYTHON", "3.10.8"),
        ]);
        let err = resolve(&ToolchainRequest::Detect, &state, &ToolchainCatalog::default())
            .unwrap_err();
        assert!(matches!(error_of(&err), EnvError::UnknownLoadOrder));
        assert_eq!(error_of(&err).kind(), crate::errors::ErrorKind::ResolutionFailure);
    }

    #[test]
    fn detect_reads_loaded_toolchain() {
        let state = ModuleState::from_vars([
            ("LOADEDMODULES", "GCCcore/12.3.0:Python/3.11.3-GCCcore-12.3.0"),
            ("EBROOTGCCCORE", "/sw/GCCcore"),
            ("EBROOTPYTHON", "/sw/Python"),
        ]);
        let plan = resolve(&ToolchainRequest::Detect, &state, &ToolchainCatalog::default())
            .unwrap();
        assert_eq!(
            names(&plan),
            ["GCCcore/12.3.0", "Python/3.11.3-GCCcore-12.3.0"]
        );
        assert_eq!(plan.python_version.as_deref(), Some("3.11.3"));
        assert_eq!(plan.source, ToolchainSource::Detected);
    }

    #[test]
    fn explicit_toolchain_is_taken_verbatim() {
        let request =
            ToolchainRequest::from_flags(None, Some("  foss/2023a  Python/3.11.3 cuda ")).unwrap();
        let plan = resolve(&request, &ModuleState::default(), &ToolchainCatalog::default())
            .unwrap();
        assert_eq!(names(&plan), ["foss/2023a", "Python/3.11.3", "cuda"]);
        assert_eq!(plan.python_version.as_deref(), Some("3.11.3"));

        let without_python = ToolchainRequest::from_flags(None, Some("foss/2023a")).unwrap();
        let plan = resolve(
            &without_python,
            &ModuleState::default(),
            &ToolchainCatalog::default(),
        )
        .unwrap();
        assert_eq!(plan.python_version, None);
    }

    #[test]
    fn flag_combinations_are_validated() {
        assert_eq!(
            ToolchainRequest::from_flags(None, None).unwrap(),
            ToolchainRequest::Detect
        );
        assert!(ToolchainRequest::from_flags(Some("3.11"), Some("Python/3.11")).is_err());
        let empty = ToolchainRequest::from_flags(None, Some("   ")).unwrap();
        let err = resolve(&empty, &ModuleState::default(), &ToolchainCatalog::default())
            .unwrap_err();
        assert!(matches!(error_of(&err), EnvError::InvalidToolchain { .. }));
    }
}
