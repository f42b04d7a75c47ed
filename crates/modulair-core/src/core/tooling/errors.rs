use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::outcome::ExecutionOutcome;

/// Failure categories surfaced to the invoker, each with its own exit code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    Conflict,
    ResolutionFailure,
    LockTimeout,
    MalformedRegistry,
    CreationFailed,
    DeleteFailed,
}

impl ErrorKind {
    #[must_use]
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::InvalidInput => 1,
            ErrorKind::NotFound => 3,
            ErrorKind::Conflict => 4,
            ErrorKind::ResolutionFailure => 5,
            ErrorKind::LockTimeout => 6,
            ErrorKind::MalformedRegistry => 7,
            ErrorKind::CreationFailed => 8,
            ErrorKind::DeleteFailed => 9,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum EnvError {
    #[error("no Python toolchain is loaded")]
    NoActiveToolchain,
    #[error("the loaded toolchain has no recorded load order (LOADEDMODULES is unset)")]
    UnknownLoadOrder,
    #[error("no known toolchain provides Python {requested}")]
    NoMatchingToolchain { requested: String },
    #[error("invalid toolchain: {reason}")]
    InvalidToolchain { reason: String },
    #[error("invalid name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },
    #[error("environment `{name}` already exists in {scope}")]
    NameConflict {
        name: String,
        scope: String,
        path: Option<PathBuf>,
    },
    #[error("environment `{name}` not found in {searched}")]
    NotFound { name: String, searched: String },
    #[error("registry {} is locked by another process (waited {:.1}s)", .path.display(), .waited.as_secs_f64())]
    RegistryLocked { path: PathBuf, waited: Duration },
    #[error("registry {} is malformed: {reason}", .path.display())]
    MalformedRegistry { path: PathBuf, reason: String },
    #[error("failed to load modules {modules}: {reason}")]
    ModuleLoadFailed { modules: String, reason: String },
    #[error("failed to create environment `{name}`: {reason}")]
    CreationFailed { name: String, reason: String },
    #[error("failed to remove {} for `{name}`: {reason}; the registry record was kept", .path.display())]
    PartialDeleteFailure {
        name: String,
        path: PathBuf,
        reason: String,
    },
    #[error("refusing to delete {} for `{name}`: it is outside the scope directory", .path.display())]
    UnsafeEnvironmentPath { name: String, path: PathBuf },
    #[error("environment `{name}` has no activation script at {}", .path.display())]
    ActivationScriptMissing { name: String, path: PathBuf },
    #[error("{scope} registry is unavailable: {reason}")]
    ScopeUnavailable { scope: String, reason: String },
}

impl EnvError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            EnvError::InvalidToolchain { .. }
            | EnvError::InvalidName { .. }
            | EnvError::ScopeUnavailable { .. } => ErrorKind::InvalidInput,
            EnvError::NotFound { .. } | EnvError::ActivationScriptMissing { .. } => {
                ErrorKind::NotFound
            }
            EnvError::NameConflict { .. } => ErrorKind::Conflict,
            EnvError::NoActiveToolchain
            | EnvError::UnknownLoadOrder
            | EnvError::NoMatchingToolchain { .. }
            | EnvError::ModuleLoadFailed { .. } => ErrorKind::ResolutionFailure,
            EnvError::RegistryLocked { .. } => ErrorKind::LockTimeout,
            EnvError::MalformedRegistry { .. } => ErrorKind::MalformedRegistry,
            EnvError::CreationFailed { .. } => ErrorKind::CreationFailed,
            EnvError::PartialDeleteFailure { .. } | EnvError::UnsafeEnvironmentPath { .. } => {
                ErrorKind::DeleteFailed
            }
        }
    }

    fn reason(&self) -> &'static str {
        match self {
            EnvError::NoActiveToolchain => "no_active_toolchain",
            EnvError::UnknownLoadOrder => "unknown_load_order",
            EnvError::NoMatchingToolchain { .. } => "no_matching_toolchain",
            EnvError::InvalidToolchain { .. } => "invalid_toolchain",
            EnvError::InvalidName { .. } => "invalid_name",
            EnvError::NameConflict { .. } => "name_conflict",
            EnvError::NotFound { .. } => "not_found",
            EnvError::RegistryLocked { .. } => "registry_locked",
            EnvError::MalformedRegistry { .. } => "malformed_registry",
            EnvError::ModuleLoadFailed { .. } => "module_load_failed",
            EnvError::CreationFailed { .. } => "creation_failed",
            EnvError::PartialDeleteFailure { .. } => "partial_delete_failure",
            EnvError::UnsafeEnvironmentPath { .. } => "unsafe_environment_path",
            EnvError::ActivationScriptMissing { .. } => "activation_script_missing",
            EnvError::ScopeUnavailable { .. } => "scope_unavailable",
        }
    }

    fn hint(&self) -> Option<String> {
        let hint = match self {
            EnvError::NoActiveToolchain => {
                "load a Python module first, or pass `-p VERSION` or `-t \"MODULES\"`".to_string()
            }
            EnvError::UnknownLoadOrder => {
                "load the toolchain with Lmod, or name the modules explicitly with `-t`".to_string()
            }
            EnvError::NoMatchingToolchain { .. } => {
                "pass a listed Python version, or name the modules explicitly with `-t`".to_string()
            }
            EnvError::NameConflict {
                path: Some(path), ..
            } => format!(
                "{} exists but is not registered; remove it or run `modulair doctor`",
                path.display()
            ),
            EnvError::NameConflict { .. } => {
                "choose another name or delete the existing environment".to_string()
            }
            EnvError::NotFound { .. } => "run `modulair list` to see available environments".to_string(),
            EnvError::RegistryLocked { .. } => {
                "another modulair command is updating this registry; re-run once it finishes"
                    .to_string()
            }
            EnvError::MalformedRegistry { path, .. } => format!(
                "repair or restore {} by hand; it was not modified",
                path.display()
            ),
            EnvError::ModuleLoadFailed { .. } => {
                "check `module avail`, or set MODULAIR_MODULE_COMMAND".to_string()
            }
            EnvError::PartialDeleteFailure { path, .. } => format!(
                "remove {} manually, then re-run `modulair delete`",
                path.display()
            ),
            _ => return None,
        };
        Some(hint)
    }

    fn details(&self) -> Value {
        let mut details = json!({ "reason": self.reason(), "kind": self.kind() });
        match self {
            EnvError::NameConflict {
                name,
                scope,
                path,
            } => {
                details["name"] = json!(name);
                details["scope"] = json!(scope);
                if let Some(path) = path {
                    details["path"] = json!(path);
                }
            }
            EnvError::NotFound { name, searched } => {
                details["name"] = json!(name);
                details["searched"] = json!(searched);
            }
            EnvError::NoMatchingToolchain { requested } => {
                details["requested"] = json!(requested);
            }
            EnvError::RegistryLocked { path, waited } => {
                details["path"] = json!(path);
                details["waited_secs"] = json!(waited.as_secs_f64());
            }
            EnvError::MalformedRegistry { path, .. } => {
                details["path"] = json!(path);
            }
            EnvError::PartialDeleteFailure { name, path, .. } => {
                details["name"] = json!(name);
                details["path"] = json!(path);
                details["record_retained"] = json!(true);
            }
            _ => {}
        }
        if let Some(hint) = self.hint() {
            details["hint"] = json!(hint);
        }
        details
    }
}

/// Shapes any command error into an outcome, keeping typed failures distinct.
#[must_use]
pub fn error_outcome(err: &anyhow::Error) -> ExecutionOutcome {
    if let Some(env_err) = err.downcast_ref::<EnvError>() {
        let message = env_err.to_string();
        let details = env_err.details();
        let outcome = match env_err.kind() {
            ErrorKind::CreationFailed | ErrorKind::DeleteFailed => {
                ExecutionOutcome::failure(message, details)
            }
            _ => ExecutionOutcome::user_error(message, details),
        };
        return outcome.with_kind(env_err.kind());
    }
    let issues: Vec<String> = err.chain().map(std::string::ToString::to_string).collect();
    ExecutionOutcome::failure(
        err.to_string(),
        json!({
            "reason": "internal_error",
            "error": format!("{err:#}"),
            "issues": issues,
            "hint": "Re-run with `-vv` for more detail.",
        }),
    )
}
