//! Create, activate and delete named environments, keeping each scope's
//! registry consistent with what is on disk.

use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Result;
use modulair_domain::{EnvironmentRecord, ModuleId, Owner, Scope, ToolchainCatalog};
use serde_json::Map;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::config::context::CommandContext;
use crate::core::scopes::{validate_name, ScopeLayout};
use crate::core::toolchain::{resolve, ToolchainRequest};
use crate::errors::EnvError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub description: Option<String>,
    pub toolchain: ToolchainRequest,
    pub group: Option<String>,
}

/// What a shell needs to enter an environment: the modules to replay and the
/// script to source afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct ActivationHandoff {
    pub scope: Scope,
    pub record: EnvironmentRecord,
    pub script: PathBuf,
}

pub fn create_environment(ctx: &CommandContext, request: &CreateRequest) -> Result<EnvironmentRecord> {
    let name = request.name.as_str();
    validate_name(name).map_err(|reason| EnvError::InvalidName {
        name: name.to_string(),
        reason,
    })?;
    let scope = request
        .group
        .clone()
        .map_or(Scope::Personal, Scope::Group);
    let layout = ScopeLayout::resolve(ctx.config(), &scope)?;
    let registry = layout.registry(ctx.config());
    if registry.find(name)?.is_some() {
        return Err(conflict(name, &scope, None));
    }

    let state = ctx.modules().current()?;
    let catalog = match request.toolchain {
        ToolchainRequest::Version(_) => ctx.config().toolchain_catalog()?,
        _ => ToolchainCatalog::default(),
    };
    let plan = resolve(&request.toolchain, &state, &catalog)?;

    let pending: Vec<ModuleId> = plan
        .modules
        .iter()
        .filter(|module| !state.is_loaded(module))
        .cloned()
        .collect();
    if !pending.is_empty() {
        ctx.modules().load(&pending)?;
    }
    let state = ctx.modules().current()?;
    let python = ctx
        .python()
        .interpreter(&state)
        .map_err(|err| creation_failed(name, &err))?;
    let details = ctx
        .python()
        .inspect(&python)
        .map_err(|err| creation_failed(name, &err))?;
    tracing::debug!(
        python = %details.executable,
        version = %details.full_version,
        "interpreter selected"
    );

    ctx.fs().create_dir_all(layout.root()).map_err(|err| {
        EnvError::ScopeUnavailable {
            scope: scope.to_string(),
            reason: format!("{err:#}"),
        }
    })?;
    let target = layout.environment_path(name);
    match ctx.fs().claim_dir(&target) {
        Ok(()) => {}
        Err(err) if err.kind() == IoErrorKind::AlreadyExists => {
            return Err(conflict(name, &scope, Some(target)));
        }
        Err(err) => {
            return Err(EnvError::CreationFailed {
                name: name.to_string(),
                reason: format!("{}: {err}", target.display()),
            }
            .into())
        }
    }

    let record = EnvironmentRecord {
        name: name.to_string(),
        description: request.description.clone(),
        owner: Owner {
            user: ctx.config().user().to_string(),
            group: scope.group_name().map(ToOwned::to_owned),
        },
        python_version: plan
            .python_version
            .clone()
            .unwrap_or_else(|| details.full_version.clone()),
        toolchain_modules: plan.modules.clone(),
        toolchain_source: plan.source,
        created_at: timestamp(),
        path: target.clone(),
        extra: Map::new(),
    };

    let built = ctx
        .python()
        .create_venv(&python, &target)
        .map_err(|err| creation_failed(name, &err))
        .and_then(|()| registry.insert(record.clone()));
    if let Err(err) = built {
        roll_back(ctx, &target);
        return Err(err);
    }
    tracing::info!(name, scope = %scope, path = %target.display(), "environment created");
    Ok(record)
}

pub fn activate_environment(
    ctx: &CommandContext,
    name: &str,
    group: Option<&str>,
) -> Result<ActivationHandoff> {
    let (layout, record) = find_environment(ctx, name, group)?;
    let script = record.path.join("bin").join("activate");
    if !ctx.fs().exists(&script) {
        return Err(EnvError::ActivationScriptMissing {
            name: name.to_string(),
            path: script,
        }
        .into());
    }
    ctx.modules().load(&record.toolchain_modules)?;
    tracing::debug!(name, scope = %layout.scope(), "toolchain replayed");
    Ok(ActivationHandoff {
        scope: layout.scope().clone(),
        record,
        script,
    })
}

/// Removes the directory first; the record only goes once the directory is
/// gone, so a failed removal leaves a retryable state.
pub fn delete_environment(
    ctx: &CommandContext,
    name: &str,
    group: Option<&str>,
) -> Result<EnvironmentRecord> {
    let (layout, record) = find_environment(ctx, name, group)?;
    if !layout.contains(&record.path) {
        return Err(EnvError::UnsafeEnvironmentPath {
            name: name.to_string(),
            path: record.path.clone(),
        }
        .into());
    }
    if ctx.fs().exists(&record.path) {
        ctx.fs()
            .remove_dir_all(&record.path)
            .map_err(|err| EnvError::PartialDeleteFailure {
                name: name.to_string(),
                path: record.path.clone(),
                reason: format!("{err:#}"),
            })?;
    } else {
        tracing::warn!(name, path = %record.path.display(), "environment directory already missing");
    }
    let removed = layout.registry(ctx.config()).remove(name)?;
    tracing::info!(name, scope = %layout.scope(), "environment deleted");
    Ok(removed)
}

/// Looks `name` up in one group, or in the personal scope and then every
/// group of the user. Groups whose registry cannot be read are skipped.
pub fn find_environment(
    ctx: &CommandContext,
    name: &str,
    group: Option<&str>,
) -> Result<(ScopeLayout, EnvironmentRecord)> {
    if let Some(group) = group {
        let layout = ScopeLayout::resolve(ctx.config(), &Scope::Group(group.to_string()))?;
        let record = layout.registry(ctx.config()).get(name)?;
        return Ok((layout, record));
    }

    let personal = ScopeLayout::resolve(ctx.config(), &Scope::Personal)?;
    if let Some(record) = personal.registry(ctx.config()).find(name)? {
        return Ok((personal, record));
    }
    let mut searched = vec![Scope::Personal.to_string()];
    for group in user_groups(ctx) {
        let Ok(layout) = ScopeLayout::resolve(ctx.config(), &Scope::Group(group.clone())) else {
            continue;
        };
        let registry = layout.registry(ctx.config());
        match registry.find(name) {
            Ok(Some(record)) => return Ok((layout, record)),
            Ok(None) => searched.push(layout.scope().to_string()),
            Err(err) if is_unavailable(&err) => {
                tracing::warn!(group = %group, error = %err, "skipping unreadable group registry");
            }
            Err(err) => return Err(err),
        }
    }
    Err(EnvError::NotFound {
        name: name.to_string(),
        searched: searched.join(", "),
    }
    .into())
}

/// Groups of the acting user; a failing `groups` lookup means no groups.
pub(crate) fn user_groups(ctx: &CommandContext) -> Vec<String> {
    ctx.accounts().groups().unwrap_or_else(|err| {
        tracing::warn!(error = %format!("{err:#}"), "could not determine group membership");
        Vec::new()
    })
}

pub(crate) fn is_unavailable(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<EnvError>(),
        Some(EnvError::ScopeUnavailable { .. })
    )
}

fn roll_back(ctx: &CommandContext, target: &Path) {
    if let Err(err) = ctx.fs().remove_dir_all(target) {
        tracing::warn!(path = %target.display(), error = %format!("{err:#}"), "failed to remove partial environment");
    }
}

fn conflict(name: &str, scope: &Scope, path: Option<PathBuf>) -> anyhow::Error {
    EnvError::NameConflict {
        name: name.to_string(),
        scope: scope.to_string(),
        path,
    }
    .into()
}

fn creation_failed(name: &str, err: &anyhow::Error) -> anyhow::Error {
    EnvError::CreationFailed {
        name: name.to_string(),
        reason: format!("{err:#}"),
    }
    .into()
}

fn timestamp() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| OffsetDateTime::now_utc().unix_timestamp().to_string())
}
