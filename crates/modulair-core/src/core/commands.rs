use anyhow::Result;
use serde_json::json;

use crate::config::context::CommandContext;
use crate::core::lifecycle::{
    activate_environment, create_environment, delete_environment, CreateRequest,
};
use crate::core::listing::{doctor, query, ScopeSelection};
use crate::core::toolchain::ToolchainRequest;
use crate::outcome::ExecutionOutcome;

#[derive(Clone, Debug, Default)]
pub struct EnvCreateRequest {
    pub name: String,
    pub python: Option<String>,
    pub toolchain: Option<String>,
    pub group: Option<String>,
    pub description: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EnvListRequest {
    pub selection: ScopeSelection,
    pub name_only: bool,
}

#[derive(Clone, Debug)]
pub struct EnvActivateRequest {
    pub name: String,
    pub group: Option<String>,
}

#[derive(Clone, Debug)]
pub struct EnvDeleteRequest {
    pub name: String,
    pub group: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct EnvDoctorRequest {
    pub group: Option<String>,
}

/// Creates a named environment with a resolved toolchain.
///
/// # Errors
/// Returns a typed `EnvError` for resolution, conflict, creation and
/// registry failures.
pub fn env_create(ctx: &CommandContext, request: &EnvCreateRequest) -> Result<ExecutionOutcome> {
    let toolchain =
        ToolchainRequest::from_flags(request.python.as_deref(), request.toolchain.as_deref())?;
    let record = create_environment(
        ctx,
        &CreateRequest {
            name: request.name.clone(),
            description: request.description.clone(),
            toolchain,
            group: request.group.clone(),
        },
    )?;
    let modules = record
        .toolchain_modules
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    Ok(ExecutionOutcome::success(
        format!(
            "created {} (Python {}) at {}",
            record.name,
            record.python_version,
            record.path.display()
        ),
        json!({
            "environment": record,
            "modules": modules,
            "hint": format!("activate with `eval \"$(modulair activate {})\"`", record.name),
        }),
    ))
}

pub fn env_list(ctx: &CommandContext, request: &EnvListRequest) -> Result<ExecutionOutcome> {
    let listings = query(ctx, &request.selection, request.name_only)?;
    let total: usize = listings.iter().map(|listing| listing.environments.len()).sum();
    let message = if total == 0 {
        "no environments found".to_string()
    } else {
        format!("{total} environment(s)")
    };
    Ok(ExecutionOutcome::success(
        message,
        json!({ "scopes": listings, "name_only": request.name_only }),
    ))
}

/// Loads the recorded toolchain and returns the shell snippet that enters
/// the environment.
pub fn env_activate(ctx: &CommandContext, request: &EnvActivateRequest) -> Result<ExecutionOutcome> {
    let handoff = activate_environment(ctx, &request.name, request.group.as_deref())?;
    let mut snippet = String::new();
    if !handoff.record.toolchain_modules.is_empty() {
        let quoted = handoff
            .record
            .toolchain_modules
            .iter()
            .map(|module| shell_quote(&module.to_string()))
            .collect::<Vec<_>>()
            .join(" ");
        snippet.push_str(&format!("{} load {quoted}\n", ctx.config().modules().command));
    }
    snippet.push_str(&format!(
        "source {}\n",
        shell_quote(&handoff.script.to_string_lossy())
    ));
    Ok(ExecutionOutcome::success(
        snippet,
        json!({
            "passthrough": true,
            "scope": handoff.scope,
            "name": handoff.record.name,
            "modules": handoff.record.toolchain_modules,
            "script": handoff.script,
        }),
    ))
}

pub fn env_delete(ctx: &CommandContext, request: &EnvDeleteRequest) -> Result<ExecutionOutcome> {
    let record = delete_environment(ctx, &request.name, request.group.as_deref())?;
    Ok(ExecutionOutcome::success(
        format!("deleted {}", record.name),
        json!({ "name": record.name, "path": record.path }),
    ))
}

pub fn env_doctor(ctx: &CommandContext, request: &EnvDoctorRequest) -> Result<ExecutionOutcome> {
    let report = doctor(ctx, request.group.as_deref())?;
    let message = if report.is_clean() {
        format!("{} registry matches its directory", report.scope)
    } else {
        let mut lines = vec![format!("{} registry needs attention", report.scope)];
        lines.extend(
            report
                .orphaned
                .iter()
                .map(|name| format!("  orphaned directory: {name}")),
        );
        lines.extend(
            report
                .dangling
                .iter()
                .map(|name| format!("  record without directory: {name}")),
        );
        lines.join("\n")
    };
    Ok(ExecutionOutcome::success(message, json!({ "report": report })))
}

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
