use modulair_core::{
    self, error_outcome, CommandContext, CommandGroup, CommandInfo, EnvActivateRequest,
    EnvCreateRequest, EnvDeleteRequest, EnvDoctorRequest, EnvListRequest, ExecutionOutcome,
    ScopeSelection,
};

use crate::cli::{CommandGroupCli, ListArgs};

pub fn dispatch_command(
    ctx: &CommandContext,
    group: &CommandGroupCli,
) -> (CommandInfo, ExecutionOutcome) {
    let info = command_info(group);
    let outcome = match group {
        CommandGroupCli::Create(args) => {
            let request = EnvCreateRequest {
                name: args.name.clone(),
                python: args.python.clone(),
                toolchain: args.toolchain.clone(),
                group: args.group.clone(),
                description: args.description.clone(),
            };
            core_call(info, || modulair_core::env_create(ctx, &request))
        }
        CommandGroupCli::List(args) => {
            let request = EnvListRequest {
                selection: selection_from_args(args),
                name_only: args.names_only,
            };
            core_call(info, || modulair_core::env_list(ctx, &request))
        }
        CommandGroupCli::Activate(args) => {
            let request = EnvActivateRequest {
                name: args.name.clone(),
                group: args.group.clone(),
            };
            core_call(info, || modulair_core::env_activate(ctx, &request))
        }
        CommandGroupCli::Delete(args) => {
            let request = EnvDeleteRequest {
                name: args.name.clone(),
                group: args.group.clone(),
            };
            core_call(info, || modulair_core::env_delete(ctx, &request))
        }
        CommandGroupCli::Doctor(args) => {
            let request = EnvDoctorRequest {
                group: args.group.clone(),
            };
            core_call(info, || modulair_core::env_doctor(ctx, &request))
        }
    };
    (info, outcome)
}

pub fn command_info(group: &CommandGroupCli) -> CommandInfo {
    match group {
        CommandGroupCli::Create(_) => CommandInfo::new(CommandGroup::Create, "create"),
        CommandGroupCli::List(_) => CommandInfo::new(CommandGroup::List, "list"),
        CommandGroupCli::Activate(_) => CommandInfo::new(CommandGroup::Activate, "activate"),
        CommandGroupCli::Delete(_) => CommandInfo::new(CommandGroup::Delete, "delete"),
        CommandGroupCli::Doctor(_) => CommandInfo::new(CommandGroup::Doctor, "doctor"),
    }
}

fn selection_from_args(args: &ListArgs) -> ScopeSelection {
    match (&args.group, args.user) {
        (Some(group), _) => ScopeSelection::Group(group.clone()),
        (None, true) => ScopeSelection::Personal,
        (None, false) => ScopeSelection::All,
    }
}

fn core_call<F>(info: CommandInfo, action: F) -> ExecutionOutcome
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    match action() {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::debug!(command = info.name, error = ?err, "command failed");
            error_outcome(&err)
        }
    }
}
