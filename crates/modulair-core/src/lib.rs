#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

mod core;

pub(crate) use crate::core::config;
pub(crate) use crate::core::runtime::{effects, process};
pub(crate) use crate::core::tooling::{errors, outcome};

pub use crate::core::commands::{
    env_activate, env_create, env_delete, env_doctor, env_list, EnvActivateRequest,
    EnvCreateRequest, EnvDeleteRequest, EnvDoctorRequest, EnvListRequest,
};
pub use crate::core::config::context::{CommandContext, CommandGroup, CommandInfo};
pub use crate::core::config::{
    Config, EnvSnapshot, GlobalOptions, ModuleConfig, RegistryConfig, ScopeConfig,
};
pub use crate::core::lifecycle::{
    activate_environment, create_environment, delete_environment, find_environment,
    ActivationHandoff, CreateRequest,
};
pub use crate::core::listing::{
    doctor, query, DoctorReport, ListedEnvironment, ScopeListing, ScopeSelection,
};
pub use crate::core::registry::{RegistryHandle, LOCK_SUFFIX, METADATA_FILENAME};
pub use crate::core::runtime::effects::{
    Accounts, Effects, FileSystem, ModuleSystem, PythonDetails, PythonRuntime, SharedEffects,
    SystemEffects,
};
pub use crate::core::runtime::process::RunOutput;
pub use crate::core::scopes::ScopeLayout;
pub use crate::core::toolchain::{resolve, ModuleState, ToolchainRequest};
pub use crate::core::tooling::errors::{error_outcome, EnvError, ErrorKind};
pub use crate::core::tooling::outcome::{
    format_status_message, to_json_response, CommandStatus, ExecutionOutcome,
};

pub use modulair_domain as domain;
