#![deny(clippy::all)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]

//! Data model shared by the modulair crates: environment records, registry
//! documents, module identifiers and toolchain definitions.

pub mod module;
pub mod record;
pub mod scope;
pub mod toolchain;

pub use module::{marker_key, ModuleId, ROOT_MARKER_PREFIX, VERSION_MARKER_PREFIX};
pub use record::{EnvironmentRecord, Owner, RegistryDocument};
pub use scope::Scope;
pub use toolchain::{ToolchainCatalog, ToolchainDefinition, ToolchainPlan, ToolchainSource};
