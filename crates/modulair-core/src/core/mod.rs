pub(crate) mod commands;
pub(crate) mod config;
pub(crate) mod lifecycle;
pub(crate) mod listing;
pub(crate) mod registry;
pub(crate) mod runtime;
pub(crate) mod scopes;
pub(crate) mod toolchain;
pub(crate) mod tooling;

#[cfg(test)]
pub(crate) mod testing;
