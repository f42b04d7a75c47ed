pub(crate) mod effects;
pub(crate) mod fs;
pub(crate) mod modules;
pub(crate) mod process;
