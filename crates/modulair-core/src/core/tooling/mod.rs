//! CLI-facing error taxonomy and outcome shaping.

pub(crate) mod errors;
pub(crate) mod outcome;
