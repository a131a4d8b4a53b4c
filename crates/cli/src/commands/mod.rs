//! CLI command implementations.

pub mod roles;
