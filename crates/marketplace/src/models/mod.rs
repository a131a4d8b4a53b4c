//! Request-scoped and session-stored models for the web tier.

pub mod session;

pub use session::{Viewer, keys as session_keys};
