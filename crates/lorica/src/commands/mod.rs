//! CLI command handlers.

pub mod login;
pub mod serve;
