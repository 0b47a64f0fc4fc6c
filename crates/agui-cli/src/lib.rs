//! Command-line and environment configuration for the AG-UI bridge server.

pub mod cli_args;
pub mod cli_types;

pub use cli_args::Cli;
pub use cli_types::*;
