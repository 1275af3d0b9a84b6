// CLI module for opustag
//
// Argument parsing, command implementations and output formatting for the
// binary. The library crate does not depend on anything in here.

pub mod commands;
pub mod config;
pub mod output;

pub use config::{Commands, Config, OutputFormat};
pub use output::OutputFormatter;
