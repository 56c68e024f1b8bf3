//! Command line interface module
//!
//! Argument parsing and the runner that maps each subcommand onto the
//! Docker API.

pub mod args;
pub mod runner;

pub use args::{Args, Command};
pub use runner::Runner;
