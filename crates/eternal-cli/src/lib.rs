//! Command-line front end for the Eternal Soul astrology cache.
//!
//! The `eternal` binary is a thin wrapper around this library: it parses a
//! [`CliConfig`], runs it with [`run`], and prints the resulting JSON.

pub mod commands;
pub mod config;
pub mod error;

pub use commands::{execute, run};
pub use config::{BirthArgs, CliConfig, Command};
pub use error::ConfigError;
