//! # strata-cli
//!
//! Command-line interface for Strata.
//!
//! ## Commands
//!
//! - `strata run` - Execute a daily run for one segment
//! - `strata status` - Inspect table watermarks and row counts
//!
//! ## Configuration
//!
//! The CLI uses environment variables or command-line flags:
//!
//! - `STRATA_DATA_ROOT` - Storage root directory (default: `./data`)

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]
// CLI uses print! macros intentionally
#![allow(clippy::print_stdout)]
#![allow(clippy::print_stderr)]

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Strata CLI - incremental listing state engine.
#[derive(Debug, Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Storage root directory.
    #[arg(long, env = "STRATA_DATA_ROOT", default_value = "./data")]
    pub data_root: PathBuf,

    /// Log output format.
    #[arg(long, default_value = "pretty")]
    pub log_format: LogFormatArg,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Get the effective configuration.
    #[must_use]
    pub fn config(&self) -> Config {
        Config {
            data_root: self.data_root.clone(),
        }
    }
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Execute a daily run for one segment.
    Run(commands::run::RunArgs),
    /// Inspect table watermarks and row counts.
    Status(commands::status::StatusArgs),
}

/// Log output format flag.
#[derive(Debug, Clone, Default, clap::ValueEnum)]
pub enum LogFormatArg {
    /// Pretty-printed logs for development.
    #[default]
    Pretty,
    /// JSON structured logs.
    Json,
}

impl From<LogFormatArg> for strata_core::LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// CLI configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Storage root directory.
    pub data_root: PathBuf,
}
