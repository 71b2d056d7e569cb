//! Command-line interface definition.
//!
//! # Command Structure
//!
//! - `console-capture capture <URL>` - Capture a page's console and export it
//! - `console-capture config` - Print the effective configuration

use crate::output::ExportFilter;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Capture and classify a page's browser console
#[derive(Parser, Debug)]
#[command(
    name = "console-capture",
    version,
    about = "Capture and classify a page's browser console",
    long_about = "Opens a page in Chrome, captures every console message, exception and\n\
                  network failure through the DevTools Protocol, labels each one\n\
                  (network, CORS, deprecation, security...) and exports the result as JSON."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (defaults to ./console-capture.toml when present)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture a page's console activity
    ///
    /// Launches Chrome, opens URL, starts capture on its tab and prints each
    /// entry as it arrives. When the duration elapses (or on Ctrl-C) the
    /// buffer is exported as JSON grouped by the selected filters.
    Capture(CaptureArgs),

    /// Print the effective configuration as TOML
    Config,
}

/// Arguments for the capture command
#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Page to open
    #[arg(value_name = "URL")]
    pub url: String,

    /// Stop after this many seconds (runs until Ctrl-C when omitted)
    #[arg(short, long, value_name = "SECS")]
    pub duration: Option<u64>,

    /// Export only these groups (repeatable)
    ///
    /// Examples:
    ///   console-capture capture https://example.com --category errors
    ///   console-capture capture https://example.com --category all-errors --category all-warnings
    #[arg(long = "category", value_enum, value_name = "CAT")]
    pub categories: Vec<ExportFilter>,

    /// Stream entries as JSON lines instead of colored text
    #[arg(long)]
    pub json: bool,

    /// Write the export to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Show the browser window
    #[arg(long)]
    pub visible: bool,

    /// Chrome or Chromium executable (auto-detected when omitted)
    #[arg(long, value_name = "PATH")]
    pub chrome: Option<PathBuf>,
}
