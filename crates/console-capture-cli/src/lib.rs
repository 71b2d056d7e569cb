//! console-capture CLI - capture a page's console from the terminal.
//!
//! This crate drives the `console-capture` library end to end: it launches
//! Chrome, opens a page, turns capture on for its tab and streams every
//! classified entry to the terminal before exporting the buffer as JSON.
//!
//! # Architecture
//!
//! - [`cli`] - Argument definitions (clap derive)
//! - [`commands`] - `capture` and `config` implementations
//! - [`error`] - CLI error type and miette conversion
//! - [`logger`] - tracing-subscriber setup
//! - [`output`] - Export filters, JSON grouping and per-category counts
//! - [`ui`] - Colored status lines
//!
//! # Example
//!
//! ```rust,no_run
//! use console_capture_cli::{error::Result, logger};
//!
//! fn main() -> Result<()> {
//!     logger::init_logger(false, false, false);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod output;
pub mod ui;

pub use error::{CliError, Result};
