//! Command implementations.
//!
//! - [`capture`] - Capture a page's console and export it
//! - [`config`] - Print the effective configuration

pub mod capture;
pub mod config;

pub use capture::execute as capture_execute;
pub use config::execute as config_execute;
