//! Colored status lines on stderr.
//!
//! Only the JSON export goes to stdout. Status lines and the live entry
//! stream use stderr so the export can be piped on its own.

use crate::output::CategoryCounts;
use owo_colors::OwoColorize;

/// Check if color output should be enabled.
///
/// Respects `NO_COLOR` and `FORCE_COLOR`, then falls back to terminal
/// detection on stderr, where entries are streamed.
pub fn should_use_color() -> bool {
    if std::env::var("NO_COLOR").is_ok() {
        return false;
    }

    if std::env::var("FORCE_COLOR").is_ok() {
        return true;
    }

    console::user_attended_stderr()
}

/// Initialize color support based on environment.
///
/// `owo-colors` reads `NO_COLOR` itself; this only records the decision in
/// the debug log.
pub fn init_colors() {
    tracing::debug!(color = should_use_color(), "terminal color support");
}

pub fn success(message: &str) {
    eprintln!("{} {}", "✓".green().bold(), message);
}

pub fn info(message: &str) {
    eprintln!("{} {}", "ℹ".blue().bold(), message);
}

pub fn warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow().bold(), message.yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message.red());
}

/// Print the per-category summary after a capture.
pub fn print_counts(counts: &CategoryCounts) {
    eprintln!();
    eprintln!("{}", "Captured".bold());
    for (category, count) in counts.iter() {
        eprintln!("  {:<20} {}", category.as_str(), count);
    }
    eprintln!("  {} {}", format!("{:<20}", "all errors").red(), counts.errors());
    eprintln!("  {} {}", format!("{:<20}", "all warnings").yellow(), counts.warnings());
    eprintln!("  {} {}", format!("{:<20}", "total").bold(), counts.total());
}
