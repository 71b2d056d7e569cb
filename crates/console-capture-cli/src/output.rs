//! Export filters, JSON grouping and per-category counts.

use clap::ValueEnum;
use console_capture::entry::format_timestamp;
use console_capture::{Category, LogEntry};
use owo_colors::OwoColorize;
use serde::Serialize;
use std::collections::BTreeMap;

/// A named group of categories selectable for export.
#[derive(Copy, Clone, PartialEq, Eq, Debug, ValueEnum)]
pub enum ExportFilter {
    /// Every captured entry
    All,
    /// Plain `console.error()` output
    Errors,
    /// Plain `console.warn()` output
    Warnings,
    Logs,
    Info,
    Debug,
    DeprecationWarnings,
    NetworkErrors,
    CorsErrors,
    SecurityWarnings,
    Exceptions,
    /// Errors, exceptions, network and CORS failures
    AllErrors,
    /// Warnings, deprecation and security warnings
    AllWarnings,
}

impl ExportFilter {
    /// Key the matching entries are grouped under.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            ExportFilter::All => "All Logs",
            ExportFilter::Errors => "Errors",
            ExportFilter::Warnings => "Warnings",
            ExportFilter::Logs => "Logs",
            ExportFilter::Info => "Info",
            ExportFilter::Debug => "Debug",
            ExportFilter::DeprecationWarnings => "Deprecation Warnings",
            ExportFilter::NetworkErrors => "Network Errors",
            ExportFilter::CorsErrors => "CORS Errors",
            ExportFilter::SecurityWarnings => "Security Warnings",
            ExportFilter::Exceptions => "Exceptions",
            ExportFilter::AllErrors => "All Errors",
            ExportFilter::AllWarnings => "All Warnings",
        }
    }

    #[must_use]
    pub fn matches(self, category: Category) -> bool {
        match self {
            ExportFilter::All => true,
            ExportFilter::Errors => category == Category::Error,
            ExportFilter::Warnings => category == Category::Warning,
            ExportFilter::Logs => category == Category::Log,
            ExportFilter::Info => category == Category::Info,
            ExportFilter::Debug => category == Category::Debug,
            ExportFilter::DeprecationWarnings => category == Category::DeprecationWarning,
            ExportFilter::NetworkErrors => category == Category::NetworkError,
            ExportFilter::CorsErrors => category == Category::CorsError,
            ExportFilter::SecurityWarnings => category == Category::SecurityWarning,
            ExportFilter::Exceptions => category == Category::Exception,
            ExportFilter::AllErrors => category.is_error_like(),
            ExportFilter::AllWarnings => category.is_warning_like(),
        }
    }

    /// Groups spanning several categories label each entry with its own.
    #[must_use]
    pub fn spans_categories(self) -> bool {
        matches!(
            self,
            ExportFilter::All | ExportFilter::AllErrors | ExportFilter::AllWarnings
        )
    }
}

/// One exported entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedEntry {
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    pub message: String,
}

/// Groups `logs` under the display name of each filter.
///
/// No filters means [`ExportFilter::All`]. A filter with no matching entry
/// still produces an empty group.
#[must_use]
pub fn export(
    logs: &[LogEntry],
    filters: &[ExportFilter],
) -> BTreeMap<&'static str, Vec<ExportedEntry>> {
    let filters = if filters.is_empty() {
        &[ExportFilter::All][..]
    } else {
        filters
    };

    let mut groups = BTreeMap::new();
    for &filter in filters {
        groups.entry(filter.display_name()).or_insert_with(|| {
            logs.iter()
                .filter(|entry| filter.matches(entry.category))
                .map(|entry| ExportedEntry {
                    timestamp: format_timestamp(&entry.timestamp),
                    category: filter.spans_categories().then_some(entry.category),
                    message: entry.message.clone(),
                })
                .collect()
        });
    }
    groups
}

/// Per-category tallies of a buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryCounts {
    counts: BTreeMap<Category, usize>,
}

impl CategoryCounts {
    #[must_use]
    pub fn tally(logs: &[LogEntry]) -> Self {
        let mut counts = BTreeMap::new();
        for entry in logs {
            *counts.entry(entry.category).or_insert(0) += 1;
        }
        Self { counts }
    }

    #[must_use]
    pub fn get(&self, category: Category) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    /// Sum over the error family.
    #[must_use]
    pub fn errors(&self) -> usize {
        self.sum(Category::is_error_like)
    }

    /// Sum over the warning family.
    #[must_use]
    pub fn warnings(&self) -> usize {
        self.sum(Category::is_warning_like)
    }

    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Non-zero counts in display order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, usize)> + '_ {
        Category::ALL
            .into_iter()
            .map(|category| (category, self.get(category)))
            .filter(|(_, count)| *count > 0)
    }

    fn sum(&self, family: impl Fn(Category) -> bool) -> usize {
        self.counts
            .iter()
            .filter(|(category, _)| family(**category))
            .map(|(_, count)| count)
            .sum()
    }
}

/// Renders one streamed entry, colored by category.
#[must_use]
pub fn format_entry(entry: &LogEntry, color: bool) -> String {
    if !color {
        return entry.message.clone();
    }
    let message = entry.message.as_str();
    match entry.category {
        category if category.is_error_like() => message.red().to_string(),
        category if category.is_warning_like() => message.yellow().to_string(),
        Category::Info => message.blue().to_string(),
        Category::Debug => message.dimmed().to_string(),
        _ => message.to_string(),
    }
}
