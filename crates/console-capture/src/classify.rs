//! Text-pattern classification of console entries.
//!
//! Only error and warning entries are refined; every other level passes
//! through unchanged. Rules are evaluated in order and the first match wins,
//! so an error mentioning both an exception and a CORS failure is an
//! `EXCEPTION`.

use crate::entry::{Category, Level};

const ERROR_RULES: &[(&[&str], Category)] = &[
    (&["unhandled promise rejection"], Category::Exception),
    (&["exception"], Category::Exception),
    (&["failed to load resource", "network error"], Category::NetworkError),
    (&["cors policy"], Category::CorsError),
];

const WARNING_RULES: &[(&[&str], Category)] = &[
    (&["deprecated"], Category::DeprecationWarning),
    (&["mixed content", "csp"], Category::SecurityWarning),
];

/// Maps a normalized `(level, text)` pair to its category.
///
/// Substring tests are case-insensitive. The function is pure and total.
#[must_use]
pub fn classify(level: Level, text: &str) -> Category {
    let rules = match level {
        Level::Error => ERROR_RULES,
        Level::Warn => WARNING_RULES,
        Level::Log | Level::Info | Level::Debug => return Category::from(level),
    };

    let haystack = text.to_lowercase();
    rules
        .iter()
        .find(|(needles, _)| needles.iter().any(|needle| haystack.contains(needle)))
        .map_or_else(|| Category::from(level), |(_, category)| *category)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn error_rules_follow_precedence() {
        assert_eq!(
            classify(Level::Error, "Unhandled Promise Rejection: CORS policy"),
            Category::Exception
        );
        assert_eq!(
            classify(Level::Error, "TypeError Exception while fetching: Network Error"),
            Category::Exception
        );
        assert_eq!(
            classify(Level::Error, "Failed to load resource blocked by CORS policy"),
            Category::NetworkError
        );
        assert_eq!(
            classify(Level::Error, "Access blocked by CORS policy"),
            Category::CorsError
        );
        assert_eq!(classify(Level::Error, "plain failure"), Category::Error);
    }

    #[test]
    fn warning_rules_follow_precedence() {
        assert_eq!(
            classify(Level::Warn, "This API is DEPRECATED, see CSP docs"),
            Category::DeprecationWarning
        );
        assert_eq!(
            classify(Level::Warn, "Mixed Content: insecure image"),
            Category::SecurityWarning
        );
        assert_eq!(
            classify(Level::Warn, "Refused by CSP directive"),
            Category::SecurityWarning
        );
        assert_eq!(classify(Level::Warn, "careful"), Category::Warning);
    }

    #[test]
    fn other_levels_pass_through() {
        assert_eq!(classify(Level::Log, "Exception deprecated"), Category::Log);
        assert_eq!(classify(Level::Info, "CORS policy"), Category::Info);
        assert_eq!(classify(Level::Debug, "Network Error"), Category::Debug);
    }

    #[test]
    fn matching_ignores_case() {
        assert_eq!(
            classify(Level::Error, "network error while polling"),
            Category::NetworkError
        );
        assert_eq!(classify(Level::Error, "cors POLICY"), Category::CorsError);
    }

    fn filler() -> impl Strategy<Value = String> {
        "[a-z ]{0,24}".prop_filter("filler must not contain a trigger", |s| {
            ["exception", "network error", "cors policy", "deprecated", "csp", "mixed content",
             "failed to load resource", "unhandled promise rejection"]
                .iter()
                .all(|needle| !s.contains(needle))
        })
    }

    proptest! {
        #[test]
        fn cors_only_text_is_cors_error(prefix in filler(), suffix in filler()) {
            let text = format!("{prefix} CORS policy {suffix}");
            prop_assume!(!text.to_lowercase().contains("exception"));
            prop_assert_eq!(classify(Level::Error, &text), Category::CorsError);
        }

        #[test]
        fn deprecated_beats_csp(prefix in filler(), suffix in filler(), upper in any::<bool>()) {
            let word = if upper { "DEPRECATED" } else { "deprecated" };
            let text = format!("{prefix} csp {word} {suffix}");
            prop_assert_eq!(classify(Level::Warn, &text), Category::DeprecationWarning);
        }

        #[test]
        fn exception_beats_network_and_cors(prefix in filler(), suffix in filler()) {
            let text = format!("{prefix} Network Error CORS policy Exception {suffix}");
            prop_assert_eq!(classify(Level::Error, &text), Category::Exception);
        }

        #[test]
        fn classification_is_total_and_closed(level in 0u8..5, text in ".{0,64}") {
            let level = match level {
                0 => Level::Log,
                1 => Level::Info,
                2 => Level::Warn,
                3 => Level::Error,
                _ => Level::Debug,
            };
            let category = classify(level, &text);
            prop_assert!(Category::ALL.contains(&category));
        }
    }
}
