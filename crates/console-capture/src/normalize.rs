//! Conversion of raw producer events into canonical [`LogEntry`] values.
//!
//! Each shape is first reduced to `(level, rendered text, timestamp)`. Console
//! shapes are then labelled by [`classify`]; exception shapes skip the
//! classifier and are always `EXCEPTION`.

use crate::classify::classify;
use crate::entry::{from_unix_seconds, Category, Level, LogEntry};
use crate::error::EventError;
use crate::event::{RawEvent, RemoteObject};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Prefix of every rendered unhandled rejection.
pub const UNHANDLED_REJECTION_PREFIX: &str = "Unhandled Promise Rejection:";

/// Normalizes one raw event, stamping producer-less shapes with `now`.
///
/// # Errors
///
/// Returns `InvalidTimestamp` when a protocol timestamp cannot be represented.
pub fn normalize(event: RawEvent, now: DateTime<Utc>) -> Result<LogEntry, EventError> {
    let entry = match event {
        RawEvent::ConsoleCall { level, args } => {
            let text = args.iter().map(render_argument).collect::<Vec<_>>().join(" ");
            classified(now, level, &text)
        }
        RawEvent::UnhandledRejection { reason } => {
            let rendered = match &reason {
                Some(value) if is_structured(value) => render_structured(value),
                Some(value) => coerce(value),
                None => "undefined".to_string(),
            };
            exception(now, &format!("{UNHANDLED_REJECTION_PREFIX} {rendered}"))
        }
        RawEvent::PageException { message } => exception(now, &message),
        RawEvent::LogEntry(entry) => {
            let timestamp = protocol_timestamp(entry.timestamp)?;
            classified(timestamp, Level::parse(&entry.level), &entry.text)
        }
        RawEvent::ConsoleMessage(message) => {
            let timestamp = match message.timestamp {
                Some(seconds) => protocol_timestamp(seconds)?,
                None => now,
            };
            let text = match &message.parameters {
                Some(parameters) => parameters
                    .iter()
                    .map(format_remote_object)
                    .collect::<Vec<_>>()
                    .join(" "),
                None => message.text.clone().unwrap_or_default(),
            };
            classified(timestamp, Level::parse(&message.level), &text)
        }
        RawEvent::RuntimeException(details) => {
            let text = details
                .exception
                .as_ref()
                .and_then(|exception| exception.description.clone())
                .unwrap_or(details.text);
            exception(now, &text)
        }
    };
    Ok(entry)
}

fn classified(timestamp: DateTime<Utc>, level: Level, text: &str) -> LogEntry {
    LogEntry::new(timestamp, level, classify(level, text), text)
}

fn exception(timestamp: DateTime<Utc>, text: &str) -> LogEntry {
    LogEntry::new(timestamp, Level::Error, Category::Exception, text)
}

fn protocol_timestamp(seconds: f64) -> Result<DateTime<Utc>, EventError> {
    from_unix_seconds(seconds).ok_or(EventError::InvalidTimestamp(seconds))
}

/// Renders a page-shim console argument.
///
/// Strings are used verbatim, objects and arrays (and `null`, which the page
/// reports as an object) are structurally serialized, everything else is
/// string-coerced.
#[must_use]
pub fn render_argument(arg: &Value) -> String {
    match arg {
        Value::String(s) => s.clone(),
        value if is_structured(value) => render_structured(value),
        value => coerce(value),
    }
}

/// Formats a remote object descriptor the way the page would print it.
#[must_use]
pub fn format_remote_object(obj: &RemoteObject) -> String {
    match (obj.kind.as_str(), obj.subtype.as_deref()) {
        ("string", _) => obj.value.as_ref().map(coerce).unwrap_or_default(),
        ("object", Some("null")) => "null".to_string(),
        ("undefined", _) => "undefined".to_string(),
        ("object" | "function", _) => obj
            .description
            .clone()
            .or_else(|| obj.class_name.clone())
            .unwrap_or_else(|| obj.kind.clone()),
        _ => match (&obj.value, &obj.unserializable_value) {
            (Some(value), _) => coerce(value),
            (None, Some(unserializable)) => unserializable.clone(),
            (None, None) => "undefined".to_string(),
        },
    }
}

fn is_structured(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_) | Value::Null)
}

/// Structured serialization, falling back to string coercion on failure.
fn render_structured(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| coerce(value))
}

/// Page-style string coercion of a JSON value.
fn coerce(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{ExceptionDetails, ProtocolConsoleMessage, ProtocolLogEntry};
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn protocol_log_entry_uses_its_own_timestamp() {
        let entry = normalize(
            RawEvent::LogEntry(ProtocolLogEntry {
                timestamp: 1_700_000_000.0,
                level: "error".to_string(),
                text: "Failed to load resource: net::ERR_FAILED".to_string(),
            }),
            now(),
        )
        .unwrap();

        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.category, Category::NetworkError);
        assert!(entry.message.starts_with(
            "[2023-11-14T22:13:20.000Z] [NETWORKERROR] Failed to load resource"
        ));
    }

    #[test]
    fn shim_warning_about_deprecation() {
        let entry = normalize(
            RawEvent::ConsoleCall {
                level: Level::Warn,
                args: vec![json!("This API is deprecated")],
            },
            now(),
        )
        .unwrap();

        assert_eq!(entry.category, Category::DeprecationWarning);
        assert_eq!(entry.timestamp, now());
    }

    #[test]
    fn shim_arguments_are_space_joined() {
        let entry = normalize(
            RawEvent::ConsoleCall {
                level: Level::Log,
                args: vec![json!("count"), json!(3), json!({"a": [1, 2]}), json!(null), json!(true)],
            },
            now(),
        )
        .unwrap();

        assert_eq!(
            entry.message,
            "[2024-01-02T03:04:05.000Z] [LOG] count 3 {\"a\":[1,2]} null true"
        );
    }

    #[test]
    fn rejection_with_object_reason() {
        let entry = normalize(
            RawEvent::UnhandledRejection {
                reason: Some(json!({"code": 42})),
            },
            now(),
        )
        .unwrap();

        assert_eq!(entry.category, Category::Exception);
        assert!(entry.message.contains("Unhandled Promise Rejection:"));
        assert!(entry.message.contains("{\"code\":42}"));
    }

    #[test]
    fn rejection_with_primitive_or_missing_reason() {
        let entry = normalize(
            RawEvent::UnhandledRejection {
                reason: Some(json!("timeout")),
            },
            now(),
        )
        .unwrap();
        assert!(entry.message.ends_with("Unhandled Promise Rejection: timeout"));

        let entry = normalize(RawEvent::UnhandledRejection { reason: None }, now()).unwrap();
        assert!(entry.message.ends_with("Unhandled Promise Rejection: undefined"));
    }

    #[test]
    fn page_exception_is_exception() {
        let entry = normalize(
            RawEvent::PageException {
                message: "Uncaught TypeError: boom".to_string(),
            },
            now(),
        )
        .unwrap();
        assert_eq!(entry.level, Level::Error);
        assert_eq!(entry.category, Category::Exception);
        assert!(entry.message.ends_with("[EXCEPTION] Uncaught TypeError: boom"));
    }

    #[test]
    fn console_message_formats_parameters() {
        let parameters = vec![
            RemoteObject::string("value:"),
            RemoteObject {
                kind: "object".to_string(),
                subtype: Some("null".to_string()),
                ..RemoteObject::default()
            },
            RemoteObject {
                kind: "undefined".to_string(),
                ..RemoteObject::default()
            },
            RemoteObject {
                kind: "object".to_string(),
                class_name: Some("Map".to_string()),
                ..RemoteObject::default()
            },
            RemoteObject {
                kind: "function".to_string(),
                description: Some("function f() {}".to_string()),
                class_name: Some("Function".to_string()),
                ..RemoteObject::default()
            },
            RemoteObject {
                kind: "object".to_string(),
                ..RemoteObject::default()
            },
            RemoteObject {
                kind: "number".to_string(),
                value: Some(json!(7)),
                ..RemoteObject::default()
            },
            RemoteObject {
                kind: "number".to_string(),
                unserializable_value: Some("NaN".to_string()),
                ..RemoteObject::default()
            },
        ];
        let entry = normalize(
            RawEvent::ConsoleMessage(ProtocolConsoleMessage {
                timestamp: None,
                level: "info".to_string(),
                parameters: Some(parameters),
                text: Some("ignored".to_string()),
            }),
            now(),
        )
        .unwrap();

        assert_eq!(
            entry.message,
            "[2024-01-02T03:04:05.000Z] [INFO] value: null undefined Map function f() {} object 7 NaN"
        );
    }

    #[test]
    fn console_message_falls_back_to_text() {
        let entry = normalize(
            RawEvent::ConsoleMessage(ProtocolConsoleMessage {
                timestamp: Some(1_700_000_000.0),
                level: "WARNING".to_string(),
                parameters: None,
                text: Some("Mixed Content: http://x".to_string()),
            }),
            now(),
        )
        .unwrap();
        assert_eq!(entry.category, Category::SecurityWarning);
        assert_eq!(entry.level, Level::Warn);
    }

    #[test]
    fn runtime_exception_prefers_description() {
        let entry = normalize(
            RawEvent::RuntimeException(ExceptionDetails {
                text: "Uncaught".to_string(),
                exception: Some(RemoteObject {
                    kind: "object".to_string(),
                    description: Some("Error: kaput\n    at main.js:1".to_string()),
                    ..RemoteObject::default()
                }),
            }),
            now(),
        )
        .unwrap();
        assert!(entry.message.ends_with("[EXCEPTION] Error: kaput\n    at main.js:1"));

        let entry = normalize(
            RawEvent::RuntimeException(ExceptionDetails {
                text: "Uncaught".to_string(),
                exception: None,
            }),
            now(),
        )
        .unwrap();
        assert!(entry.message.ends_with("[EXCEPTION] Uncaught"));
    }

    #[test]
    fn invalid_protocol_timestamp_is_rejected() {
        let result = normalize(
            RawEvent::LogEntry(ProtocolLogEntry {
                timestamp: f64::INFINITY,
                level: "log".to_string(),
                text: String::new(),
            }),
            now(),
        );
        assert!(matches!(result, Err(EventError::InvalidTimestamp(_))));
    }

    #[test]
    fn coercion_matches_page_semantics() {
        assert_eq!(coerce(&json!([1, null, "a"])), "1,,a");
        assert_eq!(coerce(&json!({"k": 1})), "[object Object]");
        assert_eq!(coerce(&json!(1.5)), "1.5");
    }
}
