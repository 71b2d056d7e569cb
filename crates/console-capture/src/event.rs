//! Raw event shapes emitted by the two producers.
//!
//! The page shim posts JSON messages tagged with [`SHIM_SOURCE_MARKER`]; the
//! debugging protocol delivers `(method, params)` pairs. Both are decoded into
//! [`RawEvent`], one variant per producer shape, which the normalizer then
//! matches exhaustively.

use crate::entry::Level;
use crate::error::EventError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Source marker carried by every message the page shim posts.
pub const SHIM_SOURCE_MARKER: &str = "ConsoleCapture";

/// `Log.entryAdded`
pub const LOG_ENTRY_ADDED: &str = "Log.entryAdded";

/// `Console.messageAdded`
pub const CONSOLE_MESSAGE_ADDED: &str = "Console.messageAdded";

/// `Runtime.exceptionThrown`
pub const RUNTIME_EXCEPTION_THROWN: &str = "Runtime.exceptionThrown";

/// A message posted by the in-page capture shim.
#[derive(Debug, Clone, PartialEq)]
pub enum ShimMessage {
    /// A wrapped `console.*` call.
    Console { level: Level, args: Vec<Value> },

    /// A `window` `unhandledrejection` event. `None` means the reason was
    /// `undefined`.
    UnhandledRejection { reason: Option<Value> },

    /// A `window` `error` event.
    Exception {
        message: String,
        filename: Option<String>,
        line: Option<u64>,
        column: Option<u64>,
    },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ShimWire {
    Log {
        #[serde(default)]
        args: Vec<Value>,
    },
    Info {
        #[serde(default)]
        args: Vec<Value>,
    },
    Warn {
        #[serde(default)]
        args: Vec<Value>,
    },
    Error {
        #[serde(default)]
        args: Vec<Value>,
    },
    Debug {
        #[serde(default)]
        args: Vec<Value>,
    },
    UnhandledPromiseRejection,
    Exception {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        lineno: Option<u64>,
        #[serde(default)]
        colno: Option<u64>,
    },
}

impl ShimMessage {
    /// Decodes a shim payload, checking the source marker first.
    ///
    /// # Errors
    ///
    /// Returns `MissingSourceMarker` when the payload was not posted by the
    /// shim, and `Payload` when the shape is not one the shim emits.
    pub fn parse(payload: &Value) -> Result<Self, EventError> {
        if payload.get("source").and_then(Value::as_str) != Some(SHIM_SOURCE_MARKER) {
            return Err(EventError::MissingSourceMarker);
        }

        let wire: ShimWire =
            serde_json::from_value(payload.clone()).map_err(|e| EventError::Payload {
                context: "page shim message".to_string(),
                reason: e.to_string(),
            })?;

        Ok(match wire {
            ShimWire::Log { args } => ShimMessage::Console { level: Level::Log, args },
            ShimWire::Info { args } => ShimMessage::Console { level: Level::Info, args },
            ShimWire::Warn { args } => ShimMessage::Console { level: Level::Warn, args },
            ShimWire::Error { args } => ShimMessage::Console { level: Level::Error, args },
            ShimWire::Debug { args } => ShimMessage::Console { level: Level::Debug, args },
            // Read straight from the payload so an explicit `null` stays `null`.
            ShimWire::UnhandledPromiseRejection => ShimMessage::UnhandledRejection {
                reason: payload.get("reason").cloned(),
            },
            ShimWire::Exception {
                message,
                filename,
                lineno,
                colno,
            } => ShimMessage::Exception {
                message: message.unwrap_or_default(),
                filename,
                line: lineno,
                column: colno,
            },
        })
    }
}

/// Descriptor of a value living in the inspected page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    /// `string`, `number`, `object`, `function`, `undefined`, ...
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// `NaN`, `Infinity`, `-0` or a bigint literal when `value` can't carry it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unserializable_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RemoteObject {
    /// A string-typed remote object.
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            kind: "string".to_string(),
            value: Some(Value::String(value.into())),
            ..Self::default()
        }
    }
}

/// Payload of `Log.entryAdded` (`params.entry`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolLogEntry {
    /// Unix seconds.
    pub timestamp: f64,
    pub level: String,
    #[serde(default)]
    pub text: String,
}

/// Payload of `Console.messageAdded` (`params.message`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolConsoleMessage {
    /// Unix seconds, when the producer supplies one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Vec<RemoteObject>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Payload of `Runtime.exceptionThrown` (`params.exceptionDetails`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionDetails {
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<RemoteObject>,
}

#[derive(Deserialize)]
struct LogEntryAddedParams {
    entry: ProtocolLogEntry,
}

#[derive(Deserialize)]
struct ConsoleMessageAddedParams {
    message: ProtocolConsoleMessage,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExceptionThrownParams {
    exception_details: ExceptionDetails,
}

/// One case per producer shape.
#[derive(Debug, Clone, PartialEq)]
pub enum RawEvent {
    /// Page-shim console call.
    ConsoleCall { level: Level, args: Vec<Value> },
    /// Page-shim unhandled promise rejection.
    UnhandledRejection { reason: Option<Value> },
    /// Page-shim `error` event.
    PageException { message: String },
    /// `Log.entryAdded`
    LogEntry(ProtocolLogEntry),
    /// `Console.messageAdded`
    ConsoleMessage(ProtocolConsoleMessage),
    /// `Runtime.exceptionThrown`
    RuntimeException(ExceptionDetails),
}

impl RawEvent {
    /// Decodes a protocol event.
    ///
    /// Returns `Ok(None)` for methods this pipeline does not record.
    ///
    /// # Errors
    ///
    /// Returns `Payload` when a recorded method carries an unexpected shape.
    pub fn from_protocol(method: &str, params: &Value) -> Result<Option<Self>, EventError> {
        let event = match method {
            LOG_ENTRY_ADDED => {
                let p: LogEntryAddedParams = decode(method, params)?;
                RawEvent::LogEntry(p.entry)
            }
            CONSOLE_MESSAGE_ADDED => {
                let p: ConsoleMessageAddedParams = decode(method, params)?;
                RawEvent::ConsoleMessage(p.message)
            }
            RUNTIME_EXCEPTION_THROWN => {
                let p: ExceptionThrownParams = decode(method, params)?;
                RawEvent::RuntimeException(p.exception_details)
            }
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

impl From<ShimMessage> for RawEvent {
    fn from(message: ShimMessage) -> Self {
        match message {
            ShimMessage::Console { level, args } => RawEvent::ConsoleCall { level, args },
            ShimMessage::UnhandledRejection { reason } => RawEvent::UnhandledRejection { reason },
            ShimMessage::Exception { message, .. } => RawEvent::PageException { message },
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, params: &Value) -> Result<T, EventError> {
    T::deserialize(params).map_err(|e| EventError::Payload {
        context: method.to_string(),
        reason: e.to_string(),
    })
}
