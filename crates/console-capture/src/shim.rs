//! The in-page capture shim.
//!
//! The script is evaluated in the page's main world. It reports through a
//! protocol binding (`Runtime.addBinding`), which hands every message back to
//! the host as a JSON string.

use crate::error::EventError;
use serde_json::Value;

/// Name of the page-global function the shim reports through.
pub const BINDING_NAME: &str = "__consoleCaptureEmit";

const SHIM_SOURCE: &str = include_str!("../shim/capture.js");

/// Restores the page's console and removes the shim's listeners.
pub const UNINSTALL_SCRIPT: &str = "(function () { \
    const state = window[Symbol.for('console-capture.state')]; \
    if (state) { state.uninstall(); delete window[Symbol.for('console-capture.state')]; } \
})();";

/// Builds the expression that installs the shim against `binding`.
#[must_use]
pub fn shim_script(binding: &str) -> String {
    let binding = Value::String(binding.to_string());
    format!("{}({});", SHIM_SOURCE.trim_end(), binding)
}

/// Decodes the string a binding call delivered.
///
/// # Errors
///
/// Returns `Payload` if the string is not a JSON object.
pub fn decode_binding_payload(payload: &str) -> Result<Value, EventError> {
    let value: Value = serde_json::from_str(payload).map_err(|e| EventError::Payload {
        context: "binding call".to_string(),
        reason: e.to_string(),
    })?;
    if !value.is_object() {
        return Err(EventError::Payload {
            context: "binding call".to_string(),
            reason: "expected a JSON object".to_string(),
        });
    }
    Ok(value)
}
