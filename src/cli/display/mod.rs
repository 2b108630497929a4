//! Rendering of command results: JSON documents or short human summaries.

pub mod detail;
pub mod format;
pub mod table;

use serde::Serialize;

pub use detail::*;
pub use format::*;
pub use table::*;

/// A command result printable in either output mode.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    /// JSON document printed in `--json` mode; the serialized value by default.
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Text printed for `result` in the selected mode.
pub fn render<T: CommandOutput>(result: &T, json_mode: bool) -> String {
    if json_mode {
        serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
    } else {
        result.to_human()
    }
}

/// Print `result` to stdout.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    println!("{}", render(result, json_mode));
}
