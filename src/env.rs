//! Environment variable names used by this crate for convenient
//! configuration of the formatter from services.
//!
//! These are purely helpers; [`crate::options::FormatterOptions`] itself
//! stays decoupled from environment access.

/// strftime pattern for the `Timestamp` field. Empty disables it.
pub const LOG_FORMAT_TIMESTAMP_FORMAT_ENV: &str = "LOG_FORMAT_TIMESTAMP_FORMAT";

/// `true` to stamp in UTC instead of local time.
pub const LOG_FORMAT_USE_UTC_ENV: &str = "LOG_FORMAT_USE_UTC";

/// `true` to emit the `Scopes` array.
pub const LOG_FORMAT_INCLUDE_SCOPES_ENV: &str = "LOG_FORMAT_INCLUDE_SCOPES";

/// `true` to pretty-print each event.
pub const LOG_FORMAT_INDENTED_ENV: &str = "LOG_FORMAT_INDENTED";

/// Parse a boolean flag the way operators usually write them.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
