//! One-line JSON rendering of log events.
//!
//! A [`LogEvent`] plus the active [`Scope`] stack becomes exactly one JSON
//! object per line, with a fixed field order and type-preserving encoding
//! of structured values. [`JsonLogLayer`] plugs the formatter into
//! `tracing`.
//!
//! ```
//! use structured_log_formatter::{FormatterOptions, JsonLogFormatter, LogEvent, LogLevel, Scope};
//!
//! let formatter = JsonLogFormatter::new(FormatterOptions {
//!     timestamp_format: String::new(),
//!     include_scopes: true,
//!     ..Default::default()
//! });
//! let event = LogEvent::new(LogLevel::Information, "App", "started").with_pairs([("port", 8080)]);
//! let scopes = [Scope::pairs([("req", "r1")])];
//!
//! let mut out = Vec::new();
//! formatter.format(&event, Some(&scopes[..]), &mut out).unwrap();
//! assert_eq!(
//!     String::from_utf8(out).unwrap().trim_end(),
//!     r#"{"EventId":0,"LogLevel":"Information","Category":"App","Message":"started","State":{"port":8080},"Scopes":[{"req":"r1"}]}"#
//! );
//! ```

pub mod error;
pub mod record;
pub mod value;
pub mod options;
pub mod formatter;
pub mod sink;
pub mod layer;

pub mod env;
pub mod init;
pub mod noop_sink;

pub use error::FormatError;
pub use formatter::JsonLogFormatter;
pub use layer::JsonLogLayer;
pub use noop_sink::NoopSink;
pub use options::{FormatterOptions, OptionsError, OptionsHandle};
pub use record::{EventId, LogEvent, LogLevel, Scope, State};
pub use sink::{LogSink, WriterSink};
pub use value::{Decimal, FieldValue};
