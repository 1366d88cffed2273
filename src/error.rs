use std::io;

/// Error type returned by [`crate::formatter::JsonLogFormatter`].
///
/// Nothing is written to the destination when formatting fails; an
/// `Io` error means the destination itself rejected the finished line.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    /// The event level has no symbolic name (the `None` sentinel or an
    /// unknown numeric code).
    #[error("log level {0} is not a formattable level")]
    InvalidLevel(String),

    #[error("invalid timestamp format {0:?}")]
    InvalidTimestampFormat(String),

    #[error("failed to serialize log event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write log line: {0}")]
    Io(#[from] io::Error),
}
