use chrono::{DateTime, Utc};
use std::error::Error;
use std::fmt::{self, Write as _};

use crate::error::FormatError;
use crate::value::FieldValue;

/// Ordered key/value pairs carried by event state and scopes.
pub type Pairs = Vec<(String, FieldValue)>;

/// Severity of a log event.
///
/// `None` is the "logging disabled" sentinel. It is a valid level for
/// enablement checks upstream but is never a formattable event level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
    None,
}

impl LogLevel {
    /// Symbolic name written to the `LogLevel` field, `None` for the
    /// disabled sentinel.
    pub fn name(self) -> Option<&'static str> {
        match self {
            LogLevel::Trace => Some("Trace"),
            LogLevel::Debug => Some("Debug"),
            LogLevel::Information => Some("Information"),
            LogLevel::Warning => Some("Warning"),
            LogLevel::Error => Some("Error"),
            LogLevel::Critical => Some("Critical"),
            LogLevel::None => None,
        }
    }
}

impl TryFrom<u8> for LogLevel {
    type Error = FormatError;

    fn try_from(code: u8) -> Result<Self, FormatError> {
        match code {
            0 => Ok(LogLevel::Trace),
            1 => Ok(LogLevel::Debug),
            2 => Ok(LogLevel::Information),
            3 => Ok(LogLevel::Warning),
            4 => Ok(LogLevel::Error),
            5 => Ok(LogLevel::Critical),
            6 => Ok(LogLevel::None),
            other => Err(FormatError::InvalidLevel(other.to_string())),
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Information,
            tracing::Level::WARN => LogLevel::Warning,
            _ => LogLevel::Error,
        }
    }
}

/// Event identifier: a numeric id plus an optional symbolic name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventId {
    pub id: i32,
    pub name: Option<String>,
}

impl EventId {
    pub fn new(id: i32) -> Self {
        EventId { id, name: None }
    }

    pub fn named(id: i32, name: impl Into<String>) -> Self {
        EventId { id, name: Some(name.into()) }
    }

    /// The name, if it contains anything besides whitespace.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

impl From<i32> for EventId {
    fn from(id: i32) -> Self {
        EventId::new(id)
    }
}

/// Structured payload of a single event.
#[derive(Debug, Clone)]
pub enum State {
    Pairs(Pairs),
    /// Non pair-shaped state; only its text is written.
    Value(FieldValue),
}

/// One entry of the active scope stack.
#[derive(Debug, Clone)]
pub enum Scope {
    Pairs(Pairs),
    Value(FieldValue),
}

impl Scope {
    pub fn pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        Scope::Pairs(collect_pairs(pairs))
    }
}

fn collect_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Pairs
where
    K: Into<String>,
    V: Into<FieldValue>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// A log event as handed to the formatter.
///
/// `timestamp` is the creation instant when the producer stamped one; the
/// formatter falls back to the current time when it is absent.
#[derive(Debug, Clone)]
pub struct LogEvent {
    pub level: LogLevel,
    pub event_id: EventId,
    pub category: String,
    pub message: String,
    pub exception: Option<String>,
    pub state: Option<State>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl LogEvent {
    pub fn new(level: LogLevel, category: impl Into<String>, message: impl Into<String>) -> Self {
        LogEvent {
            level,
            event_id: EventId::default(),
            category: category.into(),
            message: message.into(),
            exception: None,
            state: None,
            timestamp: None,
        }
    }

    pub fn with_event_id(mut self, event_id: impl Into<EventId>) -> Self {
        self.event_id = event_id.into();
        self
    }

    /// Attach an already rendered exception text.
    pub fn with_exception(mut self, text: impl Into<String>) -> Self {
        self.exception = Some(text.into());
        self
    }

    /// Attach an error, rendering it together with its `source()` chain.
    pub fn with_error(mut self, error: &(dyn Error + 'static)) -> Self {
        self.exception = Some(describe_error(error));
        self
    }

    pub fn with_state(mut self, state: State) -> Self {
        self.state = Some(state);
        self
    }

    pub fn with_pairs<K, V>(self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.with_state(State::Pairs(collect_pairs(pairs)))
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// Full textual representation of an error: its message followed by one
/// `Caused by:` line per source.
pub fn describe_error(error: &(dyn Error + 'static)) -> String {
    let mut out = String::new();
    let _ = write!(out, "{}", DisplayChain(error));
    out
}

struct DisplayChain<'a>(&'a (dyn Error + 'static));

impl fmt::Display for DisplayChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(cause) = source {
            write!(f, "\nCaused by: {}", cause)?;
            source = cause.source();
        }
        Ok(())
    }
}
