use chrono::{Local, Utc};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use std::borrow::Cow;
use std::fmt::Write as _;
use std::io::Write;

use crate::error::FormatError;
use crate::options::{FormatterOptions, OptionsHandle};
use crate::record::{LogEvent, Pairs, Scope, State};
use crate::sink::LogSink;

#[cfg(windows)]
const LINE_ENDING: &[u8] = b"\r\n";
#[cfg(not(windows))]
const LINE_ENDING: &[u8] = b"\n";

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Turns one [`LogEvent`] plus the active scope stack into one line of JSON.
///
/// Field order is fixed: `Timestamp`, `EventId`, `EventName`, `LogLevel`,
/// `Category`, `Message`, `Exception`, `State`, `Scopes`. Optional fields
/// are omitted rather than written as `null`.
///
/// The formatter holds no per-call state; it can be shared between threads
/// and every call renders into its own buffer.
#[derive(Clone, Debug, Default)]
pub struct JsonLogFormatter {
    options: OptionsHandle,
}

impl JsonLogFormatter {
    pub fn new(options: impl Into<OptionsHandle>) -> Self {
        Self { options: options.into() }
    }

    /// Handle used to hot-reload this formatter's options.
    pub fn options(&self) -> &OptionsHandle {
        &self.options
    }

    /// Format `event` and write it to `output` as a single line.
    ///
    /// **Parameters**
    /// - `event`: the event to render.
    /// - `scopes`: active scopes, oldest first. `None` means no scope
    ///   provider is attached and `Scopes` is never written.
    /// - `output`: destination; receives exactly one `write_all` with the
    ///   complete line, or nothing at all if formatting fails.
    ///
    /// **Returns**
    /// - `Err(FormatError::InvalidLevel)` for the `None` level.
    /// - `Err(FormatError::Io)` if the destination rejects the line.
    pub fn format<W>(
        &self,
        event: &LogEvent,
        scopes: Option<&[Scope]>,
        output: &mut W,
    ) -> Result<(), FormatError>
    where
        W: Write + ?Sized,
    {
        let line = self.format_line(event, scopes)?;
        output.write_all(&line)?;
        Ok(())
    }

    /// Render the complete line, terminator included, without writing it.
    pub fn format_line(&self, event: &LogEvent, scopes: Option<&[Scope]>) -> Result<Vec<u8>, FormatError> {
        let options = self.options.load();
        render_line(&options, event, scopes)
    }

    /// Render the line and hand it to a shared sink.
    pub fn format_to_sink(
        &self,
        event: &LogEvent,
        scopes: Option<&[Scope]>,
        sink: &dyn LogSink,
    ) -> Result<(), FormatError> {
        let line = self.format_line(event, scopes)?;
        sink.write_line(&line)?;
        Ok(())
    }
}

/// Render with an explicit options snapshot.
pub(crate) fn render_line(
    options: &FormatterOptions,
    event: &LogEvent,
    scopes: Option<&[Scope]>,
) -> Result<Vec<u8>, FormatError> {
    let level = event
        .level
        .name()
        .ok_or_else(|| FormatError::InvalidLevel(format!("{:?}", event.level)))?;
    let timestamp = render_timestamp(options, event)?;
    let exception = event
        .exception
        .as_deref()
        .map(|text| fold_exception(text, options.indented));

    let document = Document {
        timestamp: timestamp.as_deref(),
        event,
        level,
        exception,
        scopes: scopes.filter(|_| options.include_scopes),
    };

    let mut buffer = Vec::with_capacity(INITIAL_BUFFER_CAPACITY);
    if options.indented {
        serde_json::to_writer_pretty(&mut buffer, &document)?;
    } else {
        serde_json::to_writer(&mut buffer, &document)?;
    }
    buffer.extend_from_slice(LINE_ENDING);
    Ok(buffer)
}

fn render_timestamp(options: &FormatterOptions, event: &LogEvent) -> Result<Option<String>, FormatError> {
    let pattern = options.timestamp_format.as_str();
    if pattern.is_empty() {
        return Ok(None);
    }

    let instant = event.timestamp.unwrap_or_else(Utc::now);
    let mut out = String::new();
    let written = if options.use_utc_timestamp {
        write!(out, "{}", instant.format(pattern))
    } else {
        write!(out, "{}", instant.with_timezone(&Local).format(pattern))
    };
    written.map_err(|_| FormatError::InvalidTimestampFormat(pattern.to_string()))?;
    Ok(Some(out))
}

/// In compact mode every line break becomes a single space so the event
/// stays on one physical line.
fn fold_exception(text: &str, indented: bool) -> Cow<'_, str> {
    if indented || !text.contains(['\r', '\n']) {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", " ").replace(['\r', '\n'], " "))
}

struct Document<'a> {
    timestamp: Option<&'a str>,
    event: &'a LogEvent,
    level: &'static str,
    exception: Option<Cow<'a, str>>,
    scopes: Option<&'a [Scope]>,
}

impl Serialize for Document<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let event = self.event;
        let mut map = serializer.serialize_map(None)?;
        if let Some(timestamp) = self.timestamp {
            map.serialize_entry("Timestamp", timestamp)?;
        }
        map.serialize_entry("EventId", &event.event_id.id)?;
        if let Some(name) = event.event_id.display_name() {
            map.serialize_entry("EventName", name)?;
        }
        map.serialize_entry("LogLevel", self.level)?;
        map.serialize_entry("Category", &event.category)?;
        map.serialize_entry("Message", &event.message)?;
        if let Some(exception) = &self.exception {
            map.serialize_entry("Exception", exception.as_ref())?;
        }
        if let Some(state) = &event.state {
            map.serialize_entry("State", &StateObject(state))?;
        }
        if let Some(scopes) = self.scopes {
            map.serialize_entry("Scopes", &ScopeArray(scopes))?;
        }
        map.end()
    }
}

struct StateObject<'a>(&'a State);

impl Serialize for StateObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            State::Pairs(pairs) => PairsObject(pairs).serialize(serializer),
            State::Value(value) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("Message", &value.to_text())?;
                map.end()
            }
        }
    }
}

struct ScopeArray<'a>(&'a [Scope]);

impl Serialize for ScopeArray<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for scope in self.0 {
            match scope {
                Scope::Pairs(pairs) => seq.serialize_element(&PairsObject(pairs))?,
                Scope::Value(value) => seq.serialize_element(&value.to_text())?,
            }
        }
        seq.end()
    }
}

/// Pairs in their original order. Repeated keys are written as-is.
struct PairsObject<'a>(&'a Pairs);

impl Serialize for PairsObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{EventId, LogLevel};
    use crate::value::FieldValue;
    use chrono::TimeZone;
    use serde_json::Value;

    fn compact() -> FormatterOptions {
        FormatterOptions {
            timestamp_format: String::new(),
            ..Default::default()
        }
    }

    fn render(options: FormatterOptions, event: &LogEvent, scopes: Option<&[Scope]>) -> String {
        let formatter = JsonLogFormatter::new(options);
        let line = formatter.format_line(event, scopes).unwrap();
        String::from_utf8(line).unwrap()
    }

    fn parse(line: &str) -> Value {
        serde_json::from_str(line).unwrap()
    }

    fn keys(line: &str) -> Vec<String> {
        match parse(line) {
            Value::Object(map) => map.keys().cloned().collect(),
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn test_minimal_event() {
        let event = LogEvent::new(LogLevel::Information, "App", "hello");
        let line = render(compact(), &event, None);

        assert!(line.ends_with('\n'));
        assert_eq!(line.trim_end(), r#"{"EventId":0,"LogLevel":"Information","Category":"App","Message":"hello"}"#);
    }

    #[test]
    fn test_field_order_with_everything_present() {
        let options = FormatterOptions {
            include_scopes: true,
            use_utc_timestamp: true,
            timestamp_format: "%Y".to_string(),
            ..Default::default()
        };
        let event = LogEvent::new(LogLevel::Warning, "App", "msg")
            .with_event_id(EventId::named(3, "three"))
            .with_exception("boom")
            .with_pairs([("k", 1)]);
        let scopes = [Scope::Value("outer".into())];
        let line = render(options, &event, Some(&scopes[..]));

        // serde_json's Map keeps insertion order only with preserve_order,
        // so check the raw text instead.
        let order = [
            "\"Timestamp\"",
            "\"EventId\"",
            "\"EventName\"",
            "\"LogLevel\"",
            "\"Category\"",
            "\"Message\"",
            "\"Exception\"",
            "\"State\"",
            "\"Scopes\"",
        ];
        let positions: Vec<usize> = order.iter().map(|k| line.find(k).unwrap()).collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]), "{line}");
        assert_eq!(keys(&line).len(), order.len());
    }

    #[test]
    fn test_every_level_name() {
        for (level, name) in [
            (LogLevel::Trace, "Trace"),
            (LogLevel::Debug, "Debug"),
            (LogLevel::Information, "Information"),
            (LogLevel::Warning, "Warning"),
            (LogLevel::Error, "Error"),
            (LogLevel::Critical, "Critical"),
        ] {
            let line = render(compact(), &LogEvent::new(level, "c", "m"), None);
            assert_eq!(parse(&line)["LogLevel"], name);
        }
    }

    #[test]
    fn test_none_level_is_rejected_without_output() {
        let formatter = JsonLogFormatter::new(compact());
        let mut out = Vec::new();
        let err = formatter
            .format(&LogEvent::new(LogLevel::None, "c", "m"), None, &mut out)
            .unwrap_err();
        assert!(matches!(err, FormatError::InvalidLevel(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_event_name_only_when_not_blank() {
        let named = LogEvent::new(LogLevel::Debug, "c", "m").with_event_id(EventId::named(7, "seven"));
        let blank = LogEvent::new(LogLevel::Debug, "c", "m").with_event_id(EventId::named(7, " \t"));

        assert_eq!(parse(&render(compact(), &named, None))["EventName"], "seven");
        assert!(parse(&render(compact(), &blank, None)).get("EventName").is_none());
    }

    #[test]
    fn test_compact_exception_is_single_line() {
        let event = LogEvent::new(LogLevel::Error, "c", "m")
            .with_exception("Error: bad\r\n   at a()\n   at b()");
        let line = render(compact(), &event, None);

        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(parse(&line)["Exception"], "Error: bad    at a()    at b()");
    }

    #[test]
    fn test_indented_exception_keeps_line_breaks() {
        let options = FormatterOptions {
            indented: true,
            ..compact()
        };
        let event = LogEvent::new(LogLevel::Error, "c", "m").with_exception("a\nb");
        let line = render(options, &event, None);

        assert!(line.starts_with("{\n  \"EventId\""));
        assert_eq!(parse(&line)["Exception"], "a\nb");
    }

    #[test]
    fn test_state_pairs_keep_types() {
        let event = LogEvent::new(LogLevel::Information, "c", "m")
            .with_pairs([("a", FieldValue::from("b")), ("n", FieldValue::from(2))]);
        let line = render(compact(), &event, None);

        assert!(line.contains(r#""State":{"a":"b","n":2}"#), "{line}");
    }

    #[test]
    fn test_state_duplicate_keys_are_written() {
        let event = LogEvent::new(LogLevel::Information, "c", "m").with_pairs([("k", 1), ("k", 2)]);
        let line = render(compact(), &event, None);

        assert!(line.contains(r#""State":{"k":1,"k":2}"#), "{line}");
        assert_eq!(parse(&line)["State"]["k"], 2);
    }

    #[test]
    fn test_non_pair_state_becomes_message() {
        let event = LogEvent::new(LogLevel::Information, "c", "m")
            .with_state(State::Value(FieldValue::from(42)));
        let line = render(compact(), &event, None);

        assert_eq!(parse(&line)["State"], serde_json::json!({ "Message": "42" }));
    }

    #[test]
    fn test_panicking_value_still_writes_the_line() {
        struct Exploding;
        impl std::fmt::Display for Exploding {
            fn fmt(&self, _f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                panic!("display exploded");
            }
        }
        let event = LogEvent::new(LogLevel::Information, "c", "m")
            .with_pairs([("bad", FieldValue::opaque(Exploding)), ("ok", FieldValue::from(1))]);
        let scopes = [Scope::Value(FieldValue::opaque(Exploding))];
        let options = FormatterOptions {
            include_scopes: true,
            ..compact()
        };
        let line = render(options, &event, Some(&scopes[..]));

        let parsed = parse(&line);
        assert_eq!(parsed["State"], serde_json::json!({ "bad": "", "ok": 1 }));
        assert_eq!(parsed["Scopes"], serde_json::json!([""]));
    }

    #[test]
    fn test_scopes_oldest_first() {
        let options = FormatterOptions {
            include_scopes: true,
            ..compact()
        };
        let scopes = vec![
            Scope::pairs([("req", "r1")]),
            Scope::Value(FieldValue::from(1.5)),
            Scope::pairs([("user", FieldValue::from(9u32)), ("admin", FieldValue::from(false))]),
        ];
        let event = LogEvent::new(LogLevel::Information, "c", "m");
        let line = render(options, &event, Some(&scopes[..]));

        assert_eq!(
            parse(&line)["Scopes"],
            serde_json::json!([{ "req": "r1" }, "1.5", { "user": 9, "admin": false }])
        );
    }

    #[test]
    fn test_scopes_absent_when_disabled_or_missing() {
        let scopes = vec![Scope::pairs([("req", "r1")])];
        let event = LogEvent::new(LogLevel::Information, "c", "m");

        let disabled = render(compact(), &event, Some(&scopes[..]));
        assert!(parse(&disabled).get("Scopes").is_none());

        let enabled = FormatterOptions {
            include_scopes: true,
            ..compact()
        };
        let missing = render(enabled.clone(), &event, None);
        assert!(parse(&missing).get("Scopes").is_none());

        let empty = render(enabled, &event, Some(&[][..]));
        assert_eq!(parse(&empty)["Scopes"], serde_json::json!([]));
    }

    #[test]
    fn test_timestamp_uses_event_instant() {
        let options = FormatterOptions {
            timestamp_format: "%Y-%m-%dT%H:%M:%S".to_string(),
            use_utc_timestamp: true,
            ..Default::default()
        };
        let instant = Utc.with_ymd_and_hms(2024, 2, 29, 13, 5, 9).unwrap();
        let event = LogEvent::new(LogLevel::Information, "c", "m").with_timestamp(instant);
        let line = render(options, &event, None);

        assert!(line.starts_with(r#"{"Timestamp":"2024-02-29T13:05:09","EventId":0"#), "{line}");
    }

    #[test]
    fn test_local_timestamp_uses_local_offset() {
        let options = FormatterOptions {
            timestamp_format: "%Y-%m-%dT%H:%M:%S%:z".to_string(),
            use_utc_timestamp: false,
            ..Default::default()
        };
        let instant = Utc.with_ymd_and_hms(2024, 7, 1, 23, 30, 0).unwrap();
        let event = LogEvent::new(LogLevel::Information, "c", "m").with_timestamp(instant);
        let line = render(options, &event, None);

        let offset = Local.offset_from_utc_datetime(&instant.naive_utc());
        let wall = instant.naive_utc() + offset;
        let expected = format!("{}{}", wall.format("%Y-%m-%dT%H:%M:%S"), offset);
        assert_eq!(parse(&line)["Timestamp"], expected.as_str());
    }

    #[test]
    fn test_timestamp_defaults_to_now() {
        let options = FormatterOptions {
            timestamp_format: "%Y".to_string(),
            use_utc_timestamp: true,
            ..Default::default()
        };
        let before = Utc::now().format("%Y").to_string();
        let line = render(options, &LogEvent::new(LogLevel::Information, "c", "m"), None);
        let after = Utc::now().format("%Y").to_string();

        let stamped = parse(&line)["Timestamp"].as_str().unwrap().to_string();
        assert!(stamped == before || stamped == after);
    }

    #[test]
    fn test_invalid_timestamp_pattern_fails_cleanly() {
        let options = FormatterOptions {
            timestamp_format: "%Q".to_string(),
            ..Default::default()
        };
        let formatter = JsonLogFormatter::new(options);
        let mut out = Vec::new();
        let err = formatter
            .format(&LogEvent::new(LogLevel::Information, "c", "m"), None, &mut out)
            .unwrap_err();
        assert!(matches!(err, FormatError::InvalidTimestampFormat(_)));
        assert!(out.is_empty());
    }

    #[test]
    fn test_spec_example_event() {
        let options = FormatterOptions {
            include_scopes: true,
            ..Default::default()
        };
        let event = LogEvent::new(LogLevel::Error, "App", "failed").with_event_id(EventId::named(12, "twelve"));
        let scopes = vec![Scope::pairs([("req", "r1")])];
        let line = render(options, &event, Some(&scopes[..]));
        let parsed = parse(&line);

        assert!(parsed["Timestamp"].is_string());
        assert_eq!(parsed["EventId"], 12);
        assert_eq!(parsed["EventName"], "twelve");
        assert_eq!(parsed["LogLevel"], "Error");
        assert_eq!(parsed["Category"], "App");
        assert_eq!(parsed["Message"], "failed");
        assert_eq!(parsed["Scopes"], serde_json::json!([{ "req": "r1" }]));
        assert!(parsed.get("State").is_none());
        assert!(parsed.get("Exception").is_none());
    }

    #[test]
    fn test_strings_are_escaped() {
        let event = LogEvent::new(LogLevel::Information, "c\"at", "line\u{0}\ttab")
            .with_pairs([("k\"ey", "v\\al")]);
        let parsed = parse(&render(compact(), &event, None));

        assert_eq!(parsed["Category"], "c\"at");
        assert_eq!(parsed["Message"], "line\u{0}\ttab");
        assert_eq!(parsed["State"]["k\"ey"], "v\\al");
    }

    #[test]
    fn test_every_optional_combination_is_valid_json() {
        for mask in 0u8..32 {
            let options = FormatterOptions {
                timestamp_format: if mask & 1 != 0 { "%s".to_string() } else { String::new() },
                include_scopes: mask & 2 != 0,
                indented: mask & 4 != 0,
                ..Default::default()
            };
            let mut event = LogEvent::new(LogLevel::Trace, "c", "m");
            if mask & 8 != 0 {
                event = event.with_exception("x\ny").with_event_id(EventId::named(1, "one"));
            }
            if mask & 16 != 0 {
                event = event.with_pairs([("f", FieldValue::from(f64::NAN)), ("z", FieldValue::Null)]);
            }
            let scopes = vec![Scope::Value(FieldValue::Null), Scope::pairs([("d", 'c')])];
            let line = render(options, &event, Some(&scopes[..]));
            assert!(serde_json::from_str::<Value>(&line).is_ok(), "{line}");
        }
    }
}
