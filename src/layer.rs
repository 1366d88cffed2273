use crate::formatter::render_line;
use crate::options::OptionsHandle;
use crate::record::{describe_error, EventId, LogEvent, LogLevel, Pairs, Scope, State};
use crate::sink::LogSink;
use crate::value::FieldValue;
use chrono::Utc;
use std::error::Error;
use std::fmt;
use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

const MESSAGE_FIELD: &str = "message";
const EVENT_ID_FIELD: &str = "event_id";
const EVENT_NAME_FIELD: &str = "event_name";

/// `tracing_subscriber` layer that renders every event as one JSON line
/// and writes it to a [`LogSink`].
///
/// Span fields become scopes (root span first) and event fields become
/// the event `State`. Formatting happens synchronously on the thread that
/// emitted the event. The layer does no level filtering; stack a filter
/// in front of it if needed.
pub struct JsonLogLayer {
    sink: Arc<dyn LogSink>,
    options: OptionsHandle,
    /// Events rendered and accepted by the sink.
    pub formatted_events: Arc<AtomicU64>,
    /// Events lost to a formatting or sink error.
    pub failed_events: Arc<AtomicU64>,
}

impl JsonLogLayer {
    /// Create a new layer writing to `sink`.
    ///
    /// **Parameters**
    /// - `sink`: destination for rendered lines.
    /// - `options`: formatter options, or an existing [`OptionsHandle`]
    ///   to share hot reloads with other formatters.
    pub fn new(sink: Arc<dyn LogSink>, options: impl Into<OptionsHandle>) -> Self {
        Self {
            sink,
            options: options.into(),
            formatted_events: Arc::new(AtomicU64::new(0)),
            failed_events: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn options(&self) -> &OptionsHandle {
        &self.options
    }
}

/// Fields recorded on a span, kept in the span's extensions.
struct SpanFields(Pairs);

impl<S> Layer<S> for JsonLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = Pairs::new();
        attrs.record(&mut FieldVisitor { fields: &mut fields });
        span.extensions_mut().insert(SpanFields(fields));
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(SpanFields(fields)) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldVisitor { fields });
        } else {
            let mut fields = Pairs::new();
            values.record(&mut FieldVisitor { fields: &mut fields });
            extensions.insert(SpanFields(fields));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        // One snapshot for both scope collection and rendering.
        let options = self.options.load();

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);

        let meta = event.metadata();
        let record = visitor
            .into_log_event(LogLevel::from(meta.level()), meta.target())
            .with_timestamp(Utc::now());

        let scopes = options.include_scopes.then(|| collect_scopes(event, &ctx));

        let result = render_line(&options, &record, scopes.as_deref())
            .and_then(|line| self.sink.write_line(&line).map_err(Into::into));

        match result {
            Ok(()) => {
                self.formatted_events.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed_events.fetch_add(1, Ordering::Relaxed);
                eprintln!("failed to write log event: {}", e);
            }
        }
    }
}

fn collect_scopes<S>(event: &Event<'_>, ctx: &Context<'_, S>) -> Vec<Scope>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let Some(scope) = ctx.event_scope(event) else {
        return Vec::new();
    };
    scope
        .from_root()
        .map(|span| {
            let fields = span
                .extensions()
                .get::<SpanFields>()
                .map(|f| f.0.clone())
                .unwrap_or_default();
            if fields.is_empty() {
                Scope::Value(FieldValue::from(span.name()))
            } else {
                Scope::Pairs(fields)
            }
        })
        .collect()
}

fn wide_signed(value: i128) -> FieldValue {
    i64::try_from(value)
        .map(FieldValue::I64)
        .unwrap_or_else(|_| FieldValue::Str(value.to_string()))
}

fn wide_unsigned(value: u128) -> FieldValue {
    u64::try_from(value)
        .map(FieldValue::U64)
        .unwrap_or_else(|_| FieldValue::Str(value.to_string()))
}

/// Records span fields as plain pairs.
struct FieldVisitor<'a> {
    fields: &'a mut Pairs,
}

impl FieldVisitor<'_> {
    fn push(&mut self, field: &Field, value: FieldValue) {
        self.fields.push((field.name().to_string(), value));
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value.into());
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        self.push(field, wide_signed(value));
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        self.push(field, wide_unsigned(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.into());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        self.push(field, describe_error(value).into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value).into());
    }
}

/// Splits event fields into the message, event id, exception and state.
#[derive(Default)]
struct EventVisitor {
    message: Option<String>,
    event_id: Option<i32>,
    event_name: Option<String>,
    exception: Option<String>,
    fields: Pairs,
}

impl EventVisitor {
    fn push(&mut self, field: &Field, value: FieldValue) {
        self.fields.push((field.name().to_string(), value));
    }

    fn into_log_event(self, level: LogLevel, category: &str) -> LogEvent {
        let mut event = LogEvent::new(level, category, self.message.unwrap_or_default());
        event.event_id = EventId {
            id: self.event_id.unwrap_or_default(),
            name: self.event_name,
        };
        event.exception = self.exception;
        if !self.fields.is_empty() {
            event.state = Some(State::Pairs(self.fields));
        }
        event
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == EVENT_ID_FIELD {
            if let Ok(id) = i32::try_from(value) {
                self.event_id = Some(id);
                return;
            }
        }
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        if field.name() == EVENT_ID_FIELD {
            if let Ok(id) = i32::try_from(value) {
                self.event_id = Some(id);
                return;
            }
        }
        self.push(field, value.into());
    }

    fn record_i128(&mut self, field: &Field, value: i128) {
        self.push(field, wide_signed(value));
    }

    fn record_u128(&mut self, field: &Field, value: u128) {
        self.push(field, wide_unsigned(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            MESSAGE_FIELD => self.message = Some(value.to_string()),
            EVENT_NAME_FIELD => self.event_name = Some(value.to_string()),
            _ => self.push(field, value.into()),
        }
    }

    fn record_error(&mut self, field: &Field, value: &(dyn Error + 'static)) {
        let text = describe_error(value);
        if matches!(field.name(), "error" | "exception") && self.exception.is_none() {
            self.exception = Some(text);
        } else {
            self.push(field, text.into());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        // `message` arrives here as `fmt::Arguments`.
        let text = format!("{:?}", value);
        if field.name() == MESSAGE_FIELD {
            self.message = Some(text);
        } else {
            self.push(field, text.into());
        }
    }
}
