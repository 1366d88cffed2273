use serde::ser::{Serialize, Serializer};
use serde_json::value::RawValue;
use std::fmt::{self, Write as _};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;

/// A single structured value attached to event state or a scope.
///
/// The set of variants is closed: every value that reaches the formatter
/// has already been classified by whoever built the [`crate::record::LogEvent`],
/// so encoding is an exhaustive match rather than runtime type inspection.
#[derive(Clone)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    Char(char),
    Str(String),
    /// Anything else; only its `Display` text is ever used.
    Opaque(Arc<dyn fmt::Display + Send + Sync>),
}

impl FieldValue {
    /// Wrap an arbitrary displayable value.
    ///
    /// A `Display` impl that panics while the value is rendered is caught
    /// and the value renders as an empty string.
    pub fn opaque<T>(value: T) -> Self
    where
        T: fmt::Display + Send + Sync + 'static,
    {
        FieldValue::Opaque(Arc::new(value))
    }

    /// Locale-independent textual representation of the value.
    ///
    /// `Null` renders as an empty string. Never fails: an `Opaque` value
    /// whose `Display` impl reports an error yields whatever text it
    /// produced before failing, and one that panics yields an empty string.
    pub fn to_text(&self) -> String {
        match self {
            FieldValue::Null => String::new(),
            FieldValue::Bool(v) => v.to_string(),
            FieldValue::I64(v) => v.to_string(),
            FieldValue::U64(v) => v.to_string(),
            FieldValue::F32(v) => v.to_string(),
            FieldValue::F64(v) => v.to_string(),
            FieldValue::Decimal(v) => v.as_str().to_string(),
            FieldValue::Char(v) => v.to_string(),
            FieldValue::Str(v) => v.clone(),
            FieldValue::Opaque(v) => display_lossy(v.as_ref()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }
}

fn display_lossy(value: &dyn fmt::Display) -> String {
    let mut out = String::new();
    match panic::catch_unwind(AssertUnwindSafe(|| write!(out, "{}", value))) {
        Ok(Ok(())) => {}
        Ok(Err(_)) => {
            tracing::debug!(
                partial_len = out.len(),
                "Display impl failed while rendering log value, using partial text"
            );
        }
        Err(_) => {
            tracing::debug!("Display impl panicked while rendering log value, using empty text");
            out.clear();
        }
    }
    out
}

impl fmt::Debug for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("Null"),
            FieldValue::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            FieldValue::I64(v) => f.debug_tuple("I64").field(v).finish(),
            FieldValue::U64(v) => f.debug_tuple("U64").field(v).finish(),
            FieldValue::F32(v) => f.debug_tuple("F32").field(v).finish(),
            FieldValue::F64(v) => f.debug_tuple("F64").field(v).finish(),
            FieldValue::Decimal(v) => f.debug_tuple("Decimal").field(&v.as_str()).finish(),
            FieldValue::Char(v) => f.debug_tuple("Char").field(v).finish(),
            FieldValue::Str(v) => f.debug_tuple("Str").field(v).finish(),
            FieldValue::Opaque(v) => f.debug_tuple("Opaque").field(&display_lossy(v.as_ref())).finish(),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Null => serializer.serialize_unit(),
            FieldValue::Bool(v) => serializer.serialize_bool(*v),
            FieldValue::I64(v) => serializer.serialize_i64(*v),
            FieldValue::U64(v) => serializer.serialize_u64(*v),
            // JSON has no NaN/inf; those fall back to their text.
            FieldValue::F32(v) if v.is_finite() => serializer.serialize_f32(*v),
            FieldValue::F64(v) if v.is_finite() => serializer.serialize_f64(*v),
            FieldValue::F32(v) => serializer.serialize_str(&v.to_string()),
            FieldValue::F64(v) => serializer.serialize_str(&v.to_string()),
            FieldValue::Decimal(v) => v.raw.serialize(serializer),
            FieldValue::Char(v) => serializer.serialize_char(*v),
            FieldValue::Str(v) => serializer.serialize_str(v),
            FieldValue::Opaque(v) => serializer.serialize_str(&display_lossy(v.as_ref())),
        }
    }
}

macro_rules! from_signed {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::I64(v as i64)
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($t:ty),*) => {
        $(impl From<$t> for FieldValue {
            fn from(v: $t) -> Self {
                FieldValue::U64(v as u64)
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64, isize);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::F32(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::F64(v)
    }
}

impl From<char> for FieldValue {
    fn from(v: char) -> Self {
        FieldValue::Char(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<Decimal> for FieldValue {
    fn from(v: Decimal) -> Self {
        FieldValue::Decimal(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Arbitrary-precision decimal kept as its canonical text.
///
/// The text is validated once at construction and written verbatim as a
/// JSON number, so no digits are lost to a binary float conversion.
#[derive(Clone)]
pub struct Decimal {
    raw: Box<RawValue>,
}

impl Decimal {
    /// Parse decimal text such as `"-12.5000"` or `"1e-7"`.
    pub fn parse(text: &str) -> Result<Self, DecimalError> {
        let trimmed = text.trim();
        let canonical = trimmed.strip_prefix('+').unwrap_or(trimmed);
        if !is_json_number(canonical) {
            return Err(DecimalError::Invalid(text.to_string()));
        }
        let raw = RawValue::from_string(canonical.to_string())
            .map_err(|_| DecimalError::Invalid(text.to_string()))?;
        Ok(Decimal { raw })
    }

    pub fn as_str(&self) -> &str {
        self.raw.get()
    }
}

impl FromStr for Decimal {
    type Err = DecimalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Decimal::parse(s)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Decimal").field(&self.as_str()).finish()
    }
}

impl PartialEq for Decimal {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

/// Error returned when decimal text is not a plain JSON number.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DecimalError {
    #[error("invalid decimal literal: {0:?}")]
    Invalid(String),
}

// -?(0|[1-9][0-9]*)(\.[0-9]+)?([eE][+-]?[0-9]+)?
fn is_json_number(s: &str) -> bool {
    let bytes = s.as_bytes();
    let mut i = 0;
    if bytes.first() == Some(&b'-') {
        i += 1;
    }
    let int_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let int_len = i - int_start;
    if int_len == 0 || (int_len > 1 && bytes[int_start] == b'0') {
        return false;
    }
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let frac_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == frac_start {
            return false;
        }
    }
    if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
        i += 1;
        if i < bytes.len() && (bytes[i] == b'+' || bytes[i] == b'-') {
            i += 1;
        }
        let exp_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exp_start {
            return false;
        }
    }
    i == bytes.len()
}
