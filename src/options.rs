use arc_swap::ArcSwap;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::env::{
    parse_flag, LOG_FORMAT_INCLUDE_SCOPES_ENV, LOG_FORMAT_INDENTED_ENV,
    LOG_FORMAT_TIMESTAMP_FORMAT_ENV, LOG_FORMAT_USE_UTC_ENV,
};

/// Default `Timestamp` pattern: RFC 3339 with milliseconds and offset.
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%:z";

/// Formatter configuration.
///
/// **Fields**
/// - `timestamp_format`: chrono strftime pattern for the `Timestamp`
///   field; an empty pattern omits the field entirely.
/// - `use_utc_timestamp`: stamp in UTC rather than the local zone.
/// - `include_scopes`: emit the `Scopes` array when a scope stack is given.
/// - `indented`: pretty-print the object. In compact mode line breaks
///   inside `Exception` are folded so every event stays on one line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatterOptions {
    pub timestamp_format: String,
    pub use_utc_timestamp: bool,
    pub include_scopes: bool,
    pub indented: bool,
}

impl Default for FormatterOptions {
    fn default() -> Self {
        Self {
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
            use_utc_timestamp: false,
            include_scopes: false,
            indented: false,
        }
    }
}

impl FormatterOptions {
    /// Check that the timestamp pattern only contains known specifiers.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if StrftimeItems::new(&self.timestamp_format).any(|item| matches!(item, Item::Error)) {
            return Err(OptionsError::InvalidTimestampFormat(self.timestamp_format.clone()));
        }
        Ok(())
    }

    /// Build options from the process environment, see [`crate::env`].
    pub fn from_env() -> Result<Self, OptionsError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build options from an arbitrary key lookup. Unset keys keep their
    /// [`Default`] values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, OptionsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = FormatterOptions::default();

        if let Some(format) = lookup(LOG_FORMAT_TIMESTAMP_FORMAT_ENV) {
            options.timestamp_format = format;
        }

        let flag = |key: &'static str, current: bool| -> Result<bool, OptionsError> {
            match lookup(key) {
                None => Ok(current),
                Some(raw) => parse_flag(&raw).ok_or(OptionsError::InvalidBool { key, value: raw }),
            }
        };
        options.use_utc_timestamp = flag(LOG_FORMAT_USE_UTC_ENV, options.use_utc_timestamp)?;
        options.include_scopes = flag(LOG_FORMAT_INCLUDE_SCOPES_ENV, options.include_scopes)?;
        options.indented = flag(LOG_FORMAT_INDENTED_ENV, options.indented)?;

        options.validate()?;
        Ok(options)
    }
}

/// Error type returned when building or validating [`FormatterOptions`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("{key} must be a boolean flag, got {value:?}")]
    InvalidBool { key: &'static str, value: String },

    #[error("invalid timestamp format {0:?}")]
    InvalidTimestampFormat(String),
}

/// Shared, hot-reloadable handle to the current [`FormatterOptions`].
///
/// Readers take one immutable snapshot per formatting call; writers
/// replace the whole snapshot, so a call never sees a mix of old and new
/// fields.
#[derive(Clone, Debug)]
pub struct OptionsHandle {
    inner: Arc<ArcSwap<FormatterOptions>>,
}

impl OptionsHandle {
    pub fn new(options: FormatterOptions) -> Self {
        OptionsHandle {
            inner: Arc::new(ArcSwap::from_pointee(options)),
        }
    }

    /// Current snapshot.
    pub fn load(&self) -> Arc<FormatterOptions> {
        self.inner.load_full()
    }

    /// Replace the snapshot after validating it. On error the current
    /// options stay in effect.
    pub fn store(&self, options: FormatterOptions) -> Result<(), OptionsError> {
        options.validate()?;
        self.inner.store(Arc::new(options));
        Ok(())
    }

    /// Derive a new snapshot from the current one.
    ///
    /// `f` may run more than once if another writer races this update.
    pub fn update<F>(&self, f: F) -> Result<(), OptionsError>
    where
        F: Fn(&mut FormatterOptions),
    {
        let mut failure = None;
        self.inner.rcu(|current| {
            let mut next = FormatterOptions::clone(current);
            f(&mut next);
            match next.validate() {
                Ok(()) => {
                    failure = None;
                    Arc::new(next)
                }
                Err(e) => {
                    failure = Some(e);
                    Arc::clone(current)
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for OptionsHandle {
    fn default() -> Self {
        OptionsHandle::new(FormatterOptions::default())
    }
}

impl From<FormatterOptions> for OptionsHandle {
    fn from(options: FormatterOptions) -> Self {
        OptionsHandle::new(options)
    }
}
