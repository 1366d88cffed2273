use crate::layer::JsonLogLayer;
use crate::options::{FormatterOptions, OptionsHandle};
use crate::sink::LogSink;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Install [`JsonLogLayer`] over a [`Registry`] as the global default
/// subscriber.
///
/// **Parameters**
/// - `sink`: destination for rendered JSON lines.
/// - `options`: initial [`FormatterOptions`].
///
/// **Returns**
/// - The [`OptionsHandle`] through which options can be swapped while
///   the process runs.
/// - `Err(..)` if a global subscriber was already installed.
pub fn try_init_json_logging_with_options(
    sink: Arc<dyn LogSink>,
    options: FormatterOptions,
) -> Result<OptionsHandle, SetGlobalDefaultError> {
    let handle = OptionsHandle::new(options);
    let layer = JsonLogLayer::new(sink, handle.clone());
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(handle)
}

/// Like [`try_init_json_logging_with_options`] with
/// [`FormatterOptions::default`].
pub fn try_init_json_logging(sink: Arc<dyn LogSink>) -> Result<OptionsHandle, SetGlobalDefaultError> {
    try_init_json_logging_with_options(sink, FormatterOptions::default())
}

/// Install the layer, panicking if a global subscriber already exists.
///
/// This is the recommended entrypoint from `main`, where a second
/// initialization is a programming error.
pub fn init_json_logging_with_options(sink: Arc<dyn LogSink>, options: FormatterOptions) -> OptionsHandle {
    try_init_json_logging_with_options(sink, options).expect("set global subscriber")
}

/// Initialize JSON logging with default options.
pub fn init_json_logging(sink: Arc<dyn LogSink>) -> OptionsHandle {
    init_json_logging_with_options(sink, FormatterOptions::default())
}
