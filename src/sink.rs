use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Destination for finished log lines.
///
/// Implementations are responsible for transporting lines to a concrete
/// target (stdout, a file, a socket). The formatter has already rendered
/// the complete line, terminator included, before calling `write_line`.
pub trait LogSink: Send + Sync {
    /// Write one complete line.
    ///
    /// **Parameters**
    /// - `line`: one JSON object followed by the line terminator.
    ///
    /// **Returns**
    /// - `Ok(())` if the destination accepted the whole line.
    /// - `Err(..)` if the destination failed. The formatter does not
    ///   retry; the error reaches the caller unchanged.
    ///
    /// May be called from many threads at once. Implementations must not
    /// interleave bytes of two concurrent lines.
    fn write_line(&self, line: &[u8]) -> io::Result<()>;

    /// Flush any buffered lines, if the destination buffers.
    ///
    /// Default implementation is a no-op.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// [`LogSink`] over any [`Write`], serialized by a mutex so every line
/// reaches the writer in one piece.
#[derive(Debug, Default)]
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    /// Run `f` with exclusive access to the underlying writer.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut W) -> R) -> R {
        let mut guard = self.lock();
        f(&mut *guard)
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    // A panic in another writer must not take logging down with it.
    fn lock(&self) -> MutexGuard<'_, W> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl WriterSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl WriterSink<io::Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn write_line(&self, line: &[u8]) -> io::Result<()> {
        self.lock().write_all(line)
    }

    fn flush(&self) -> io::Result<()> {
        self.lock().flush()
    }
}
