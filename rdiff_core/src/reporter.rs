use rdiff_common::{RDiffError, Result};
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Destination for everything a comparison run prints.
///
/// Messages and content-diff output share one ordered stream; resolution
/// errors go to a separate error stream.
pub trait Sink {
    /// Append a formatted diagnostic (the caller supplies the newline).
    fn message(&mut self, args: fmt::Arguments<'_>) -> Result<()>;

    /// Append raw content-diff output.
    fn write_output(&mut self, bytes: &[u8]) -> Result<()>;

    /// Report a problem with `name` on the error stream.
    fn error(&mut self, name: &Path, err: &dyn fmt::Display);

    /// Push pending output to its destination.
    fn flush(&mut self) -> Result<()>;

    /// Called once when the whole run is over.
    fn finish(&mut self) -> Result<()> {
        self.flush()
    }
}

/// `Sink` writing to an output stream and an error stream
pub struct Reporter<W: Write, E: Write> {
    out: W,
    err: E,
    program: String,
    errors: usize,
}

impl<W: Write, E: Write> Reporter<W, E> {
    pub fn new(out: W, err: E) -> Self {
        Self {
            out,
            err,
            program: "rdiff".to_string(),
            errors: 0,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Number of problems reported so far
    pub fn error_count(&self) -> usize {
        self.errors
    }

    pub fn into_parts(self) -> (W, E) {
        (self.out, self.err)
    }
}

impl<W: Write, E: Write> Sink for Reporter<W, E> {
    fn message(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.out.write_fmt(args).map_err(RDiffError::output)
    }

    fn write_output(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes).map_err(RDiffError::output)
    }

    fn error(&mut self, name: &Path, err: &dyn fmt::Display) {
        self.errors += 1;
        // Keep stdout ahead of the error line for interactive users.
        let _ = self.out.flush();
        let _ = writeln!(self.err, "{}: {}: {}", self.program, name.display(), err);
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().map_err(RDiffError::output)
    }

    fn finish(&mut self) -> Result<()> {
        self.flush()?;
        let _ = self.err.flush();
        Ok(())
    }
}

/// Forwards to another sink, writing `header` just before the first
/// content output. Messages pass through unannounced.
pub struct AnnouncingSink<'s> {
    inner: &'s mut dyn Sink,
    header: Option<String>,
}

impl<'s> AnnouncingSink<'s> {
    pub fn new(inner: &'s mut dyn Sink, header: String) -> Self {
        Self {
            inner,
            header: Some(header),
        }
    }
}

impl Sink for AnnouncingSink<'_> {
    fn message(&mut self, args: fmt::Arguments<'_>) -> Result<()> {
        self.inner.message(args)
    }

    fn write_output(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(header) = self.header.take() {
            self.inner.write_output(header.as_bytes())?;
        }
        self.inner.write_output(bytes)
    }

    fn error(&mut self, name: &Path, err: &dyn fmt::Display) {
        self.inner.error(name, err);
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()
    }

    fn finish(&mut self) -> Result<()> {
        self.inner.finish()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::Reporter;

    pub type MemoryReporter = Reporter<Vec<u8>, Vec<u8>>;

    pub fn memory_reporter() -> MemoryReporter {
        Reporter::new(Vec::new(), Vec::new())
    }

    pub fn stdout_of(reporter: MemoryReporter) -> (String, String) {
        let (out, err) = reporter.into_parts();
        (
            String::from_utf8(out).expect("stdout not utf-8"),
            String::from_utf8(err).expect("stderr not utf-8"),
        )
    }
}
