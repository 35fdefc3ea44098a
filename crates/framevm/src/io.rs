use std::{
    borrow::Cow,
    cell::RefCell,
    io::{self, Write as _},
};

use crate::exception::{Fault, RunResult};

/// Trait for handling output from the `print()` builtin.
///
/// Implement this trait to capture or redirect output produced by interpreted code.
/// The default implementation `StdPrint` writes to stdout.
pub trait PrintWriter {
    /// Called once for each formatted argument passed to `print()`.
    ///
    /// Writes only the argument's text; separators and the trailing
    /// terminator are emitted via [`PrintWriter::stdout_push`] or further
    /// `stdout_write` calls.
    ///
    /// # Arguments
    /// * `output` - The formatted text for a single argument
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()>;

    /// Adds a single character to stdout, generally a space or newline.
    fn stdout_push(&mut self, end: char) -> RunResult<()>;
}

/// Default `PrintWriter` that writes to stdout.
///
/// Output is buffered per thread and flushed when the writer is dropped.
#[derive(Debug, Default)]
pub struct StdPrint;

thread_local! {
    static STDOUT_BUFFER: RefCell<String> = const { RefCell::new(String::new()) };
}

/// Buffer size above which `StdPrint` flushes eagerly.
const FLUSH_THRESHOLD: usize = 8 * 1024;

fn flush_buffer(buffer: &mut String) -> io::Result<()> {
    if buffer.is_empty() {
        return Ok(());
    }
    let mut stdout = io::stdout().lock();
    stdout.write_all(buffer.as_bytes())?;
    stdout.flush()?;
    buffer.clear();
    Ok(())
}

impl StdPrint {
    fn with_buffer(f: impl FnOnce(&mut String)) -> RunResult<()> {
        STDOUT_BUFFER.with(|buffer| {
            let mut buffer = buffer.borrow_mut();
            f(&mut buffer);
            if buffer.len() >= FLUSH_THRESHOLD {
                flush_buffer(&mut buffer).map_err(|err| Fault::invalid_value(format!("stdout write failed: {err}")))?;
            }
            Ok(())
        })
    }
}

impl PrintWriter for StdPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        Self::with_buffer(|buffer| buffer.push_str(&output))
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        Self::with_buffer(|buffer| buffer.push(end))
    }
}

impl Drop for StdPrint {
    fn drop(&mut self) {
        STDOUT_BUFFER.with(|buffer| {
            let _ = flush_buffer(&mut buffer.borrow_mut());
        });
    }
}

/// A `PrintWriter` that collects all output into a string.
///
/// Useful for testing or capturing print output programmatically.
#[derive(Debug, Default)]
pub struct CollectStringPrint(String);

impl CollectStringPrint {
    /// Creates a new empty `CollectStringPrint`.
    #[must_use]
    pub fn new() -> Self {
        Self(String::new())
    }

    /// Returns the collected output as a string slice.
    #[must_use]
    pub fn output(&self) -> &str {
        self.0.as_str()
    }

    /// Discards everything collected so far.
    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// Consumes the writer and returns the collected output.
    #[must_use]
    pub fn into_output(self) -> String {
        self.0
    }
}

impl PrintWriter for CollectStringPrint {
    fn stdout_write(&mut self, output: Cow<'_, str>) -> RunResult<()> {
        self.0.push_str(&output);
        Ok(())
    }

    fn stdout_push(&mut self, end: char) -> RunResult<()> {
        self.0.push(end);
        Ok(())
    }
}

/// `PrintWriter` that ignores all output.
#[derive(Debug, Default)]
pub struct NoPrint;

impl PrintWriter for NoPrint {
    fn stdout_write(&mut self, _output: Cow<'_, str>) -> RunResult<()> {
        Ok(())
    }

    fn stdout_push(&mut self, _end: char) -> RunResult<()> {
        Ok(())
    }
}
