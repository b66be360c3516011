//! Exploration report output
//!
//! The report is plain text for humans. In production it goes to standard
//! output; tests capture it in memory.

use log::warn;
use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Line-oriented report sink, cheap to clone into notification handlers
#[derive(Clone)]
pub struct Reporter {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl Reporter {
    /// Report to standard output
    pub fn stdout() -> Self {
        Self::to_writer(io::stdout())
    }

    /// Report to any writer
    pub fn to_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Report into memory; the buffer handle reads back what was written
    pub fn buffer() -> (Self, ReportBuffer) {
        let buffer = ReportBuffer::default();
        (Self::to_writer(buffer.clone()), buffer)
    }

    /// Write text followed by a newline
    pub fn line(&self, args: fmt::Arguments<'_>) {
        self.write(args, true);
    }

    /// Write text without a newline
    pub fn text(&self, args: fmt::Arguments<'_>) {
        self.write(args, false);
    }

    /// Write an empty line
    pub fn blank(&self) {
        self.line(format_args!(""));
    }

    fn write(&self, args: fmt::Arguments<'_>, newline: bool) {
        let mut out = self.out.lock().unwrap_or_else(|e| e.into_inner());
        let result = out
            .write_fmt(args)
            .and_then(|_| if newline { out.write_all(b"\n") } else { Ok(()) })
            .and_then(|_| out.flush());

        if let Err(e) = result {
            warn!("Failed to write report: {}", e);
        }
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter").finish_non_exhaustive()
    }
}

/// In-memory report target
#[derive(Debug, Clone, Default)]
pub struct ReportBuffer(Arc<Mutex<Vec<u8>>>);

impl ReportBuffer {
    /// Everything written so far
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap_or_else(|e| e.into_inner())).into_owned()
    }
}

impl Write for ReportBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap_or_else(|e| e.into_inner()).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
